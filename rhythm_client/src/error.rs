use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[allow(clippy::enum_variant_names)]
#[derive(Error, Debug)]
pub enum Error {
    #[error("Cannot encode/decode JSON: {0}")]
    JSONError(#[from] serde_json::Error),
    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Network Error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Cannot parse URL: {0}")]
    UrlError(#[from] url::ParseError),
    #[error("Invalid header value: {0}")]
    HeaderError(#[from] reqwest::header::InvalidHeaderValue),
    #[error("Cannot parse response: {0}")]
    ParsingError(#[from] rhythm_util::parsing::ParsingError),
    /// The backend answered with an error body, like a rejected filter or a constraint violation.
    #[error("{message}")]
    ApiError {
        status: u16,
        code: Option<String>,
        message: String,
    },
}

impl Error {
    /// Whether retrying the same request may succeed.
    pub fn transient(&self) -> bool {
        match self {
            Error::NetworkError(e) => e.is_timeout() || e.is_connect(),
            Error::ApiError { status, .. } => matches!(status, 502..=504),
            _ => false,
        }
    }
}
