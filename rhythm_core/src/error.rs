use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The backend rejected or failed the request. Holds its human readable message.
    #[error("{0}")]
    Remote(String),
    #[error("Not logged in: {0}")]
    NotLoggedIn(String),
    #[error("Timeout: {0}")]
    Timeout(String),
    #[error("Busy: {0}")]
    Busy(String),

    #[error("Object `{0}` not found")]
    ObjectNotFound(String),
    #[error("Object `{0}` already exists")]
    ObjectAlreadyExists(String),
    #[error("Invalid field: {0}")]
    InvalidField(String),
    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Cannot encode/decode JSON: {0}")]
    JSONError(#[from] serde_json::Error),
    #[error("Cannot parse date: {0}")]
    DateError(#[from] chrono::ParseError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
