use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use rhythm_core::Error as RhythmError;

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Debug)]
pub struct ServerError(anyhow::Error);

impl<E> From<E> for ServerError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        tracing::error!("{}", self);
        let status = self.status_code();
        (status, self.to_string()).into_response()
    }
}

impl ServerError {
    fn status_code(&self) -> StatusCode {
        let err = &self.0;
        for cause in err.chain() {
            if let Some(err) = cause.downcast_ref::<RhythmError>() {
                match err {
                    RhythmError::Remote(_) => return StatusCode::BAD_GATEWAY,
                    RhythmError::NotLoggedIn(_) => return StatusCode::UNAUTHORIZED,
                    RhythmError::Timeout(_) => return StatusCode::GATEWAY_TIMEOUT,
                    RhythmError::Busy(_) => return StatusCode::CONFLICT,
                    RhythmError::ObjectNotFound(_) => return StatusCode::NOT_FOUND,
                    RhythmError::ObjectAlreadyExists(_) => return StatusCode::CONFLICT,
                    RhythmError::InvalidField(_) => return StatusCode::BAD_REQUEST,
                    RhythmError::UnknownField(_) => return StatusCode::BAD_REQUEST,
                    _ => return StatusCode::INTERNAL_SERVER_ERROR,
                }
            }
        }
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

#[cfg(test)]
mod test {
    use anyhow::Context;

    use super::*;

    #[test]
    fn test_status_codes() {
        let status = |e: RhythmError| ServerError::from(e).status_code();
        assert_eq!(status(RhythmError::Busy("like".into())), StatusCode::CONFLICT);
        assert_eq!(status(RhythmError::NotLoggedIn("".into())), StatusCode::UNAUTHORIZED);
        assert_eq!(status(RhythmError::Remote("boom".into())), StatusCode::BAD_GATEWAY);

        // Context layers don't hide the cause
        let wrapped = Err::<(), _>(RhythmError::ObjectNotFound("feed 3".into()))
            .context("GET /feed/3")
            .unwrap_err();
        assert_eq!(ServerError(wrapped).status_code(), StatusCode::NOT_FOUND);

        let other = ServerError(anyhow::anyhow!("unexpected"));
        assert_eq!(other.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
