use axum::http::StatusCode;
use thiserror::Error;

use crate::validate::Rejection;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Symptoms are required")]
    MissingSymptoms,

    #[error(transparent)]
    Invalid(#[from] Rejection),

    /// The model itself judged the input to lack medical content.
    #[error("{0}")]
    RejectedByModel(String),

    #[error("inference engine unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("malformed request body: {0}")]
    MalformedRequest(String),
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingSymptoms
            | Self::Invalid(_)
            | Self::RejectedByModel(_)
            | Self::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            Self::UpstreamUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::UpstreamUnavailable(err.to_string())
    }
}
