use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Failures talking to the Prismic API.
#[derive(Error, Debug)]
pub enum CmsError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CMS responded with {status} for {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("Failed to decode CMS response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Cursor {0} does not point at the configured CMS")]
    CrossOriginCursor(String),

    #[error("CMS repository has no master ref")]
    NoMasterRef,

    #[error("No {doc_type} document with uid {uid}")]
    NotFound { doc_type: String, uid: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value {value:?} for {name}")]
    Invalid { name: &'static str, value: String },
}

/// Errors surfaced by the JSON endpoints.
#[derive(Debug)]
pub enum PageError {
    BadRequest(String),
    Cms(CmsError),
}

impl From<CmsError> for PageError {
    fn from(err: CmsError) -> Self {
        match err {
            CmsError::InvalidUrl(_) | CmsError::CrossOriginCursor(_) => {
                PageError::BadRequest(err.to_string())
            }
            other => PageError::Cms(other),
        }
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            PageError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            PageError::Cms(err) => {
                error!("CMS error: {}", err);
                (StatusCode::BAD_GATEWAY, "Failed to fetch posts".to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
