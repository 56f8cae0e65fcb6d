use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::error;
use thiserror::Error;
use uplift_core::UpdateError;

pub const MISSING_VERSION: &str = "The current version has to be provided.";

/// Failure of a single HTTP request.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(&'static str),

    #[error(transparent)]
    Update(#[from] UpdateError),

    #[error("install task ended unexpectedly: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Update(UpdateError::InstallInProgress) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Update(_) | Self::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed with {status}: {self}");
        }
        (status, self.to_string()).into_response()
    }
}

/// Failure that keeps the service from starting or serving.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}
