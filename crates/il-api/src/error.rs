//! Maps domain and infrastructure failures onto HTTP responses.

use actix_web::http::{header, StatusCode};
use actix_web::{HttpResponse, ResponseError};
use il_core::error::AppError;
use thiserror::Error;

pub const ADMIN_REALM: &str = "Basic realm=\"Interludes admin\"";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    App(#[from] AppError),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("template rendering failed: {0}")]
    Render(#[from] askama::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

fn app_status(err: &AppError) -> StatusCode {
    match err {
        AppError::NotFound(..) => StatusCode::NOT_FOUND,
        AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
        AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        AppError::Conflict(_) => StatusCode::CONFLICT,
        AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::App(err) => app_status(err),
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
            // Plugins return anyhow; a domain error may be wrapped inside.
            Self::Internal(err) => err
                .downcast_ref::<AppError>()
                .map_or(StatusCode::INTERNAL_SERVER_ERROR, app_status),
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = if status.is_server_error() {
            tracing::error!("request failed: {self:#}");
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        let mut response = HttpResponse::build(status);
        if status == StatusCode::UNAUTHORIZED {
            response.insert_header((header::WWW_AUTHENTICATE, ADMIN_REALM));
        }
        response.json(serde_json::json!({ "error": message }))
    }
}
