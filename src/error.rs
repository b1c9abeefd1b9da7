use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::auth::session::SessionError;
use crate::repositories::RepositoryError;
use crate::services::auth_service::AuthServiceError;

/// Message returned for every rejected magic-link token, whatever the cause.
pub const INVALID_LINK_MESSAGE: &str = "invalid or expired link";

// Type alias for Result with our AppError
pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Too many requests")]
    RateLimited,

    #[error("Mail delivery failed: {0}")]
    MailDelivery(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::MailDelivery(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::Validation(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg) => msg,
            AppError::RateLimited => "too many requests".to_string(),
            AppError::MailDelivery(detail) => {
                tracing::warn!("Mail delivery failed: {}", detail);
                "failed to send email".to_string()
            }
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                "internal server error".to_string()
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<AuthServiceError> for AppError {
    fn from(err: AuthServiceError) -> Self {
        match err {
            AuthServiceError::InvalidEmail => AppError::Validation("invalid email".to_string()),
            AuthServiceError::NotInvited => AppError::Forbidden("not invited".to_string()),
            AuthServiceError::InvalidToken
            | AuthServiceError::ExpiredOrUsed
            | AuthServiceError::UserDisabled => {
                AppError::Unauthorized(INVALID_LINK_MESSAGE.to_string())
            }
            AuthServiceError::AlreadyRevoked => {
                AppError::Conflict("user already revoked".to_string())
            }
            AuthServiceError::InvitationNotFound => {
                AppError::NotFound("invitation not found".to_string())
            }
            AuthServiceError::CannotSend => AppError::Conflict("cannot send this invite".to_string()),
            AuthServiceError::CannotRevoke => {
                AppError::Conflict("cannot revoke this invite".to_string())
            }
            AuthServiceError::Email(e) => AppError::MailDelivery(e.to_string()),
            AuthServiceError::Repository(RepositoryError::NotFound) => {
                AppError::NotFound("not found".to_string())
            }
            AuthServiceError::Repository(e) => AppError::Internal(e.to_string()),
            AuthServiceError::Token(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        AppError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::email_service::EmailError;

    #[test]
    fn token_failures_share_one_message() {
        for err in [
            AuthServiceError::InvalidToken,
            AuthServiceError::ExpiredOrUsed,
            AuthServiceError::UserDisabled,
        ] {
            match AppError::from(err) {
                AppError::Unauthorized(msg) => assert_eq!(msg, INVALID_LINK_MESSAGE),
                other => panic!("unexpected mapping: {:?}", other),
            }
        }
    }

    #[test]
    fn conflicts_map_to_409() {
        assert_eq!(
            AppError::from(AuthServiceError::AlreadyRevoked).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(AuthServiceError::CannotSend).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(AuthServiceError::CannotRevoke).status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn mail_failure_is_bad_gateway() {
        let err = AuthServiceError::Email(EmailError::SendFailed("boom".to_string()));
        assert_eq!(AppError::from(err).status(), StatusCode::BAD_GATEWAY);
    }
}
