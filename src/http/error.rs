//! HTTP error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::MarketError;
use crate::model::Status;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub code: &'static str,
    pub message: String,
    /// Targets reachable from the current status, on an invalid transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Status>>,
    /// Present on OTP verification failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    allowed: Option<Vec<Status>>,
    valid: Option<bool>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            allowed: None,
            valid: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_error", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            "internal server error",
        )
    }

    pub const fn status(&self) -> StatusCode {
        self.status
    }

    pub const fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ApiErrorBody {
                code: self.code,
                message: self.message,
                allowed: self.allowed,
                valid: self.valid,
            }),
        )
            .into_response()
    }
}

impl From<MarketError> for ApiError {
    fn from(err: MarketError) -> Self {
        let status = match &err {
            MarketError::Validation(_)
            | MarketError::InvalidTransition { .. }
            | MarketError::AssignmentRequiresAccept
            | MarketError::OtpRequired(_)
            | MarketError::InvalidOtp
            | MarketError::OtpStatusMismatch { .. } => StatusCode::BAD_REQUEST,
            MarketError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            MarketError::Forbidden(_) | MarketError::VerificationRequired => StatusCode::FORBIDDEN,
            MarketError::TaskNotFound(_) | MarketError::ProfileNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            e if e.is_conflict() => StatusCode::CONFLICT,
            _ => {
                tracing::error!(error = %err, code = err.code(), "request failed");
                return Self::internal();
            }
        };

        let mut api = Self::new(status, err.code(), err.to_string());
        match err {
            MarketError::InvalidTransition { allowed, .. } => {
                api.allowed = Some(allowed.to_vec());
            }
            MarketError::InvalidOtp => api.valid = Some(false),
            _ => {}
        }
        api
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        tracing::error!(error = %err, "blocking task failed");
        Self::internal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OtpType;

    fn status_of(err: MarketError) -> StatusCode {
        ApiError::from(err).status()
    }

    #[test]
    fn domain_errors_map_to_status_codes() {
        assert_eq!(status_of(MarketError::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(MarketError::OtpRequired(OtpType::Start)), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(MarketError::AssignmentRequiresAccept), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(MarketError::Unauthorized("x".into())), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(MarketError::VerificationRequired), StatusCode::FORBIDDEN);
        assert_eq!(status_of(MarketError::Forbidden("x")), StatusCode::FORBIDDEN);
        assert_eq!(status_of(MarketError::TaskNotFound("t".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(MarketError::AlreadyTaken("t".into())), StatusCode::CONFLICT);
        assert_eq!(
            status_of(MarketError::StaleStatus {
                task_id: "t".into(),
                expected: Status::Assigned
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(MarketError::Config("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_errors_hide_detail() {
        let err = ApiError::from(MarketError::Config("secret path /etc/x".into()));
        assert_eq!(err.code(), "internal");
        assert!(!err.message().contains("/etc/x"));
    }

    #[test]
    fn invalid_transition_lists_allowed_targets() {
        let err = ApiError::from(MarketError::InvalidTransition {
            from: Status::Review,
            to: Status::Open,
            allowed: &[Status::Completed, Status::Disputed],
        });
        assert_eq!(err.allowed, Some(vec![Status::Completed, Status::Disputed]));
        assert_eq!(err.code(), "invalid_transition");
    }

    #[test]
    fn invalid_otp_reports_not_valid() {
        let err = ApiError::from(MarketError::InvalidOtp);
        assert_eq!(err.valid, Some(false));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
