use thiserror::Error;

use crate::model::{OtpType, Status};

#[derive(Debug, Error)]
pub enum MarketError {
    #[error("task {0} not found")]
    TaskNotFound(String),

    #[error("profile for {0} not found")]
    ProfileNotFound(String),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: Status,
        to: Status,
        allowed: &'static [Status],
    },

    #[error("tasks are assigned by accepting them, not by a status change")]
    AssignmentRequiresAccept,

    #[error("task is no longer available (status: {0})")]
    TaskUnavailable(Status),

    #[error("task {0} has already been accepted by another freelancer")]
    AlreadyTaken(String),

    #[error("task {task_id} changed concurrently (expected status {expected})")]
    StaleStatus { task_id: String, expected: Status },

    #[error("only verified freelancers can accept nearby tasks")]
    VerificationRequired,

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0} OTP required for this transition")]
    OtpRequired(OtpType),

    #[error("invalid or expired OTP")]
    InvalidOtp,

    #[error("task must be {required} to issue a {otp_type} OTP (status: {actual})")]
    OtpStatusMismatch {
        otp_type: OtpType,
        required: Status,
        actual: Status,
    },

    #[error("{0}")]
    Validation(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("database {} not found; run `taskmarket init` first", .0.display())]
    NotInitialized(std::path::PathBuf),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("random source unavailable: {0}")]
    RandomSource(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

impl MarketError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::TaskNotFound(_) => "task_not_found",
            Self::ProfileNotFound(_) => "profile_not_found",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::AssignmentRequiresAccept => "assignment_requires_accept",
            Self::TaskUnavailable(_) => "task_unavailable",
            Self::AlreadyTaken(_) => "already_taken",
            Self::StaleStatus { .. } => "stale_status",
            Self::VerificationRequired => "verification_required",
            Self::Forbidden(_) => "forbidden",
            Self::OtpRequired(_) => "otp_required",
            Self::InvalidOtp => "invalid_otp",
            Self::OtpStatusMismatch { .. } => "otp_status_mismatch",
            Self::Validation(_) => "validation_error",
            Self::Unauthorized(_) => "unauthorized",
            Self::NotInitialized(_) => "not_initialized",
            Self::Config(_) => "config_error",
            Self::RandomSource(_) => "random_source_error",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
            Self::Yaml(_) => "yaml_error",
            Self::Db(_) => "db_error",
        }
    }

    /// Errors that indicate a losing race or stale read rather than bad input.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::TaskUnavailable(_) | Self::AlreadyTaken(_) | Self::StaleStatus { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, MarketError>;
