use axum::http::StatusCode;
use serde::Serialize;

/// Caller-facing classification shared by every membership error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Malformed or out-of-range input, rejected before any write.
    Validation,
    InsufficientBalance,
    InsufficientCoins,
    BelowMinimum,
    AlreadyCheckedIn,
    Disabled,
    NotFound,
    /// Caller lacks the approval status or role the action needs.
    Forbidden,
    /// Action conflicts with existing state (already engaged, not pending).
    Conflict,
    /// Storage failed mid-unit; nothing was applied and the whole unit may be retried.
    Transient,
}

impl FailureKind {
    pub fn status_code(&self) -> StatusCode {
        match self {
            FailureKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            FailureKind::InsufficientBalance
            | FailureKind::InsufficientCoins
            | FailureKind::BelowMinimum
            | FailureKind::AlreadyCheckedIn
            | FailureKind::Conflict => StatusCode::CONFLICT,
            FailureKind::Disabled | FailureKind::Forbidden => StatusCode::FORBIDDEN,
            FailureKind::NotFound => StatusCode::NOT_FOUND,
            FailureKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::Transient)
    }
}
