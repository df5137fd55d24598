// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Errors surfaced by the session core.
///
/// `Clone` so a single refresh outcome can be handed to every caller that
/// was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The refresh credential was rejected and the session has been cleared.
    #[error("session expired, please log in again")]
    SessionExpired,
    /// An auth endpoint answered 401/403.
    #[error("credentials rejected ({status})")]
    Rejected { status: u16 },
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    /// Non-success response from a resource endpoint.
    #[error("request failed ({status}): {body}")]
    Status { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// Cancelled because a newer request replaced it.
    #[error("request superseded")]
    Superseded,
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Timeouts and connectivity failures. These never end a session.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::Network(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status } | Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::Rejected { .. } => "REJECTED",
            Self::Timeout => "TIMEOUT",
            Self::Network(_) => "NETWORK",
            Self::Status { .. } => "STATUS",
            Self::InvalidResponse(_) => "INVALID_RESPONSE",
            Self::Superseded => "SUPERSEDED",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidResponse(e.to_string())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
