//! Wire-level error codes sent to the client over the duplex channel.

use serde::{Deserialize, Serialize};

/// Classification of an `error` message, mirroring the error table in the
/// engine's error-handling design: each variant implies a fixed retryability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidToken,
    AdventureNotFound,
    StateCorrupted,
    GmError,
    AuthError,
    RateLimit,
    ProcessingTimeout,
}

impl ErrorCode {
    /// Whether the client may usefully retry the operation that produced
    /// this error, independent of any particular occurrence's context.
    pub fn default_retryable(self) -> bool {
        matches!(
            self,
            ErrorCode::RateLimit | ErrorCode::ProcessingTimeout | ErrorCode::GmError
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::InvalidToken => "INVALID_TOKEN",
            ErrorCode::AdventureNotFound => "ADVENTURE_NOT_FOUND",
            ErrorCode::StateCorrupted => "STATE_CORRUPTED",
            ErrorCode::GmError => "GM_ERROR",
            ErrorCode::AuthError => "AUTH_ERROR",
            ErrorCode::RateLimit => "RATE_LIMIT",
            ErrorCode::ProcessingTimeout => "PROCESSING_TIMEOUT",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_to_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::AdventureNotFound).unwrap();
        assert_eq!(json, "\"ADVENTURE_NOT_FOUND\"");
    }

    #[test]
    fn not_found_and_invalid_token_are_not_retryable() {
        assert!(!ErrorCode::AdventureNotFound.default_retryable());
        assert!(!ErrorCode::InvalidToken.default_retryable());
        assert!(!ErrorCode::StateCorrupted.default_retryable());
    }
}
