//! Unified infrastructure error plus the correlation-id wrapper that rides
//! along with it through logs (grounded on the teacher's
//! `infrastructure/error.rs` `InfraError`/`InfraErrorWithCorrelation` split).

use taleforge_shared::ErrorCode;

use super::agent::AgentError;
use super::correlation::CorrelationId;
use super::entity_manager::EntityManagerError;
use super::fs::FsError;
use super::state_store::StateStoreError;

#[derive(Debug, thiserror::Error)]
pub enum InfraError {
    #[error(transparent)]
    StateStore(#[from] StateStoreError),
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error(transparent)]
    Fs(#[from] FsError),
    #[error(transparent)]
    EntityManager(#[from] EntityManagerError),
    #[error("{0}")]
    Other(String),
}

impl InfraError {
    /// Classify this error into the wire error code table of spec §7.
    pub fn code(&self) -> ErrorCode {
        match self {
            InfraError::StateStore(StateStoreError::NotFound) => ErrorCode::AdventureNotFound,
            InfraError::StateStore(StateStoreError::InvalidToken) => ErrorCode::InvalidToken,
            InfraError::StateStore(StateStoreError::Corrupted { .. }) => ErrorCode::StateCorrupted,
            InfraError::StateStore(StateStoreError::InvalidId) => ErrorCode::AdventureNotFound,
            InfraError::StateStore(StateStoreError::Fs(_)) => ErrorCode::StateCorrupted,
            InfraError::Agent(agent_error) => match agent_error {
                AgentError::RateLimit(_) => ErrorCode::RateLimit,
                AgentError::Auth(_) => ErrorCode::AuthError,
                AgentError::Server(_) | AgentError::Transport(_) => ErrorCode::GmError,
                AgentError::InvalidRequest(_) => ErrorCode::GmError,
            },
            InfraError::Fs(_) => ErrorCode::StateCorrupted,
            InfraError::EntityManager(_) => ErrorCode::GmError,
            InfraError::Other(_) => ErrorCode::GmError,
        }
    }

    pub fn retryable(&self) -> bool {
        self.code().default_retryable()
    }

    /// Whether the hub should close the socket (1008) on this error, i.e.
    /// whether it arose during session initialization rather than mid-turn.
    pub fn is_init_fatal(&self) -> bool {
        matches!(self, InfraError::StateStore(_))
    }
}

/// An [`InfraError`] tagged with the correlation id of the request/session
/// that produced it, for structured logging (`[correlation_id=…] …`).
#[derive(Debug)]
pub struct InfraErrorWithCorrelation {
    pub correlation_id: CorrelationId,
    pub error: InfraError,
}

impl InfraErrorWithCorrelation {
    pub fn new(correlation_id: CorrelationId, error: impl Into<InfraError>) -> Self {
        Self {
            correlation_id,
            error: error.into(),
        }
    }
}

impl std::fmt::Display for InfraErrorWithCorrelation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[correlation_id={}] {}", self.correlation_id.short(), self.error)
    }
}

impl std::error::Error for InfraErrorWithCorrelation {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_state_store_not_found() {
        let error = InfraError::from(StateStoreError::NotFound);
        assert_eq!(error.code(), ErrorCode::AdventureNotFound);
        assert!(!error.retryable());
        assert!(error.is_init_fatal());
    }

    #[test]
    fn classifies_agent_rate_limit_as_retryable() {
        let error = InfraError::from(AgentError::RateLimit("slow down".into()));
        assert_eq!(error.code(), ErrorCode::RateLimit);
        assert!(error.retryable());
        assert!(!error.is_init_fatal());
    }

    #[test]
    fn display_includes_short_correlation_id() {
        let id = CorrelationId::new();
        let wrapped = InfraErrorWithCorrelation::new(id, StateStoreError::InvalidToken);
        let text = wrapped.to_string();
        assert!(text.contains(&id.short()));
    }
}
