use std::time::Duration;

use thiserror::Error;

use super::permissions::Rank;
use crate::db::backend::BackendError;

/// Authorization failures. User-facing: report to the requesting member and
/// take no further action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("rank {actor} is below the required {required}")]
    InsufficientRank { actor: Rank, required: Rank },
    #[error("cannot act on a member ranked {target} from rank {actor}")]
    CannotActOnEqualOrHigher { actor: Rank, target: Rank },
    #[error("unknown target member")]
    UnknownTarget,
}

impl AuthError {
    /// Stable reason code for adapters.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InsufficientRank { .. } => "insufficient_rank",
            Self::CannotActOnEqualOrHigher { .. } => "cannot_act_on_equal_or_higher",
            Self::UnknownTarget => "unknown_target",
        }
    }
}

/// Infrastructure failures from the group store. Retryable.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to persist group {group_id}: {source}")]
    WriteFailure {
        group_id: String,
        #[source]
        source: BackendError,
    },
    #[error("failed to load group {group_id}: {source}")]
    ReadFailure {
        group_id: String,
        #[source]
        source: BackendError,
    },
    #[error("timed out after {waited:?} waiting for group {group_id}")]
    LockTimeout { group_id: String, waited: Duration },
}

/// Anything an engine operation can fail with.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl EngineError {
    pub fn auth(&self) -> Option<&AuthError> {
        match self {
            Self::Auth(e) => Some(e),
            _ => None,
        }
    }

    /// True for conditions the caller may retry (store outages, lock timeouts).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_codes() {
        assert_eq!(
            AuthError::InsufficientRank {
                actor: Rank::REGULAR,
                required: Rank::ADMIN
            }
            .code(),
            "insufficient_rank"
        );
        assert_eq!(
            AuthError::CannotActOnEqualOrHigher {
                actor: Rank::ADMIN,
                target: Rank::ADMIN
            }
            .code(),
            "cannot_act_on_equal_or_higher"
        );
        assert_eq!(AuthError::UnknownTarget.code(), "unknown_target");
    }

    #[test]
    fn test_auth_error_display() {
        let e = AuthError::InsufficientRank {
            actor: Rank::MODERATOR,
            required: Rank::ADMIN,
        };
        assert_eq!(e.to_string(), "rank moderator is below the required admin");
    }

    #[test]
    fn test_engine_error_classification() {
        let auth: EngineError = AuthError::UnknownTarget.into();
        assert!(!auth.is_retryable());
        assert_eq!(auth.auth(), Some(&AuthError::UnknownTarget));

        let timeout: EngineError = StoreError::LockTimeout {
            group_id: "g".into(),
            waited: Duration::from_millis(10),
        }
        .into();
        assert!(timeout.is_retryable());
        assert!(timeout.auth().is_none());
    }
}
