//! Error types for the relay pipeline.

use relay_core::error::{RelayError, StoreError};
use relay_core::types::{MessageType, SessionId, UserUid};

/// Why a filter refused a session.
#[derive(Debug, thiserror::Error)]
pub enum FilterRejection {
    #[error("user unauthorized")]
    Unauthorized,
    #[error("user [{0}] disabled")]
    Disabled(UserUid),
    #[error("message stale: sent {age_secs}s ago, window {window_secs}s")]
    Stale { age_secs: i64, window_secs: u64 },
    #[error("session [{0}] duplicate")]
    Duplicate(SessionId),
    #[error("message type unsupported: {0}")]
    Unsupported(MessageType),
    #[error("filter store error: {0}")]
    Store(#[from] StoreError),
}

impl FilterRejection {
    /// Access-check rejections, whatever the cause.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            FilterRejection::Unauthorized | FilterRejection::Disabled(_)
        )
    }
}

/// Errors raised by an answer provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("provider returned no answer")]
    EmptyAnswer,
}

/// Errors from routing a question to a provider.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("unknown provider [{0}]")]
    UnknownProvider(String),
    #[error("provider [{answer_id}] failed: {source}")]
    Provider {
        answer_id: String,
        #[source]
        source: ProviderError,
    },
}

/// A completion handler could not finish its side effect.
#[derive(Debug, thiserror::Error)]
#[error("completion handler [{handler}] failed: {reason}")]
pub struct CompletionError {
    pub handler: String,
    pub reason: String,
}

impl CompletionError {
    pub fn new(handler: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            reason: reason.into(),
        }
    }
}

/// Errors surfaced by the orchestrator and the administrative operations.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Configure [{id}] invalid: {reason}")]
    InvalidConfigure { id: String, reason: String },
    #[error("Worker pool is shut down")]
    ShuttingDown,
}

impl From<ChatError> for RelayError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::ShuttingDown => RelayError::ShuttingDown,
            ChatError::InvalidConfigure { .. } => RelayError::Config(err.to_string()),
            ChatError::Store(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_rejection_display() {
        let err = FilterRejection::Unauthorized;
        assert_eq!(err.to_string(), "user unauthorized");

        let err = FilterRejection::Stale {
            age_secs: 15,
            window_secs: 10,
        };
        assert_eq!(err.to_string(), "message stale: sent 15s ago, window 10s");

        let err = FilterRejection::Duplicate(SessionId::new("wecom", "7"));
        assert_eq!(err.to_string(), "session [wecom:7] duplicate");

        let err = FilterRejection::Unsupported(MessageType::Image);
        assert_eq!(err.to_string(), "message type unsupported: image");
    }

    #[test]
    fn test_disabled_counts_as_unauthorized() {
        assert!(FilterRejection::Disabled(UserUid::new("u-1")).is_unauthorized());
        assert!(FilterRejection::Unauthorized.is_unauthorized());
        assert!(!FilterRejection::Duplicate(SessionId::new("a", "b")).is_unauthorized());
    }

    #[test]
    fn test_filter_rejection_from_store_error() {
        let err: FilterRejection = StoreError::Unavailable("down".to_string()).into();
        assert!(matches!(err, FilterRejection::Store(_)));
        assert!(err.to_string().contains("down"));
    }

    #[test]
    fn test_router_error_display() {
        let err = RouterError::UnknownProvider("gpt-x".to_string());
        assert_eq!(err.to_string(), "unknown provider [gpt-x]");

        let err = RouterError::Provider {
            answer_id: "gpt-a".to_string(),
            source: ProviderError::Request("timeout".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "provider [gpt-a] failed: provider request failed: timeout"
        );
    }

    #[test]
    fn test_completion_error_display() {
        let err = CompletionError::new("reply", "socket closed");
        assert_eq!(
            err.to_string(),
            "completion handler [reply] failed: socket closed"
        );
    }

    #[test]
    fn test_chat_error_into_relay_error() {
        let err: RelayError = ChatError::ShuttingDown.into();
        assert!(matches!(err, RelayError::ShuttingDown));

        let err: RelayError = ChatError::Store(StoreError::NotFound("x".into())).into();
        assert!(matches!(err, RelayError::Storage(_)));

        let err: RelayError = ChatError::InvalidConfigure {
            id: "echo:1".to_string(),
            reason: "missing kind".to_string(),
        }
        .into();
        assert!(matches!(err, RelayError::Config(_)));
    }
}
