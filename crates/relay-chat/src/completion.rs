//! Completion handlers: side effects run after an answer is produced.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use relay_core::types::Session;

use crate::error::CompletionError;

/// Receives a session once its answer is set.
///
/// Handlers run in registration order and may mutate the session before it
/// is persisted.
#[async_trait]
pub trait CompletionHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn on_completion(&self, session: &mut Session) -> Result<(), CompletionError>;
}

/// Registration-ordered handler list, appendable at runtime.
#[derive(Default)]
pub struct CompletionHandlers {
    handlers: RwLock<Vec<Arc<dyn CompletionHandler>>>,
}

impl CompletionHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, handler: Arc<dyn CompletionHandler>) {
        tracing::debug!(handler = handler.name(), "Completion handler registered");
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }

    /// Current handlers, cloned so no lock is held across `.await`.
    pub fn snapshot(&self) -> Vec<Arc<dyn CompletionHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::types::InboundMessage;

    struct Tag(&'static str);

    #[async_trait]
    impl CompletionHandler for Tag {
        fn name(&self) -> &str {
            self.0
        }

        async fn on_completion(&self, session: &mut Session) -> Result<(), CompletionError> {
            let answer = session.answer.take().unwrap_or_default();
            session.answer = Some(format!("{}{}", answer, self.0));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_snapshot_keeps_registration_order() {
        let handlers = CompletionHandlers::new();
        assert!(handlers.is_empty());
        handlers.push(Arc::new(Tag("a")));
        handlers.push(Arc::new(Tag("b")));
        assert_eq!(handlers.len(), 2);

        let mut session = Session::new(None, "gpt-a", InboundMessage::text("wecom", "1", "x", "q"));
        for handler in handlers.snapshot() {
            handler.on_completion(&mut session).await.unwrap();
        }
        assert_eq!(session.answer.as_deref(), Some("ab"));
    }
}
