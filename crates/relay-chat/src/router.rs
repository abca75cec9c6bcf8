//! Answer provider trait and the router that dispatches to it by answer id.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use relay_core::types::Configure;

use crate::error::{ChatError, ProviderError, RouterError};

/// A backend that turns a question into an answer.
#[async_trait]
pub trait AnswerProvider: Send + Sync {
    async fn ask(&self, question: &str) -> Result<String, ProviderError>;

    /// Provider family label, for logs only.
    fn platform(&self) -> &str;
}

/// Maps answer ids to providers.
#[derive(Default)]
pub struct AnswerRouter {
    providers: HashMap<String, Arc<dyn AnswerProvider>>,
}

impl AnswerRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under an answer id, replacing any previous one.
    pub fn register(&mut self, answer_id: impl Into<String>, provider: Arc<dyn AnswerProvider>) {
        let answer_id = answer_id.into();
        tracing::info!(
            answer_id = %answer_id,
            platform = provider.platform(),
            "Answer provider registered"
        );
        self.providers.insert(answer_id, provider);
    }

    pub fn contains(&self, answer_id: &str) -> bool {
        self.providers.contains_key(answer_id)
    }

    /// Registered answer ids in lexical order.
    pub fn answer_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Ask the provider registered under `answer_id`.
    pub async fn dispatch(&self, answer_id: &str, question: &str) -> Result<String, RouterError> {
        let provider = self
            .providers
            .get(answer_id)
            .ok_or_else(|| RouterError::UnknownProvider(answer_id.to_string()))?;

        provider
            .ask(question)
            .await
            .map_err(|source| RouterError::Provider {
                answer_id: answer_id.to_string(),
                source,
            })
    }
}

/// Provider that answers with the question itself, optionally prefixed.
///
/// Useful for wiring checks and for the console adapter.
pub struct EchoProvider {
    prefix: String,
}

impl EchoProvider {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl AnswerProvider for EchoProvider {
    async fn ask(&self, question: &str) -> Result<String, ProviderError> {
        if question.trim().is_empty() {
            return Err(ProviderError::EmptyAnswer);
        }
        Ok(format!("{}{}", self.prefix, question))
    }

    fn platform(&self) -> &str {
        "echo"
    }
}

/// Build a provider from a stored configure blob, dispatching on its `kind`.
pub fn provider_from_configure(
    id: &str,
    configure: &Configure,
) -> Result<Arc<dyn AnswerProvider>, ChatError> {
    let kind = configure
        .get("kind")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ChatError::InvalidConfigure {
            id: id.to_string(),
            reason: "missing kind".to_string(),
        })?;

    match kind {
        "echo" => {
            let prefix = configure
                .get("prefix")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            Ok(Arc::new(EchoProvider::new(prefix)))
        }
        other => Err(ChatError::InvalidConfigure {
            id: id.to_string(),
            reason: format!("unsupported provider kind: {}", other),
        }),
    }
}
