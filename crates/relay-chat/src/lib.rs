//! Session pipeline for the chat relay.
//!
//! Admits inbound platform events through a filter chain and an atomic
//! dedup claim, routes them to answer providers on a bounded worker pool,
//! and delivers answers through pluggable completion handlers.

pub mod admin;
pub mod completion;
pub mod error;
pub mod filter;
pub mod orchestrator;
pub mod router;

pub use admin::{ImportReport, RelayAdmin, RosterMember};
pub use completion::{CompletionHandler, CompletionHandlers};
pub use error::{ChatError, CompletionError, FilterRejection, ProviderError, RouterError};
pub use filter::{DefaultFilter, Filter, FilterChain};
pub use orchestrator::SessionOrchestrator;
pub use router::{provider_from_configure, AnswerProvider, AnswerRouter, EchoProvider};
