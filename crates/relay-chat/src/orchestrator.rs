//! Session orchestrator.
//!
//! Turns one inbound platform event into fan-out sessions, admits each
//! through the filter chain and the atomic dedup claim, then hands claimed
//! sessions to a bounded worker pool. Workers ask the routed provider, run
//! the completion handlers and persist the result.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use relay_core::config::{CompletionPolicy, OrchestratorConfig};
use relay_core::store::{IdentityCache, SessionStore};
use relay_core::types::{InboundMessage, Session, SessionId, SessionStatus};

use crate::completion::{CompletionHandler, CompletionHandlers};
use crate::error::{ChatError, FilterRejection};
use crate::filter::{Filter, FilterChain};
use crate::router::AnswerRouter;

/// State shared between the orchestrator and its workers.
struct Shared {
    sessions: Arc<dyn SessionStore>,
    router: AnswerRouter,
    handlers: CompletionHandlers,
    policy: CompletionPolicy,
    depth: AtomicUsize,
}

/// Coordinates identity resolution, admission and the worker pool.
pub struct SessionOrchestrator {
    identity: Arc<dyn IdentityCache>,
    filters: FilterChain,
    shared: Arc<Shared>,
    config: OrchestratorConfig,
    queue: Mutex<Option<mpsc::Sender<Session>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionOrchestrator {
    /// Create the orchestrator and spawn its workers.
    ///
    /// Must be called from within a Tokio runtime. The filter chain starts
    /// empty; callers append the filters they want with [`add_filter`].
    ///
    /// [`add_filter`]: SessionOrchestrator::add_filter
    pub fn new(
        identity: Arc<dyn IdentityCache>,
        sessions: Arc<dyn SessionStore>,
        router: AnswerRouter,
        config: OrchestratorConfig,
    ) -> Self {
        let workers = config.workers.max(1);
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let shared = Arc::new(Shared {
            sessions,
            router,
            handlers: CompletionHandlers::new(),
            policy: config.completion_policy,
            depth: AtomicUsize::new(0),
        });

        let handles = (0..workers)
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let shared = Arc::clone(&shared);
                tokio::spawn(async move { worker_loop(worker, rx, shared).await })
            })
            .collect();

        info!(
            workers,
            queue_capacity = config.queue_capacity,
            policy = ?config.completion_policy,
            "Session orchestrator started"
        );

        Self {
            identity,
            filters: FilterChain::new(),
            shared,
            config,
            queue: Mutex::new(Some(tx)),
            workers: Mutex::new(handles),
        }
    }

    /// Append a filter to the admission chain.
    pub fn add_filter(&self, filter: Arc<dyn Filter>) {
        self.filters.push(filter);
    }

    /// Append a completion handler. Handlers run in registration order.
    pub fn add_completion_handler(&self, handler: Arc<dyn CompletionHandler>) {
        self.shared.handlers.push(handler);
    }

    /// Sessions claimed and queued but not yet picked up by a worker.
    pub fn queue_depth(&self) -> usize {
        self.shared.depth.load(Ordering::Relaxed)
    }

    /// Handle one delivered platform event.
    ///
    /// Business rejections (unknown sender, filter refusal, lost claim) are
    /// logged and return `Ok(())`. `Err` is reserved for a store that cannot
    /// be read while resolving the sender and for a shut-down worker pool.
    pub async fn on_incoming_message(&self, message: InboundMessage) -> Result<(), ChatError> {
        let session_id = message.session_id();

        let uid = match self
            .identity
            .resolve_uid(&message.platform, message.source_id())
        {
            Ok(uid) => uid,
            Err(e) if e.is_not_found() => {
                info!(
                    session_id = %session_id,
                    sender = message.source_id(),
                    "Unknown sender, message dropped"
                );
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let user = match self.identity.get_user(&uid)? {
            Some(user) => user,
            None => {
                info!(session_id = %session_id, uid = %uid, "User record missing, message dropped");
                return Ok(());
            }
        };

        let answer_ids = self.identity.get_default_answers(&uid)?;
        if answer_ids.is_empty() {
            info!(session_id = %session_id, uid = %uid, "No default answers, message dropped");
            return Ok(());
        }

        let sender = self.sender().await?;
        let delay = std::time::Duration::from_millis(self.config.fanout_delay_ms);

        for (branch, answer_id) in answer_ids.iter().enumerate() {
            if branch > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let session = Session::new(Some(user.clone()), answer_id, message.clone());

            if let Err(rejection) = self.filters.run(&session) {
                info!(
                    session_id = %session.id,
                    answer_id = %answer_id,
                    reason = %rejection,
                    "Session rejected"
                );
                continue;
            }

            match self.shared.sessions.try_claim(&session.id) {
                Ok(true) => {}
                Ok(false) => {
                    let rejection = FilterRejection::Duplicate(session.id.clone());
                    info!(
                        session_id = %session.id,
                        answer_id = %answer_id,
                        reason = %rejection,
                        "Session rejected"
                    );
                    continue;
                }
                Err(e) => {
                    warn!(
                        session_id = %session.id,
                        answer_id = %answer_id,
                        error = %e,
                        "Claim failed, branch abandoned"
                    );
                    continue;
                }
            }

            self.enqueue(&sender, session).await?;
        }

        Ok(())
    }

    /// Close the queue and wait for queued and in-flight sessions to finish.
    pub async fn shutdown(&self) {
        self.queue.lock().await.take();

        let handles = std::mem::take(&mut *self.workers.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task failed");
            }
        }
        info!("Session orchestrator stopped");
    }

    async fn sender(&self) -> Result<mpsc::Sender<Session>, ChatError> {
        self.queue.lock().await.clone().ok_or(ChatError::ShuttingDown)
    }

    async fn enqueue(
        &self,
        sender: &mpsc::Sender<Session>,
        session: Session,
    ) -> Result<(), ChatError> {
        let id = session.id.clone();
        let depth = self.shared.depth.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(session_id = %id, queue_depth = depth, "Session queued");

        if sender.send(session).await.is_err() {
            self.shared.depth.fetch_sub(1, Ordering::Relaxed);
            self.shared.fail(&id, "worker pool shut down");
            return Err(ChatError::ShuttingDown);
        }
        Ok(())
    }
}

async fn worker_loop(worker: usize, rx: Arc<Mutex<mpsc::Receiver<Session>>>, shared: Arc<Shared>) {
    debug!(worker, "Worker started");
    loop {
        let next = rx.lock().await.recv().await;
        let Some(session) = next else {
            break;
        };
        shared.depth.fetch_sub(1, Ordering::Relaxed);
        shared.process(session).await;
    }
    debug!(worker, "Worker stopped");
}

impl Shared {
    /// Dispatch, run completion handlers and persist one claimed session.
    async fn process(&self, mut session: Session) {
        let question = match session.question.text_content() {
            Some(text) => text.to_string(),
            None => {
                warn!(session_id = %session.id, "Session has no text to ask");
                self.fail(&session.id, "no text content");
                return;
            }
        };

        match self.router.dispatch(&session.answer_id, &question).await {
            Ok(answer) => session.answer = Some(answer),
            Err(e) => {
                warn!(
                    session_id = %session.id,
                    answer_id = %session.answer_id,
                    error = %e,
                    "Answer dispatch failed"
                );
                self.fail(&session.id, &e.to_string());
                return;
            }
        }

        for handler in self.handlers.snapshot() {
            if let Err(e) = handler.on_completion(&mut session).await {
                match self.policy {
                    CompletionPolicy::AbortAndDrop => {
                        warn!(
                            session_id = %session.id,
                            handler = handler.name(),
                            error = %e,
                            "Completion handler failed, session dropped"
                        );
                        self.fail(&session.id, &e.to_string());
                        return;
                    }
                    CompletionPolicy::PersistWithWarning => {
                        warn!(
                            session_id = %session.id,
                            handler = handler.name(),
                            error = %e,
                            "Completion handler failed, persisting partial completion"
                        );
                        break;
                    }
                }
            }
        }

        // The answer is already delivered; a failed history write must not
        // make the session re-claimable.
        if let Err(e) = self.sessions.save_session(&session) {
            error!(
                session_id = %session.id,
                error = %e,
                "Answer delivered but history not persisted"
            );
            self.mark(&session.id, SessionStatus::Completion);
            self.record_detail(&session.id, &format!("history not persisted: {}", e));
            return;
        }
        self.mark(&session.id, SessionStatus::Completion);
        info!(session_id = %session.id, answer_id = %session.answer_id, "Session completed");
    }

    fn fail(&self, id: &SessionId, detail: &str) {
        self.mark(id, SessionStatus::Error);
        self.record_detail(id, detail);
    }

    fn record_detail(&self, id: &SessionId, detail: &str) {
        if self.sessions.capabilities().error_detail {
            if let Err(e) = self.sessions.record_error(id, detail) {
                warn!(session_id = %id, error = %e, "Failed to record error detail");
            }
        }
    }

    fn mark(&self, id: &SessionId, status: SessionStatus) {
        if let Err(e) = self.sessions.set_status(id, status) {
            error!(
                session_id = %id,
                status = %status,
                error = %e,
                "Failed to record session status"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::EchoProvider;
    use relay_core::types::{User, UserStatus, UserUid};
    use relay_storage::{Database, SqliteIdentityCache, SqliteSessionStore};

    struct Fixture {
        identity: Arc<SqliteIdentityCache>,
        sessions: Arc<SqliteSessionStore>,
    }

    fn make_fixture() -> Fixture {
        let db = Arc::new(Database::in_memory().unwrap());
        Fixture {
            identity: Arc::new(SqliteIdentityCache::new(Arc::clone(&db))),
            sessions: Arc::new(SqliteSessionStore::new(db)),
        }
    }

    fn seed_user(fx: &Fixture, external_id: &str, answers: &[&str]) -> UserUid {
        let user = User {
            uid: UserUid::derive(external_id),
            name: external_id.to_string(),
            status: UserStatus::Active,
        };
        fx.identity.create_user(&user).unwrap();
        fx.identity
            .bind_identity("wecom", external_id, &user.uid)
            .unwrap();
        let answers: Vec<String> = answers.iter().map(|s| s.to_string()).collect();
        fx.identity.grant_entitlement(&user.uid, &answers).unwrap();
        fx.identity.set_default_answers(&user.uid, &answers).unwrap();
        user.uid
    }

    fn make_orchestrator(fx: &Fixture) -> SessionOrchestrator {
        let mut router = AnswerRouter::new();
        router.register("gpt-a", Arc::new(EchoProvider::new("re: ")));
        SessionOrchestrator::new(
            fx.identity.clone(),
            fx.sessions.clone(),
            router,
            OrchestratorConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_answer_persisted_and_completed() {
        let fx = make_fixture();
        seed_user(&fx, "ann", &["gpt-a"]);
        let orch = make_orchestrator(&fx);

        let msg = InboundMessage::text("wecom", "1", "ann", "hello");
        orch.on_incoming_message(msg).await.unwrap();
        orch.shutdown().await;

        let id = SessionId::new("wecom", "1");
        assert_eq!(
            fx.sessions.get_status(&id).unwrap(),
            SessionStatus::Completion
        );
        let saved = fx.sessions.get_session(&id).unwrap().unwrap();
        assert_eq!(saved.answer.as_deref(), Some("re: hello"));
        assert_eq!(orch.queue_depth(), 0);
    }

    #[tokio::test]
    async fn test_unknown_provider_marks_error() {
        let fx = make_fixture();
        seed_user(&fx, "ann", &["gpt-missing"]);
        let orch = make_orchestrator(&fx);

        let msg = InboundMessage::text("wecom", "2", "ann", "hello");
        orch.on_incoming_message(msg).await.unwrap();
        orch.shutdown().await;

        let id = SessionId::new("wecom", "2");
        assert_eq!(fx.sessions.get_status(&id).unwrap(), SessionStatus::Error);
        assert!(fx.sessions.get_session(&id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_user_without_defaults_is_dropped() {
        let fx = make_fixture();
        seed_user(&fx, "ann", &[]);
        let orch = make_orchestrator(&fx);

        let msg = InboundMessage::text("wecom", "3", "ann", "hello");
        orch.on_incoming_message(msg).await.unwrap();
        orch.shutdown().await;

        let id = SessionId::new("wecom", "3");
        assert_eq!(fx.sessions.get_status(&id).unwrap(), SessionStatus::None);
    }

    struct CountingReply(AtomicUsize);

    #[async_trait::async_trait]
    impl CompletionHandler for CountingReply {
        fn name(&self) -> &str {
            "counting_reply"
        }

        async fn on_completion(
            &self,
            _session: &mut Session,
        ) -> Result<(), crate::error::CompletionError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_delivered_answer_is_not_redelivered_when_save_fails() {
        let fx = make_fixture();
        let uid = seed_user(&fx, "ann", &["gpt-a"]);
        let user = fx.identity.get_user(&uid).unwrap().unwrap();
        let msg = InboundMessage::text("wecom", "5", "ann", "hello");

        // An existing history record makes the worker's save fail.
        fx.sessions
            .save_session(&Session::new(Some(user), "gpt-a", msg.clone()))
            .unwrap();

        let orch = make_orchestrator(&fx);
        let replies = Arc::new(CountingReply(AtomicUsize::new(0)));
        orch.add_completion_handler(replies.clone());

        orch.on_incoming_message(msg.clone()).await.unwrap();
        orch.shutdown().await;

        let id = SessionId::new("wecom", "5");
        assert_eq!(replies.0.load(Ordering::SeqCst), 1);
        assert_eq!(
            fx.sessions.get_status(&id).unwrap(),
            SessionStatus::Completion
        );
        assert!(!fx.sessions.try_claim(&id).unwrap());
    }

    #[tokio::test]
    async fn test_after_shutdown_is_rejected() {
        let fx = make_fixture();
        seed_user(&fx, "ann", &["gpt-a"]);
        let orch = make_orchestrator(&fx);
        orch.shutdown().await;

        let msg = InboundMessage::text("wecom", "4", "ann", "hello");
        let err = orch.on_incoming_message(msg).await.unwrap_err();
        assert!(matches!(err, ChatError::ShuttingDown));
        assert_eq!(
            fx.sessions.get_status(&SessionId::new("wecom", "4")).unwrap(),
            SessionStatus::None
        );
    }
}
