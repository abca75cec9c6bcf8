//! Admission filters run on every fan-out branch before it is claimed.
//!
//! A [`FilterChain`] is ordered and short-circuiting: the first rejection
//! stops evaluation. Filters can be appended while the relay is running.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{Duration, Utc};

use relay_core::config::FilterConfig;
use relay_core::store::SessionStore;
use relay_core::types::{Session, SessionStatus};

use crate::error::FilterRejection;

/// A single admission check.
pub trait Filter: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// `Ok(())` admits the session; any error rejects it with a reason.
    fn do_filter(&self, session: &Session) -> Result<(), FilterRejection>;
}

/// Ordered, appendable list of filters.
#[derive(Default)]
pub struct FilterChain {
    filters: RwLock<Vec<Arc<dyn Filter>>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a filter to the end of the chain.
    pub fn push(&self, filter: Arc<dyn Filter>) {
        self.filters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(filter);
    }

    pub fn len(&self) -> usize {
        self.filters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every filter in order until one rejects.
    pub fn run(&self, session: &Session) -> Result<(), FilterRejection> {
        let filters = self
            .filters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for filter in &filters {
            if let Err(rejection) = filter.do_filter(session) {
                tracing::debug!(
                    session_id = %session.id,
                    filter = filter.name(),
                    reason = %rejection,
                    "Filter rejected session"
                );
                return Err(rejection);
            }
        }
        Ok(())
    }
}

/// The standard admission policy: access, freshness, duplicate, content type.
pub struct DefaultFilter {
    sessions: Arc<dyn SessionStore>,
    config: FilterConfig,
}

impl DefaultFilter {
    pub fn new(sessions: Arc<dyn SessionStore>, config: FilterConfig) -> Self {
        Self { sessions, config }
    }

    fn check_access(&self, session: &Session) -> Result<(), FilterRejection> {
        match &session.user {
            None => Err(FilterRejection::Unauthorized),
            Some(user) if !user.is_active() => Err(FilterRejection::Disabled(user.uid.clone())),
            Some(_) => Ok(()),
        }
    }

    fn check_freshness(&self, session: &Session) -> Result<(), FilterRejection> {
        let age = Utc::now() - session.question.send_time();
        if age > Duration::seconds(self.config.staleness_secs as i64) {
            return Err(FilterRejection::Stale {
                age_secs: age.num_seconds(),
                window_secs: self.config.staleness_secs,
            });
        }
        Ok(())
    }

    fn check_duplicate(&self, session: &Session) -> Result<(), FilterRejection> {
        let duplicate = match self.sessions.get_status(&session.id)? {
            SessionStatus::Processing | SessionStatus::Completion => true,
            SessionStatus::Error => self.config.reject_failed_redelivery,
            SessionStatus::None => false,
        };
        if duplicate {
            return Err(FilterRejection::Duplicate(session.id.clone()));
        }
        Ok(())
    }

    fn check_content(&self, session: &Session) -> Result<(), FilterRejection> {
        let kind = session.question.message_type;
        if !self.config.supported_types.contains(&kind) {
            return Err(FilterRejection::Unsupported(kind));
        }
        Ok(())
    }
}

impl Filter for DefaultFilter {
    fn name(&self) -> &str {
        "default"
    }

    fn do_filter(&self, session: &Session) -> Result<(), FilterRejection> {
        self.check_access(session)?;
        self.check_freshness(session)?;
        self.check_duplicate(session)?;
        self.check_content(session)
    }
}
