//! Interceptors that run around every workflow handler.

use std::sync::Arc;

use super::store::{SessionStore, keys};

/// Identity of a workflow handler: the page it belongs to and its action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerId {
    pub page: &'static str,
    pub action: &'static str,
}

impl HandlerId {
    pub const fn new(page: &'static str, action: &'static str) -> Self {
        Self { page, action }
    }
}

impl std::fmt::Display for HandlerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}", self.page, self.action)
    }
}

/// A stage run before and after a handler.
pub trait Interceptor: Send + Sync {
    fn before(&self, _handler: HandlerId, _store: &mut SessionStore) {}

    /// `notice` is the handler's user-facing outcome line, success or error.
    fn after(&self, _handler: HandlerId, _store: &mut SessionStore, _notice: &str) {}
}

/// Keeps per-page chat messages: clears them on page switch and records
/// each handler's notice.
pub struct HistoryInterceptor;

impl Interceptor for HistoryInterceptor {
    fn before(&self, handler: HandlerId, store: &mut SessionStore) {
        store.enter_page(handler.page);
    }

    fn after(&self, handler: HandlerId, store: &mut SessionStore, notice: &str) {
        if notice.is_empty() {
            return;
        }
        tracing::debug!(handler = %handler, notice, "Recording chat message");
        store.get_or_default(keys::MESSAGES).push(notice.to_string());
    }
}

/// Ordered interceptors; `before` runs first-to-last, `after` last-to-first.
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Interceptor>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pipeline with the chat-history stage installed.
    pub fn with_history() -> Self {
        Self::new().with(Arc::new(HistoryInterceptor))
    }

    pub fn with(mut self, stage: Arc<dyn Interceptor>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn before(&self, handler: HandlerId, store: &mut SessionStore) {
        for stage in &self.stages {
            stage.before(handler, store);
        }
    }

    pub fn after(&self, handler: HandlerId, store: &mut SessionStore, notice: &str) {
        for stage in self.stages.iter().rev() {
            stage.after(handler, store, notice);
        }
    }
}
