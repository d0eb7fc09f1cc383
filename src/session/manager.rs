//! Live sessions, one per operator.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use crate::error::WorkflowError;

use super::workflow::{Session, WorkflowDeps};

pub type SessionHandle = Arc<Mutex<Session>>;

struct Entry {
    handle: SessionHandle,
    /// Milliseconds since the manager's epoch at the last lookup.
    last_seen_ms: AtomicU64,
}

/// Holds every live session. Each session is locked for the duration of one
/// action, so actions within a session never interleave.
///
/// Sessions end on an explicit delete or after sitting idle; see
/// [`SessionManager::prune_idle`].
pub struct SessionManager {
    deps: Arc<WorkflowDeps>,
    sessions: RwLock<HashMap<Uuid, Entry>>,
    epoch: Instant,
}

impl SessionManager {
    pub fn new(deps: Arc<WorkflowDeps>) -> Self {
        Self {
            deps,
            sessions: RwLock::new(HashMap::new()),
            epoch: Instant::now(),
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    pub async fn create(&self) -> (Uuid, SessionHandle) {
        let id = Uuid::new_v4();
        let handle = Arc::new(Mutex::new(Session::new(id, self.deps.clone())));
        let entry = Entry {
            handle: handle.clone(),
            last_seen_ms: AtomicU64::new(self.now_ms()),
        };

        let mut sessions = self.sessions.write().await;
        sessions.insert(id, entry);
        info!(session_id = %id, live = sessions.len(), "Session created");
        (id, handle)
    }

    /// Look up a session and mark it as in use.
    pub async fn get(&self, id: Uuid) -> Result<SessionHandle, WorkflowError> {
        let sessions = self.sessions.read().await;
        let entry = sessions.get(&id).ok_or(WorkflowError::SessionNotFound(id))?;
        entry.last_seen_ms.store(self.now_ms(), Ordering::Relaxed);
        Ok(entry.handle.clone())
    }

    /// Drop a session. Returns whether it existed.
    pub async fn remove(&self, id: Uuid) -> bool {
        let removed = self.sessions.write().await.remove(&id).is_some();
        if removed {
            info!(session_id = %id, "Session closed");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop sessions not looked up for at least `max_idle`. A session that is
    /// mid-action is kept. Returns how many were dropped.
    pub async fn prune_idle(&self, max_idle: Duration) -> usize {
        let now = self.now_ms();
        let limit = max_idle.as_millis() as u64;

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, entry| {
            let idle_ms = now.saturating_sub(entry.last_seen_ms.load(Ordering::Relaxed));
            let keep = idle_ms < limit || entry.handle.try_lock().is_err();
            if !keep {
                info!(session_id = %id, idle_secs = idle_ms / 1000, "Pruning idle session");
            }
            keep
        });
        before - sessions.len()
    }

    /// Prune idle sessions on a fixed cadence for the life of the process.
    pub fn spawn_pruner(self: Arc<Self>, max_idle: Duration) -> JoinHandle<()> {
        let every = (max_idle / 2).clamp(Duration::from_secs(1), Duration::from_secs(600));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await; // Skip immediate first tick
            loop {
                interval.tick().await;
                let pruned = self.prune_idle(max_idle).await;
                if pruned > 0 {
                    let live = self.len().await;
                    info!(pruned, live, "Idle sessions pruned");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationConfig;
    use crate::dispatch::{Dispatcher, SmtpConfig, SmtpMailer};
    use crate::llm::{ConfiguredProviderFactory, LlmBackend, RetryPolicy};
    use crate::session::Pipeline;

    fn manager() -> SessionManager {
        let deps = WorkflowDeps {
            providers: Arc::new(ConfiguredProviderFactory::new(
                LlmBackend::Cohere,
                "command-r",
                RetryPolicy::default(),
            )),
            dispatcher: Arc::new(Dispatcher::new(Arc::new(SmtpMailer::new(
                SmtpConfig::default(),
            )))),
            generation: GenerationConfig::default(),
            dispatch_enabled: false,
            server_key: None,
            pipeline: Pipeline::with_history(),
        };
        SessionManager::new(Arc::new(deps))
    }

    #[tokio::test]
    async fn idle_sessions_are_pruned() {
        let manager = manager();
        let (id, _) = manager.create().await;

        assert_eq!(manager.prune_idle(Duration::from_secs(3600)).await, 0);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(manager.prune_idle(Duration::from_millis(10)).await, 1);

        assert_eq!(manager.len().await, 0);
        assert!(matches!(
            manager.get(id).await,
            Err(WorkflowError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn lookup_keeps_a_session_alive() {
        let manager = manager();
        let (id, _) = manager.create().await;

        tokio::time::sleep(Duration::from_millis(60)).await;
        manager.get(id).await.unwrap();
        assert_eq!(manager.prune_idle(Duration::from_millis(40)).await, 0);
        assert_eq!(manager.len().await, 1);
    }

    #[tokio::test]
    async fn busy_sessions_are_not_pruned() {
        let manager = manager();
        let (_, handle) = manager.create().await;

        let _guard = handle.lock().await;
        assert_eq!(manager.prune_idle(Duration::ZERO).await, 0);
    }

    #[tokio::test]
    async fn delete_removes_once() {
        let manager = manager();
        let (id, _) = manager.create().await;
        assert!(manager.remove(id).await);
        assert!(!manager.remove(id).await);
    }
}
