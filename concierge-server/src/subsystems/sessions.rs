//! Session store subsystem
//!
//! Conversation state lives behind the `SessionStore` trait so the
//! orchestrator never depends on where it is kept. Turns on the same session
//! id are serialized with `SessionLocks`; different ids proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use concierge_core::models::Session;
use concierge_core::StoreError;
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard, RwLock};

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Session>, StoreError>;

    async fn put(&self, session: Session) -> Result<(), StoreError>;

    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    /// Ids of sessions whose last activity is older than `cutoff`.
    async fn list_expired(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>, StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn put(&self, session: Session) -> Result<(), StoreError> {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.sessions.write().await.remove(id).is_some())
    }

    async fn list_expired(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>, StoreError> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.is_expired(cutoff))
            .map(|s| s.id.clone())
            .collect())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.sessions.read().await.len())
    }
}

// ============================================================================
// Per-session locks
// ============================================================================

/// Keyed async mutexes. Entries are held weakly and pruned once unused.
#[derive(Debug, Default)]
pub struct SessionLocks {
    locks: StdMutex<HashMap<String, Weak<Mutex<()>>>>,
}

const PRUNE_THRESHOLD: usize = 1024;

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id` for the duration of the returned guard.
    pub async fn acquire(&self, id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if locks.len() >= PRUNE_THRESHOLD {
                locks.retain(|_, weak| weak.strong_count() > 0);
            }
            match locks.get(id).and_then(Weak::upgrade) {
                Some(existing) => existing,
                None => {
                    let fresh = Arc::new(Mutex::new(()));
                    locks.insert(id.to_string(), Arc::downgrade(&fresh));
                    fresh
                }
            }
        };
        lock.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .map(|l| l.values().filter(|w| w.strong_count() > 0).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Expiry
// ============================================================================

/// Remove every session idle for longer than `idle_timeout`. Returns how many were removed.
///
/// Each candidate is re-read under its session lock; a session touched by a
/// turn after it was listed is kept.
pub async fn purge_expired(
    store: &dyn SessionStore,
    locks: &SessionLocks,
    now: DateTime<Utc>,
    idle_timeout: Duration,
) -> Result<usize, StoreError> {
    let cutoff = now - idle_timeout;
    let expired = store.list_expired(cutoff).await?;
    let mut purged = 0;
    for id in expired {
        let _guard = locks.acquire(&id).await;
        match store.get(&id).await? {
            Some(session) if session.is_expired(cutoff) => {
                if store.delete(&id).await? {
                    purged += 1;
                }
            }
            Some(_) => tracing::debug!(session_id = %id, "Session became active; not purged"),
            None => {}
        }
    }
    if purged > 0 {
        tracing::info!(purged, "Expired sessions purged");
    }
    Ok(purged)
}

/// Background loop: purge expired sessions every `interval_minutes` until shutdown.
pub async fn run_session_sweeper(
    store: Arc<dyn SessionStore>,
    locks: Arc<SessionLocks>,
    idle_timeout_minutes: u64,
    interval_minutes: u64,
    mut shutdown: broadcast::Receiver<()>,
) {
    if interval_minutes == 0 {
        tracing::info!("Session sweeper disabled");
        return;
    }

    let interval = tokio::time::Duration::from_secs(interval_minutes * 60);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let idle_timeout = Duration::minutes(idle_timeout_minutes as i64);

    tracing::info!(
        "Session sweeper started (interval: {}min, idle timeout: {}min)",
        interval_minutes,
        idle_timeout_minutes
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = purge_expired(store.as_ref(), &locks, Utc::now(), idle_timeout).await {
                    tracing::warn!("Session sweep error (non-fatal): {}", e);
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Session sweeper shutting down");
                break;
            }
        }
    }
}
