use crate::infra::conversation_log::ConversationLog;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Conversation busy: {0}")]
    Busy(String),
}

type SlotMap = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// Per-conversation mutual exclusion for agent turns.
///
/// Locks are keyed on the conversation's storage name, so two ids that
/// share a log file also share a lock. The outer map lock is held only
/// while looking up or inserting the per-conversation mutex, never while
/// waiting on it. A slot is dropped from the map when its last guard is
/// released and nobody else is waiting.
#[derive(Default)]
pub struct TurnSerializer {
    locks: Arc<SlotMap>,
}

impl TurnSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock();
        locks.entry(key.to_string()).or_default().clone()
    }

    /// Wait until the conversation is free and take it.
    pub async fn acquire(&self, conversation_id: &str) -> TurnGuard {
        let start = Instant::now();
        let key = ConversationLog::sanitize_key(conversation_id);
        let slot = self.slot(&key);
        let guard = slot.lock_owned().await;

        TurnGuard {
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
            key,
            conversation_id: conversation_id.to_string(),
            wait_time: start.elapsed(),
        }
    }

    /// Like [`acquire`](Self::acquire) but gives up after `deadline`.
    pub async fn acquire_within(
        &self,
        conversation_id: &str,
        deadline: Duration,
    ) -> Result<TurnGuard, LockError> {
        tokio::time::timeout(deadline, self.acquire(conversation_id))
            .await
            .map_err(|_| LockError::Busy(conversation_id.to_string()))
    }

    /// Storage names whose turn lock is currently held, sorted.
    pub fn held(&self) -> Vec<String> {
        let locks = self.locks.lock();
        let mut held: Vec<String> = locks
            .iter()
            .filter(|(_, slot)| slot.try_lock().is_err())
            .map(|(key, _)| key.clone())
            .collect();
        held.sort();
        held
    }

    /// Number of conversations with a live lock slot.
    pub fn tracked(&self) -> usize {
        self.locks.lock().len()
    }
}

/// Exclusive hold on one conversation. Released on drop.
pub struct TurnGuard {
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<SlotMap>,
    key: String,
    conversation_id: String,
    wait_time: Duration,
}

impl TurnGuard {
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn wait_time(&self) -> Duration {
        self.wait_time
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.guard.take();

        // The map's own reference is the only one left: no holder, no waiter
        let mut locks = self.locks.lock();
        if locks
            .get(&self.key)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            locks.remove(&self.key);
        }
    }
}
