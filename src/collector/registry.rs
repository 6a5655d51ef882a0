use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::pending::PendingWait;
use crate::error::{ExecResult, ExecutionError};

/// Identifies the replies belonging to one in-flight logical statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(pub u64);

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlation id → pending wait map shared by dispatchers and reply handlers
pub struct ResponseRegistry<T> {
    waits: DashMap<CorrelationId, Arc<PendingWait<T>>>,
    next_id: AtomicU64,
    discarded: AtomicU64,
}

impl<T> Default for ResponseRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ResponseRegistry<T> {
    pub fn new() -> Self {
        Self {
            waits: DashMap::new(),
            next_id: AtomicU64::new(1),
            discarded: AtomicU64::new(0),
        }
    }

    pub fn next_correlation_id(&self) -> CorrelationId {
        CorrelationId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a wait before the first unit is sent
    pub fn register(&self, id: CorrelationId, expected: usize) -> ExecResult<Arc<PendingWait<T>>> {
        match self.waits.entry(id) {
            Entry::Occupied(_) => Err(ExecutionError::InvalidState(format!(
                "correlation id {} already has a pending wait",
                id
            ))),
            Entry::Vacant(slot) => {
                let wait = Arc::new(PendingWait::new(expected));
                slot.insert(wait.clone());
                tracing::debug!("Registered wait {} expecting {} replies", id, expected);
                Ok(wait)
            }
        }
    }

    /// Register a wait that is removed again when the returned guard drops.
    ///
    /// Dispatchers hold the guard for the whole statement, so a cancelled
    /// statement does not leave its entry behind.
    pub fn register_scoped(&self, id: CorrelationId, expected: usize) -> ExecResult<Registration<'_, T>> {
        self.register(id, expected)?;
        Ok(Registration { registry: self, id })
    }

    /// Deliver a reply. Unknown ids and completed waits drop the reply.
    pub fn offer(&self, id: CorrelationId, item: T) -> bool {
        let wait = self.waits.get(&id).map(|w| w.value().clone());
        let accepted = match wait {
            Some(wait) => wait.offer(item),
            None => false,
        };
        if !accepted {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Discarding unexpected reply for correlation id {}", id);
        }
        accepted
    }

    /// Wait for every reply of `id`. The entry is removed on every outcome.
    pub async fn wait_for(&self, id: CorrelationId, timeout: Duration) -> ExecResult<Vec<T>> {
        let wait = self
            .waits
            .get(&id)
            .map(|w| w.value().clone())
            .ok_or_else(|| {
                ExecutionError::InvalidState(format!("no pending wait registered for correlation id {}", id))
            })?;

        if !wait.claim_waiter() {
            return Err(ExecutionError::InvalidState(format!(
                "correlation id {} is already being awaited",
                id
            )));
        }

        let _registration = Registration { registry: self, id };
        let collected = wait.wait(timeout).await;

        match collected {
            Some(items) => Ok(items),
            None => {
                tracing::warn!(
                    "Wait {} timed out after {:?} with {}/{} replies",
                    id,
                    timeout,
                    wait.accepted(),
                    wait.expected()
                );
                Err(ExecutionError::Timeout {
                    correlation_id: id.0,
                    waited: timeout,
                    received: wait.accepted(),
                    expected: wait.expected(),
                })
            }
        }
    }

    /// Drop a wait that will never be awaited
    pub fn unregister(&self, id: CorrelationId) -> bool {
        match self.waits.remove(&id) {
            Some((_, wait)) => {
                wait.close();
                true
            }
            None => false,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.waits.len()
    }

    /// Replies dropped because nobody was collecting them
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}

/// Keeps a correlation entry registered until dropped
pub struct Registration<'a, T> {
    registry: &'a ResponseRegistry<T>,
    id: CorrelationId,
}

impl<T> Registration<'_, T> {
    pub fn id(&self) -> CorrelationId {
        self.id
    }
}

impl<T> Drop for Registration<'_, T> {
    fn drop(&mut self) {
        if self.registry.unregister(self.id) {
            tracing::debug!("Removed wait {}", self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn test_register_offer_wait() {
        let registry = ResponseRegistry::new();
        let id = registry.next_correlation_id();
        registry.register(id, 2).unwrap();
        assert!(registry.offer(id, "b"));
        assert!(registry.offer(id, "a"));
        let replies = registry.wait_for(id, Duration::from_secs(1)).await.unwrap();
        assert_eq!(replies, vec!["b", "a"]);
        assert_eq!(registry.in_flight(), 0);
    }

    #[test]
    fn test_double_register_is_invalid() {
        let registry: ResponseRegistry<u8> = ResponseRegistry::new();
        let id = CorrelationId(42);
        registry.register(id, 1).unwrap();
        let err = registry.register(id, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn test_wait_unknown_id_is_invalid() {
        let registry: ResponseRegistry<u8> = ResponseRegistry::new();
        let err = registry
            .wait_for(CorrelationId(9), Duration::from_millis(5))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_offer_unknown_counts_discard() {
        let registry = ResponseRegistry::new();
        assert!(!registry.offer(CorrelationId(1), 1u8));
        assert_eq!(registry.discarded(), 1);
    }

    #[test]
    fn test_unregister_closes_wait() {
        let registry = ResponseRegistry::new();
        let id = registry.next_correlation_id();
        let wait = registry.register(id, 2).unwrap();
        assert!(registry.unregister(id));
        assert!(!wait.offer(1u8));
        assert!(!registry.unregister(id));
        assert_eq!(registry.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_wait_is_removed() {
        let registry: ResponseRegistry<u8> = ResponseRegistry::new();
        let id = registry.next_correlation_id();
        let wait = registry.register(id, 1).unwrap();

        let cancelled = tokio::time::timeout(
            Duration::from_millis(20),
            registry.wait_for(id, Duration::from_secs(5)),
        )
        .await;
        assert!(cancelled.is_err());
        assert_eq!(registry.in_flight(), 0);
        assert!(!wait.offer(1));
    }

    #[test]
    fn test_scoped_registration_removed_on_drop() {
        let registry: ResponseRegistry<u8> = ResponseRegistry::new();
        let id = registry.next_correlation_id();
        {
            let registration = registry.register_scoped(id, 2).unwrap();
            assert_eq!(registration.id(), id);
            assert!(registry.offer(id, 1));
            assert_eq!(registry.in_flight(), 1);
        }
        assert_eq!(registry.in_flight(), 0);
        assert!(!registry.offer(id, 2));
    }

    #[test]
    fn test_correlation_ids_are_unique() {
        let registry: ResponseRegistry<u8> = ResponseRegistry::new();
        let a = registry.next_correlation_id();
        let b = registry.next_correlation_id();
        assert_ne!(a, b);
    }
}
