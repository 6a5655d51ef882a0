use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitStatus {
    Collecting,
    Complete,
    Delivered,
    Closed,
}

#[derive(Debug)]
struct WaitState<T> {
    collected: Vec<T>,
    accepted: usize,
    status: WaitStatus,
}

/// Collects the replies of one in-flight logical statement.
///
/// Replies are kept in arrival order. The wait completes exactly once, when
/// `expected` replies have been accepted; after that, or after it was closed
/// by a timeout, every offer is refused.
#[derive(Debug)]
pub struct PendingWait<T> {
    expected: usize,
    state: Mutex<WaitState<T>>,
    done: Notify,
    waiter_claimed: AtomicBool,
}

impl<T> PendingWait<T> {
    pub fn new(expected: usize) -> Self {
        let status = if expected == 0 {
            WaitStatus::Complete
        } else {
            WaitStatus::Collecting
        };
        Self {
            expected,
            state: Mutex::new(WaitState {
                collected: Vec::with_capacity(expected),
                accepted: 0,
                status,
            }),
            done: Notify::new(),
            waiter_claimed: AtomicBool::new(false),
        }
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Number of replies accepted so far
    pub fn accepted(&self) -> usize {
        self.state.lock().accepted
    }

    pub fn is_complete(&self) -> bool {
        matches!(
            self.state.lock().status,
            WaitStatus::Complete | WaitStatus::Delivered
        )
    }

    /// Append a reply; returns `false` when the wait no longer collects
    pub fn offer(&self, item: T) -> bool {
        let completed = {
            let mut state = self.state.lock();
            if state.status != WaitStatus::Collecting {
                return false;
            }
            state.collected.push(item);
            state.accepted += 1;
            if state.accepted >= self.expected {
                state.status = WaitStatus::Complete;
                true
            } else {
                false
            }
        };
        if completed {
            // notify_one keeps a permit when nobody is waiting yet
            self.done.notify_one();
        }
        true
    }

    /// Stop collecting; later offers are refused
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.status == WaitStatus::Collecting {
            state.status = WaitStatus::Closed;
        }
    }

    pub(crate) fn claim_waiter(&self) -> bool {
        !self.waiter_claimed.swap(true, Ordering::AcqRel)
    }

    fn take_if_complete(&self) -> Option<Vec<T>> {
        let mut state = self.state.lock();
        if state.status == WaitStatus::Complete {
            state.status = WaitStatus::Delivered;
            Some(std::mem::take(&mut state.collected))
        } else {
            None
        }
    }

    /// Wait until every expected reply arrived, or `None` on timeout.
    ///
    /// A timed out wait is closed before returning.
    pub async fn wait(&self, timeout: Duration) -> Option<Vec<T>> {
        let collected = tokio::time::timeout(timeout, async {
            loop {
                if let Some(items) = self.take_if_complete() {
                    return items;
                }
                self.done.notified().await;
            }
        })
        .await;

        match collected {
            Ok(items) => Some(items),
            Err(_) => {
                self.close();
                // completed between the deadline and the close
                self.take_if_complete()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_completes_in_arrival_order() {
        let wait = Arc::new(PendingWait::new(3));
        for item in [3, 1, 2] {
            assert!(wait.offer(item));
        }
        assert!(wait.is_complete());
        assert_eq!(wait.wait(Duration::from_millis(10)).await, Some(vec![3, 1, 2]));
    }

    #[tokio::test]
    async fn test_offer_after_completion_is_refused() {
        let wait = PendingWait::new(1);
        assert!(wait.offer("a"));
        assert!(!wait.offer("b"));
        assert_eq!(wait.accepted(), 1);
        assert_eq!(wait.wait(Duration::from_millis(10)).await, Some(vec!["a"]));
        assert!(!wait.offer("c"));
    }

    #[tokio::test]
    async fn test_zero_expected_is_complete() {
        let wait: PendingWait<u8> = PendingWait::new(0);
        assert!(wait.is_complete());
        assert_eq!(wait.wait(Duration::from_millis(1)).await, Some(vec![]));
    }

    #[tokio::test]
    async fn test_timeout_closes() {
        let wait = PendingWait::new(2);
        assert!(wait.offer(1));
        assert_eq!(wait.wait(Duration::from_millis(20)).await, None);
        assert!(!wait.offer(2));
        assert_eq!(wait.accepted(), 1);
    }

    #[tokio::test]
    async fn test_wakes_on_concurrent_offers() {
        let wait = Arc::new(PendingWait::new(4));
        for i in 0..4 {
            let wait = wait.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(5 * (4 - i))).await;
                wait.offer(i);
            });
        }
        let mut items = wait.wait(Duration::from_secs(2)).await.unwrap();
        items.sort();
        assert_eq!(items, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_single_waiter_claim() {
        let wait: PendingWait<u8> = PendingWait::new(1);
        assert!(wait.claim_waiter());
        assert!(!wait.claim_waiter());
    }
}
