//! Per-user serialization
//!
//! Only one response flow runs per user at a time, so the
//! lookup → create → store sequence cannot race for the same user.
//! Turns are granted in the order tickets were taken: callers that must
//! preserve arrival order take the [`Ticket`] synchronously, before
//! spawning the work that waits on it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;
use tokio::sync::oneshot;

#[derive(Debug, Default)]
struct Slot {
    state: Mutex<SlotState>,
}

#[derive(Debug, Default)]
struct SlotState {
    busy: bool,
    waiters: VecDeque<oneshot::Sender<()>>,
}

impl Slot {
    fn state(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Hand the turn to the next live waiter; returns false when idle
    fn pass_on(&self) -> bool {
        let mut state = self.state();
        while let Some(next) = state.waiters.pop_front() {
            // A closed receiver is an abandoned ticket
            if next.send(()).is_ok() {
                return true;
            }
        }
        state.busy = false;
        false
    }
}

type Slots = Arc<DashMap<String, Arc<Slot>>>;

/// FIFO turn queue per user id
///
/// Entries exist only while a user has a turn running or queued.
#[derive(Debug, Default, Clone)]
pub struct UserLocks {
    slots: Slots,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next turn for `user_id` without waiting
    pub fn ticket(&self, user_id: &str) -> Ticket {
        let slot = Arc::clone(
            self.slots
                .entry(user_id.to_string())
                .or_default()
                .value(),
        );

        let waiting = {
            let mut state = slot.state();
            if state.busy {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                Some(rx)
            } else {
                state.busy = true;
                None
            }
        };

        Ticket {
            slots: Arc::clone(&self.slots),
            user_id: user_id.to_string(),
            slot: Some(slot),
            waiting,
        }
    }

    /// Wait for exclusive access for `user_id`; released on drop
    pub async fn acquire(&self, user_id: &str) -> UserGuard {
        self.ticket(user_id).wait().await
    }

    /// Number of users with a turn running or queued
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Release the turn held through `slot` and forget the user when idle
fn release(slots: &Slots, user_id: &str, slot: Arc<Slot>) {
    if slot.pass_on() {
        return;
    }
    drop(slot);
    forget_if_idle(slots, user_id);
}

/// Remove the entry unless another ticket still references it
fn forget_if_idle(slots: &Slots, user_id: &str) {
    slots.remove_if(user_id, |_, slot| {
        Arc::strong_count(slot) == 1 && !slot.state().busy
    });
}

/// A reserved place in a user's queue
///
/// Dropping a ticket before its turn comes gives the place up.
#[derive(Debug)]
pub struct Ticket {
    slots: Slots,
    user_id: String,
    slot: Option<Arc<Slot>>,
    waiting: Option<oneshot::Receiver<()>>,
}

impl Ticket {
    /// Wait until every earlier ticket for the same user has been released
    pub async fn wait(mut self) -> UserGuard {
        if let Some(rx) = self.waiting.as_mut() {
            // The sender is only dropped unsent when this receiver is closed
            let _ = rx.await;
        }
        self.waiting = None;

        UserGuard {
            slots: Arc::clone(&self.slots),
            user_id: std::mem::take(&mut self.user_id),
            slot: self.slot.take(),
        }
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        let Some(slot) = self.slot.take() else {
            return;
        };

        let owns_turn = match self.waiting.as_mut() {
            None => true,
            Some(rx) => {
                rx.close();
                rx.try_recv().is_ok()
            }
        };

        if owns_turn {
            release(&self.slots, &self.user_id, slot);
        } else {
            // The holder may have released while this ticket was closing
            drop(slot);
            forget_if_idle(&self.slots, &self.user_id);
        }
    }
}

/// Exclusive turn for one user; the next ticket proceeds on drop
#[derive(Debug)]
pub struct UserGuard {
    slots: Slots,
    user_id: String,
    slot: Option<Arc<Slot>>,
}

impl Drop for UserGuard {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            release(&self.slots, &self.user_id, slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_user_waits() {
        let locks = UserLocks::new();
        let guard = locks.acquire("wa_1").await;

        let other = locks.clone();
        let waiter = tokio::spawn(async move {
            let _guard = other.acquire("wa_1").await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_users_do_not_block() {
        let locks = UserLocks::new();
        let _a = locks.acquire("wa_1").await;
        let _b = tokio::time::timeout(Duration::from_millis(50), locks.acquire("wa_2"))
            .await
            .expect("second user should not wait");
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_turns_follow_ticket_order() {
        let locks = UserLocks::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let tickets: Vec<_> = (0..20).map(|i| (i, locks.ticket("wa_1"))).collect();
        // Spawn in reverse so scheduling alone would invert the order
        let handles: Vec<_> = tickets
            .into_iter()
            .rev()
            .map(|(i, ticket)| {
                let order = Arc::clone(&order);
                tokio::spawn(async move {
                    let _turn = ticket.wait().await;
                    order.lock().unwrap().push(i);
                    tokio::task::yield_now().await;
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), (0..20).collect::<Vec<_>>());
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_ticket_is_skipped() {
        let locks = UserLocks::new();
        let first = locks.acquire("wa_1").await;
        let abandoned = locks.ticket("wa_1");
        let third = locks.ticket("wa_1");

        drop(abandoned);
        drop(first);

        let _turn = tokio::time::timeout(Duration::from_millis(50), third.wait())
            .await
            .expect("queue should move past the dropped ticket");
    }

    #[tokio::test]
    async fn test_cancelled_wait_passes_the_turn() {
        let locks = UserLocks::new();
        let first = locks.acquire("wa_1").await;

        let cancelled = locks.ticket("wa_1");
        let last = locks.ticket("wa_1");
        let pending = tokio::spawn(cancelled.wait());
        tokio::task::yield_now().await;
        pending.abort();
        let _ = pending.await;

        drop(first);
        let _turn = tokio::time::timeout(Duration::from_millis(50), last.wait())
            .await
            .expect("turn should not be lost with the cancelled waiter");
    }

    #[tokio::test]
    async fn test_idle_users_are_forgotten() {
        let locks = UserLocks::new();
        for i in 0..10_000 {
            let _guard = locks.acquire(&format!("wa_{}", i)).await;
        }
        assert_eq!(locks.len(), 0);

        let held = locks.acquire("wa_1").await;
        let queued = locks.ticket("wa_1");
        drop(held);
        assert_eq!(locks.len(), 1);
        drop(queued.wait().await);
        assert!(locks.is_empty());
    }
}
