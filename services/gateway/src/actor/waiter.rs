//! Passive waiter records (spec §4.3, §9). A waiter is never a blocked
//! task — it is data the actor scans on every append/close/delete and
//! completes through a stored oneshot, so the mailbox loop is never stuck
//! behind an idle long-poll or SSE session.

use tokio::sync::oneshot;

use crate::http::response::ApiError;

use super::messages::ReadOutcome;

pub struct Waiter {
    pub id: u64,
    /// Numeric stream offset the waiter is waiting to see.
    pub expected_offset: i64,
    /// The stream's `segment_start` at registration time, echoed back in
    /// the encoded offset of whatever response finally wakes this waiter.
    pub segment_start: i64,
    pub max_chunk_bytes: usize,
    pub reply: oneshot::Sender<Result<ReadOutcome, ApiError>>,
}

#[derive(Default)]
pub struct WaiterRegistry {
    next_id: u64,
    waiters: Vec<Waiter>,
}

impl WaiterRegistry {
    pub fn register(
        &mut self,
        expected_offset: i64,
        segment_start: i64,
        max_chunk_bytes: usize,
        reply: oneshot::Sender<Result<ReadOutcome, ApiError>>,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.waiters.push(Waiter {
            id,
            expected_offset,
            segment_start,
            max_chunk_bytes,
            reply,
        });
        id
    }

    /// Removes and returns every waiter whose `expected_offset` has been
    /// reached, in FIFO registration order (spec §4.3 "waiter fairness").
    pub fn drain_satisfied(&mut self, new_tail: i64) -> Vec<Waiter> {
        let (keep, satisfied): (Vec<_>, Vec<_>) = std::mem::take(&mut self.waiters)
            .into_iter()
            .partition(|w| w.expected_offset > new_tail);
        self.waiters = keep;
        satisfied
    }

    /// Removes and returns every registered waiter, regardless of offset —
    /// used on close/delete, which must wake everyone.
    pub fn drain_all(&mut self) -> Vec<Waiter> {
        std::mem::take(&mut self.waiters)
    }

    /// Removes a single waiter by id, if still registered (used when its
    /// deadline fires before it was otherwise satisfied).
    pub fn remove(&mut self, id: u64) -> Option<Waiter> {
        let idx = self.waiters.iter().position(|w| w.id == id)?;
        Some(self.waiters.remove(idx))
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_reply() -> (
        oneshot::Sender<Result<ReadOutcome, ApiError>>,
        oneshot::Receiver<Result<ReadOutcome, ApiError>>,
    ) {
        oneshot::channel()
    }

    #[test]
    fn drain_satisfied_wakes_in_fifo_order_and_keeps_the_rest() {
        let mut reg = WaiterRegistry::default();
        let (tx1, _rx1) = dummy_reply();
        let (tx2, _rx2) = dummy_reply();
        let (tx3, _rx3) = dummy_reply();
        let id1 = reg.register(5, 0, 1024, tx1);
        let id2 = reg.register(10, 0, 1024, tx2);
        let _id3 = reg.register(20, 0, 1024, tx3);

        let satisfied = reg.drain_satisfied(10);
        let ids: Vec<u64> = satisfied.iter().map(|w| w.id).collect();
        assert_eq!(ids, vec![id1, id2]);
        assert!(!reg.is_empty());
    }

    #[test]
    fn remove_by_id_drops_only_that_waiter() {
        let mut reg = WaiterRegistry::default();
        let (tx1, _rx1) = dummy_reply();
        let (tx2, _rx2) = dummy_reply();
        let id1 = reg.register(5, 0, 1024, tx1);
        let id2 = reg.register(10, 0, 1024, tx2);

        let removed = reg.remove(id1).unwrap();
        assert_eq!(removed.id, id1);
        assert!(reg.remove(id1).is_none());
        assert!(reg.remove(id2).is_some());
        assert!(reg.is_empty());
    }
}
