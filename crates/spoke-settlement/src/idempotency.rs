//! Withdrawal request idempotency guard.
//!
//! A request id may be recorded only once. Resubmitting an id that already
//! reached `RECORDED`, or one that is still being settled, fails with
//! [`SpokeError::DuplicateRequest`]. An id whose settlement failed is
//! released so the caller can retry it.
//!
//! Recorded ids live in a bounded FIFO cache so memory stays predictable in
//! a long-running hub.

use std::collections::{HashSet, VecDeque};

use spoke_types::{Result, SpokeError, WithdrawalRequestId};

/// Refuses a second settlement of the same withdrawal request id.
///
/// Holds the ids in flight plus a bounded set of recorded ids. Once more
/// than `max_size` ids are recorded, the oldest is forgotten.
pub struct IdempotencyGuard {
    /// Ids currently between `REQUESTED` and a terminal status.
    in_flight: HashSet<WithdrawalRequestId>,
    /// Ids whose settlement committed.
    recorded: HashSet<WithdrawalRequestId>,
    /// Insertion order of `recorded` (front = oldest).
    order: VecDeque<WithdrawalRequestId>,
    /// Recorded ids kept before eviction starts.
    max_size: usize,
}

impl IdempotencyGuard {
    /// Create a guard remembering up to `max_size` recorded ids.
    ///
    /// # Panics
    /// Panics if `max_size` is zero.
    pub fn new(max_size: usize) -> Self {
        assert!(max_size > 0, "IdempotencyGuard max_size must be > 0");
        Self {
            in_flight: HashSet::new(),
            recorded: HashSet::with_capacity(max_size),
            order: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    /// Claim `id` for a new settlement attempt.
    ///
    /// # Errors
    /// [`SpokeError::DuplicateRequest`] if `id` is recorded or in flight.
    pub fn claim(&mut self, id: WithdrawalRequestId) -> Result<()> {
        if self.recorded.contains(&id) || !self.in_flight.insert(id) {
            return Err(SpokeError::DuplicateRequest(id));
        }
        Ok(())
    }

    /// The settlement for `id` committed.
    pub fn mark_recorded(&mut self, id: WithdrawalRequestId) {
        self.in_flight.remove(&id);
        if !self.recorded.insert(id) {
            return;
        }
        self.order.push_back(id);
        if self.recorded.len() > self.max_size {
            if let Some(oldest) = self.order.pop_front() {
                self.recorded.remove(&oldest);
            }
        }
    }

    /// The settlement for `id` failed; allow a retry.
    pub fn release(&mut self, id: WithdrawalRequestId) {
        self.in_flight.remove(&id);
    }

    /// Whether `id` is remembered as recorded.
    #[must_use]
    pub fn is_recorded(&self, id: &WithdrawalRequestId) -> bool {
        self.recorded.contains(id)
    }

    /// Number of recorded ids currently remembered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.recorded.len()
    }

    /// Whether no recorded ids are remembered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recorded.is_empty()
    }
}
