//! Per-provider FIFO of cash operations.

use std::collections::VecDeque;

use tracing::{debug, info};

use super::{CashOpKind, CashOperation};
use crate::error::DealerError;

/// Strict one-at-a-time executor for a provider's cash operations.
///
/// Later operations never start before earlier ones finish, even when they
/// would not conflict; this keeps the single-writer discipline over the
/// provider's cash state.
#[derive(Default)]
pub struct CashOpsManager {
    queue: VecDeque<CashOperation>,
    next_id: u64,
    /// Set once any operation completed since the last drain signal.
    ran_tasks: bool,
}

impl std::fmt::Debug for CashOpsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CashOpsManager")
            .field("queued", &self.queue.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

impl CashOpsManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an operation, assigning it the next monotonically increasing
    /// id. Returns the id.
    pub fn add_task(&mut self, mut op: CashOperation) -> Result<u64, DealerError> {
        let id = self.next_id;
        op.assign_id(id)?;
        self.next_id += 1;
        debug!(id, kind = %op.kind(), "Cash operation enqueued");
        self.queue.push_back(op);
        Ok(id)
    }

    /// Drive the head operation, dequeuing it once done and moving on to
    /// the next head; stop at the first operation that does not finish this
    /// tick.
    ///
    /// Returns `true` when the queue drained after having completed work: a
    /// hint to the owning provider that its balances changed and should be
    /// reloaded.
    pub async fn process(&mut self) -> bool {
        loop {
            let Some(head) = self.queue.front_mut() else {
                if self.ran_tasks {
                    self.ran_tasks = false;
                    return true;
                }
                return false;
            };

            head.process().await;
            if head.is_done() {
                let op = self.queue.pop_front();
                if let Some(op) = op {
                    info!(id = ?op.id(), kind = %op.kind(), "Cash operation completed");
                }
                self.ran_tasks = true;
                continue;
            }
            return false;
        }
    }

    /// Whether any queued operation is of the given kind.
    pub fn has_tasks(&self, kind: CashOpKind) -> bool {
        self.queue.iter().any(|op| op.kind() == kind)
    }

    /// The most recently enqueued operation, if any.
    pub fn peek_last(&self) -> Option<&CashOperation> {
        self.queue.back()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}
