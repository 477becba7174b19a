//! Retryable cash-operation state machine.
//!
//! Every money-moving action (withdrawal, cancel-withdrawals, internal
//! transfer) runs through the same minimal task abstraction: a concrete
//! [`CashOpTask`] supplies `setup` / `execute` / `assess_progress`, and
//! [`CashOperation::process`] drives them to a fixed point each tick.

mod manager;

pub use manager::CashOpsManager;

use async_trait::async_trait;
use std::fmt;

use crate::error::DealerError;

/// Concrete operation kinds, used for read-only introspection by the
/// rebalance and reporting layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CashOpKind {
    Withdraw,
    CancelWithdrawals,
    InternalTransfer,
}

impl fmt::Display for CashOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CashOpKind::Withdraw => write!(f, "withdraw"),
            CashOpKind::CancelWithdrawals => write!(f, "cancel-withdrawals"),
            CashOpKind::InternalTransfer => write!(f, "internal-transfer"),
        }
    }
}

/// Operation lifecycle states. `Setup` and `PerformingTask` are transient
/// markers held while the corresponding external call is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CashOpState {
    Init,
    Setup,
    Ready,
    PerformingTask,
    MonitoringTask,
    Done,
}

/// Result of a setup attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupOutcome {
    /// Preconditions satisfied, proceed to the external call this tick.
    Ready,
    /// Not yet ready, retry on a later tick.
    Retry,
    /// Nothing to do at all; the operation completes without acting.
    NothingToDo,
}

/// Behavior of one concrete cash operation.
///
/// All three methods may be called repeatedly while the operation sits in
/// the same state, so implementations must be idempotent.
#[async_trait]
pub trait CashOpTask: Send + Sync {
    fn kind(&self) -> CashOpKind;

    /// Prepare the operation (load prerequisites, compute amounts).
    async fn setup(&mut self) -> SetupOutcome;

    /// Perform the side-effecting external call. `false` means a transient
    /// failure; the operation stays ready and retries on a later tick.
    async fn execute(&mut self) -> bool;

    /// Poll whether the external system confirmed the operation.
    async fn assess_progress(&mut self) -> bool;
}

/// One queued unit of money-moving work.
pub struct CashOperation {
    id: Option<u64>,
    state: CashOpState,
    task: Box<dyn CashOpTask>,
}

impl fmt::Debug for CashOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CashOperation")
            .field("id", &self.id)
            .field("kind", &self.task.kind())
            .field("state", &self.state)
            .finish()
    }
}

impl CashOperation {
    pub fn new(task: Box<dyn CashOpTask>) -> Self {
        Self {
            id: None,
            state: CashOpState::Init,
            task,
        }
    }

    pub fn id(&self) -> Option<u64> {
        self.id
    }

    pub fn kind(&self) -> CashOpKind {
        self.task.kind()
    }

    pub fn state(&self) -> CashOpState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == CashOpState::Done
    }

    /// Assign the manager-issued id. Assigning twice is a construction error.
    pub(crate) fn assign_id(&mut self, id: u64) -> Result<(), DealerError> {
        if let Some(current) = self.id {
            return Err(DealerError::IdAlreadyAssigned {
                current,
                requested: id,
            });
        }
        self.id = Some(id);
        Ok(())
    }

    /// Advance the state machine to this tick's fixed point.
    ///
    /// A successful setup re-enters the loop immediately so the external
    /// call happens in the same tick; after the external call the loop
    /// always yields back to the caller, so a failed call is retried on a
    /// subsequent tick instead of being spun on.
    pub async fn process(&mut self) -> CashOpState {
        loop {
            match self.state {
                CashOpState::Init => {
                    self.state = CashOpState::Setup;
                    match self.task.setup().await {
                        SetupOutcome::Ready => {
                            self.state = CashOpState::Ready;
                            continue;
                        }
                        SetupOutcome::Retry => {
                            self.state = CashOpState::Init;
                            break;
                        }
                        SetupOutcome::NothingToDo => {
                            self.state = CashOpState::Done;
                            break;
                        }
                    }
                }
                CashOpState::Ready => {
                    self.state = CashOpState::PerformingTask;
                    if self.task.execute().await {
                        self.state = CashOpState::MonitoringTask;
                    } else {
                        self.state = CashOpState::Ready;
                    }
                    break;
                }
                CashOpState::MonitoringTask => {
                    if self.task.assess_progress().await {
                        self.state = CashOpState::Done;
                    }
                    break;
                }
                CashOpState::Done => break,
                // Transient states are never observable between ticks.
                CashOpState::Setup | CashOpState::PerformingTask => {
                    self.state = CashOpState::Init;
                }
            }
        }
        self.state
    }
}
