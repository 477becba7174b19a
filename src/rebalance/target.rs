//! Rebalance plan: per-provider targets and the multi-step protocol state.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::RebalanceConfig;
use crate::provider::types::CashMetrics;
use crate::provider::ProviderRole;
use crate::utils::decimal::safe_div;

/// Top-level protocol state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RebalanceState {
    Init,
    NoRebalance,
    CancellingWtdr,
    Withdrawing,
    Completed,
}

/// Sub-state of one provider's cancel or withdraw step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StepStatus {
    Todo,
    Ongoing,
    Done,
}

/// A withdrawal the plan wants executed on one provider.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct WithdrawPlan {
    pub status: StepStatus,
    pub amount: Decimal,
}

/// Command the state machine asks the manager to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebalanceStep {
    Cancel(ProviderRole),
    Withdraw(ProviderRole, Decimal),
}

/// One provider's snapshot and plan inside a rebalance target.
///
/// `total`, `pending` and `target` are fixed at construction; only the two
/// sub-states advance as the protocol runs.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderTarget {
    pub role: ProviderRole,
    pub total: Decimal,
    pub pending: Decimal,
    pub target: Decimal,
    pub to_withdraw: WithdrawPlan,
    pub cancel_pending: StepStatus,
}

impl ProviderTarget {
    /// Decide this provider's steps from its cash snapshot vs its target.
    ///
    /// Over target: withdraw the excess; any pending withdrawal is folded
    /// into the amount and cancelled first so a stale in-flight withdrawal
    /// never doubles up with the new one. Under target with something
    /// pending: cancel only, the counterparty's withdrawal funds us.
    pub fn new(role: ProviderRole, cash: &CashMetrics, target: Decimal) -> Self {
        let (to_withdraw, cancel_pending) = if cash.total + cash.pending > target {
            let mut amount = cash.total - target;
            let cancel = if cash.pending > Decimal::ZERO {
                amount += cash.pending;
                StepStatus::Todo
            } else {
                StepStatus::Done
            };
            (
                WithdrawPlan {
                    status: StepStatus::Todo,
                    amount,
                },
                cancel,
            )
        } else if cash.total < target && cash.pending != Decimal::ZERO {
            (
                WithdrawPlan {
                    status: StepStatus::Done,
                    amount: Decimal::ZERO,
                },
                StepStatus::Todo,
            )
        } else {
            (
                WithdrawPlan {
                    status: StepStatus::Done,
                    amount: Decimal::ZERO,
                },
                StepStatus::Done,
            )
        };

        Self {
            role,
            total: cash.total,
            pending: cash.pending,
            target,
            to_withdraw,
            cancel_pending,
        }
    }

    fn advance_cancel(&mut self, cash: &CashMetrics, steps: &mut Vec<RebalanceStep>) {
        match self.cancel_pending {
            StepStatus::Todo => {
                steps.push(RebalanceStep::Cancel(self.role));
                self.cancel_pending = StepStatus::Ongoing;
            }
            StepStatus::Ongoing => {
                if cash.pending == Decimal::ZERO {
                    self.cancel_pending = StepStatus::Done;
                }
            }
            StepStatus::Done => {}
        }
    }

    fn advance_withdraw(&mut self, cash: &CashMetrics, steps: &mut Vec<RebalanceStep>) {
        match self.to_withdraw.status {
            StepStatus::Todo => {
                if self.to_withdraw.amount > Decimal::ZERO {
                    steps.push(RebalanceStep::Withdraw(self.role, self.to_withdraw.amount));
                    self.to_withdraw.status = StepStatus::Ongoing;
                } else {
                    self.to_withdraw.status = StepStatus::Done;
                }
            }
            StepStatus::Ongoing => {
                if cash.total >= self.target {
                    self.to_withdraw.status = StepStatus::Done;
                }
            }
            StepStatus::Done => {}
        }
    }
}

/// Snapshot-and-plan for one equilibrium assessment.
///
/// Replaced wholesale on every fresh assessment; never mutated back into
/// `Init` once it has started moving.
#[derive(Debug, Clone, Serialize)]
pub struct RebalanceTarget {
    pub maker: ProviderTarget,
    pub taker: ProviderTarget,
    pub state: RebalanceState,
}

impl RebalanceTarget {
    pub fn new(maker: ProviderTarget, taker: ProviderTarget) -> Self {
        Self {
            maker,
            taker,
            state: RebalanceState::Init,
        }
    }

    /// Whether this plan is worth acting on.
    ///
    /// True when either provider still has a pending cancellation in
    /// flight, or when the larger planned withdrawal clears both the
    /// absolute minimum and the relative threshold against the pooled cash.
    pub fn needs_rebalance(&self, config: &RebalanceConfig) -> bool {
        if self.maker.cancel_pending != StepStatus::Done
            || self.taker.cancel_pending != StepStatus::Done
        {
            return true;
        }

        let largest = self.maker.to_withdraw.amount.max(self.taker.to_withdraw.amount);
        let pool = self.maker.total + self.maker.pending + self.taker.total + self.taker.pending;

        largest >= config.min_amount && safe_div(largest, pool) >= config.threshold_pct
    }

    /// Currently executing external steps; a mid-transit target blocks
    /// fresh assessments.
    pub fn mid_transit(&self) -> bool {
        matches!(
            self.state,
            RebalanceState::CancellingWtdr | RebalanceState::Withdrawing
        )
    }

    pub fn completed(&self) -> bool {
        self.state == RebalanceState::Completed
    }

    /// Abandon in place: acting is currently unsafe, so park the target and
    /// let the next assessment rebuild it if still needed.
    pub fn force_no_rebalance(&mut self) {
        self.state = RebalanceState::NoRebalance;
    }

    /// Advance the protocol given fresh cash snapshots, returning the
    /// external steps (cancel / withdraw per provider) this advancement
    /// requests.
    pub fn progress(
        &mut self,
        maker_cash: &CashMetrics,
        taker_cash: &CashMetrics,
        config: &RebalanceConfig,
    ) -> Vec<RebalanceStep> {
        let mut steps = Vec::new();

        if self.state == RebalanceState::Init {
            if !self.needs_rebalance(config) {
                self.state = RebalanceState::NoRebalance;
                return steps;
            }
            self.state = RebalanceState::CancellingWtdr;
        }

        if self.state == RebalanceState::CancellingWtdr {
            self.maker.advance_cancel(maker_cash, &mut steps);
            self.taker.advance_cancel(taker_cash, &mut steps);
            if self.maker.cancel_pending == StepStatus::Done
                && self.taker.cancel_pending == StepStatus::Done
            {
                self.state = RebalanceState::Withdrawing;
            }
        }

        if self.state == RebalanceState::Withdrawing {
            self.maker.advance_withdraw(maker_cash, &mut steps);
            self.taker.advance_withdraw(taker_cash, &mut steps);
            if self.maker.to_withdraw.status == StepStatus::Done
                && self.taker.to_withdraw.status == StepStatus::Done
            {
                self.state = RebalanceState::Completed;
            }
        }

        steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn cash(total: Decimal, pending: Decimal) -> CashMetrics {
        CashMetrics {
            total,
            pending,
            ratio: dec!(0.1),
        }
    }

    fn config() -> RebalanceConfig {
        RebalanceConfig {
            enable: true,
            threshold_pct: dec!(0.05),
            min_amount: dec!(100),
        }
    }

    #[test]
    fn test_over_target_plans_withdrawal() {
        let target = ProviderTarget::new(ProviderRole::Maker, &cash(dec!(1000), dec!(0)), dec!(800));
        assert_eq!(target.to_withdraw.status, StepStatus::Todo);
        assert_eq!(target.to_withdraw.amount, dec!(200));
        assert_eq!(target.cancel_pending, StepStatus::Done);
    }

    #[test]
    fn test_pending_is_folded_in_and_cancelled_first() {
        let target = ProviderTarget::new(ProviderRole::Maker, &cash(dec!(700), dec!(200)), dec!(800));
        assert_eq!(target.cancel_pending, StepStatus::Todo);
        assert_eq!(target.to_withdraw.amount, dec!(100));
    }

    #[test]
    fn test_under_target_with_pending_cancels_only() {
        let target = ProviderTarget::new(ProviderRole::Taker, &cash(dec!(500), dec!(100)), dec!(800));
        assert_eq!(target.cancel_pending, StepStatus::Todo);
        assert_eq!(target.to_withdraw.status, StepStatus::Done);
        assert_eq!(target.to_withdraw.amount, Decimal::ZERO);
    }

    #[test]
    fn test_balanced_provider_plans_nothing() {
        let target = ProviderTarget::new(ProviderRole::Taker, &cash(dec!(800), dec!(0)), dec!(800));
        assert_eq!(target.cancel_pending, StepStatus::Done);
        assert_eq!(target.to_withdraw.status, StepStatus::Done);
    }

    #[test]
    fn test_needs_rebalance_thresholds() {
        let cfg = config();

        // 200 of 2500 pooled = 8% >= 5%, and >= 100 absolute.
        let t = RebalanceTarget::new(
            ProviderTarget::new(ProviderRole::Maker, &cash(dec!(1700), dec!(0)), dec!(1500)),
            ProviderTarget::new(ProviderRole::Taker, &cash(dec!(800), dec!(0)), dec!(1000)),
        );
        assert!(t.needs_rebalance(&cfg));

        // Below the absolute minimum.
        let t = RebalanceTarget::new(
            ProviderTarget::new(ProviderRole::Maker, &cash(dec!(1050), dec!(0)), dec!(1000)),
            ProviderTarget::new(ProviderRole::Taker, &cash(dec!(950), dec!(0)), dec!(1000)),
        );
        assert!(!t.needs_rebalance(&cfg));

        // Above the absolute minimum but below the relative threshold.
        let t = RebalanceTarget::new(
            ProviderTarget::new(
                ProviderRole::Maker,
                &cash(dec!(50150), dec!(0)),
                dec!(50000),
            ),
            ProviderTarget::new(
                ProviderRole::Taker,
                &cash(dec!(49850), dec!(0)),
                dec!(50000),
            ),
        );
        assert!(!t.needs_rebalance(&cfg));

        // A pending cancellation forces action regardless of amounts.
        let t = RebalanceTarget::new(
            ProviderTarget::new(ProviderRole::Maker, &cash(dec!(990), dec!(20)), dec!(1000)),
            ProviderTarget::new(ProviderRole::Taker, &cash(dec!(1000), dec!(0)), dec!(1000)),
        );
        assert!(t.needs_rebalance(&cfg));
    }

    #[test]
    fn test_protocol_runs_cancel_then_withdraw_to_completion() {
        let cfg = config();
        let mut t = RebalanceTarget::new(
            ProviderTarget::new(ProviderRole::Maker, &cash(dec!(1000), dec!(200)), dec!(800)),
            ProviderTarget::new(ProviderRole::Taker, &cash(dec!(600), dec!(0)), dec!(800)),
        );

        // Tick 1: maker's stale withdrawal gets cancelled.
        let steps = t.progress(&cash(dec!(1000), dec!(200)), &cash(dec!(600), dec!(0)), &cfg);
        assert_eq!(t.state, RebalanceState::CancellingWtdr);
        assert_eq!(steps, vec![RebalanceStep::Cancel(ProviderRole::Maker)]);

        // Tick 2: cancel confirmed (pending back in total), withdrawal issued.
        let steps = t.progress(&cash(dec!(1200), dec!(0)), &cash(dec!(600), dec!(0)), &cfg);
        assert_eq!(t.state, RebalanceState::Withdrawing);
        assert_eq!(
            steps,
            vec![RebalanceStep::Withdraw(ProviderRole::Maker, dec!(400))]
        );

        // Tick 3: withdrawal not yet settled, nothing new requested.
        let steps = t.progress(&cash(dec!(750), dec!(0)), &cash(dec!(600), dec!(0)), &cfg);
        assert!(steps.is_empty());
        assert_eq!(t.state, RebalanceState::Withdrawing);

        // Tick 4: both providers at target.
        let steps = t.progress(&cash(dec!(800), dec!(0)), &cash(dec!(800), dec!(0)), &cfg);
        assert!(steps.is_empty());
        assert_eq!(t.state, RebalanceState::Completed);
    }

    #[test]
    fn test_small_imbalance_goes_no_rebalance() {
        let cfg = config();
        let mut t = RebalanceTarget::new(
            ProviderTarget::new(ProviderRole::Maker, &cash(dec!(1020), dec!(0)), dec!(1000)),
            ProviderTarget::new(ProviderRole::Taker, &cash(dec!(980), dec!(0)), dec!(1000)),
        );
        let steps = t.progress(&cash(dec!(1020), dec!(0)), &cash(dec!(980), dec!(0)), &cfg);
        assert!(steps.is_empty());
        assert_eq!(t.state, RebalanceState::NoRebalance);
        assert!(!t.mid_transit());
    }
}
