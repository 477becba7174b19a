//! Fund rebalancing between the maker and taker venues.
//!
//! Computes target balances proportional to each provider's collateral
//! ratio and walks a cancel-then-withdraw protocol until both providers
//! converge. At most one target is ever active; it is replaced by a fresh
//! assessment, never patched.

mod target;

pub use target::{
    ProviderTarget, RebalanceState, RebalanceStep, RebalanceTarget, StepStatus, WithdrawPlan,
};

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::config::RebalanceConfig;
use crate::provider::types::CashMetrics;
use crate::provider::{Provider, ProviderRole};
use crate::utils::decimal::safe_div;

pub struct RebalanceManager {
    config: RebalanceConfig,
    active: Option<RebalanceTarget>,
    /// Cash totals (total + pending per provider) at the last assessment.
    last_totals: Option<(Decimal, Decimal)>,
}

impl RebalanceManager {
    pub fn new(config: RebalanceConfig) -> Self {
        Self {
            config,
            active: None,
            last_totals: None,
        }
    }

    pub fn active_state(&self) -> Option<RebalanceState> {
        self.active.as_ref().map(|t| t.state)
    }

    pub fn active_target(&self) -> Option<&RebalanceTarget> {
        self.active.as_ref()
    }

    /// Assessment requires both providers' withdrawal history.
    pub async fn can_assess(&self, maker: &dyn Provider, taker: &dyn Provider) -> bool {
        maker.withdrawals_loaded().await && taker.withdrawals_loaded().await
    }

    /// Withdrawals require mutually cross-validated addresses: each
    /// provider's default withdraw address must route to the counterparty's
    /// deposit address.
    pub async fn can_withdraw(&self, maker: &dyn Provider, taker: &dyn Provider) -> bool {
        let maker_addresses = maker.chain_addresses().await;
        let taker_addresses = taker.chain_addresses().await;
        maker_addresses.routes_to(&taker_addresses) && taker_addresses.routes_to(&maker_addresses)
    }

    /// Split the combined pool proportionally to collateral ratios and
    /// build a fresh target, unless an active target is mid-transit or the
    /// cash totals are unchanged since the last assessment.
    pub fn assess_rebalance_target(&mut self, maker_cash: &CashMetrics, taker_cash: &CashMetrics) {
        if self.active.as_ref().is_some_and(|t| t.mid_transit()) {
            return;
        }

        let totals = (
            maker_cash.total + maker_cash.pending,
            taker_cash.total + taker_cash.pending,
        );
        if self.last_totals == Some(totals) {
            return;
        }

        let pool = totals.0 + totals.1;
        let ratio_sum = maker_cash.ratio + taker_cash.ratio;
        let maker_target = pool * safe_div(maker_cash.ratio, ratio_sum);
        let taker_target = pool - maker_target;

        debug!(
            %pool,
            %maker_target,
            %taker_target,
            "Assessed rebalance equilibrium"
        );

        self.last_totals = Some(totals);
        self.active = Some(RebalanceTarget::new(
            ProviderTarget::new(ProviderRole::Maker, maker_cash, maker_target),
            ProviderTarget::new(ProviderRole::Taker, taker_cash, taker_target),
        ));
    }

    /// Re-entrant driver, called on every balance-relevant event.
    pub async fn process_rebalance(
        &mut self,
        maker: &dyn Provider,
        taker: &dyn Provider,
    ) -> anyhow::Result<()> {
        if !self.config.enable {
            return Ok(());
        }

        let (Some(maker_cash), Some(taker_cash)) =
            (maker.cash_metrics().await, taker.cash_metrics().await)
        else {
            return Ok(());
        };

        if self.can_assess(maker, taker).await {
            self.assess_rebalance_target(&maker_cash, &taker_cash);
        }

        let Some(target) = self.active.as_mut() else {
            return Ok(());
        };

        let steps = target.progress(&maker_cash, &taker_cash, &self.config);

        if target.completed() {
            info!("Rebalance completed, discarding target");
            self.active = None;
            return Ok(());
        }

        if steps.is_empty() {
            return Ok(());
        }

        if !self.can_withdraw(maker, taker).await {
            warn!("Withdrawal addresses not cross-validated, abandoning rebalance target");
            if let Some(target) = self.active.as_mut() {
                target.force_no_rebalance();
            }
            return Ok(());
        }

        for step in steps {
            match step {
                RebalanceStep::Cancel(role) => {
                    let provider = pick(maker, taker, role);
                    info!(%role, "Cancelling pending withdrawals");
                    provider.cancel_withdrawals().await?;
                }
                RebalanceStep::Withdraw(role, amount) => {
                    let provider = pick(maker, taker, role);
                    info!(%role, %amount, "Issuing rebalance withdrawal");
                    provider.withdraw(amount).await?;
                }
            }
        }

        Ok(())
    }
}

fn pick<'a>(
    maker: &'a dyn Provider,
    taker: &'a dyn Provider,
    role: ProviderRole,
) -> &'a dyn Provider {
    match role {
        ProviderRole::Maker => maker,
        ProviderRole::Taker => taker,
    }
}
