//! Status reporting hooks.
//!
//! Reporters receive a dealer status snapshot on every routed event kind
//! they care about. The bundled [`LogReporter`] writes structured log lines
//! and suppresses duplicates by comparing consecutive reports.

use async_trait::async_trait;
use tracing::info;

use super::DealerStatus;
use crate::provider::types::{BalanceReport, PositionReport};
use crate::provider::ProviderRole;

/// Receives dealer state changes as they are routed through the event loop.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn on_ready_event(&mut self, status: &DealerStatus);
    async fn on_balance_event(&mut self, role: ProviderRole, status: &DealerStatus);
    async fn on_position_event(&mut self, role: ProviderRole, status: &DealerStatus);
    async fn on_price_event(&mut self, role: ProviderRole, status: &DealerStatus);
    async fn on_rebalance_event(&mut self, role: ProviderRole, status: &DealerStatus);
}

#[derive(Default)]
struct VenueReports {
    balance: Option<BalanceReport>,
    position: Option<PositionReport>,
}

/// Reporter that logs status changes, skipping repeats.
#[derive(Default)]
pub struct LogReporter {
    last_ready: Option<bool>,
    maker: VenueReports,
    taker: VenueReports,
}

impl LogReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn venue(&mut self, role: ProviderRole) -> &mut VenueReports {
        match role {
            ProviderRole::Maker => &mut self.maker,
            ProviderRole::Taker => &mut self.taker,
        }
    }

    fn venue_report<'a>(status: &'a DealerStatus, role: ProviderRole) -> &'a super::VenueStatus {
        match role {
            ProviderRole::Maker => &status.maker,
            ProviderRole::Taker => &status.taker,
        }
    }
}

#[async_trait]
impl StatusReporter for LogReporter {
    async fn on_ready_event(&mut self, status: &DealerStatus) {
        if self.last_ready != Some(status.ready) {
            info!(
                ready = status.ready,
                maker = status.maker.ready,
                taker = status.taker.ready,
                "Dealer readiness changed"
            );
            self.last_ready = Some(status.ready);
        }
    }

    async fn on_balance_event(&mut self, role: ProviderRole, status: &DealerStatus) {
        let report = &Self::venue_report(status, role).balance;
        let last = &mut self.venue(role).balance;
        if last.as_ref().is_some_and(|b| b.same_as(report)) {
            return;
        }
        info!(
            %role,
            total = %report.cash.total,
            pending = %report.cash.pending,
            "Balance changed"
        );
        *last = Some(report.clone());
    }

    async fn on_position_event(&mut self, role: ProviderRole, status: &DealerStatus) {
        let report = &Self::venue_report(status, role).position;
        let last = &mut self.venue(role).position;
        if last.as_ref().is_some_and(|p| p.same_as(report)) {
            return;
        }
        match report.exposure {
            Some(exposure) => info!(%role, %exposure, "Position changed"),
            None => info!(%role, "Position unavailable"),
        }
        *last = Some(report.clone());
    }

    async fn on_price_event(&mut self, role: ProviderRole, status: &DealerStatus) {
        if let Some(price) = Self::venue_report(status, role).position.open_price {
            info!(%role, %price, "Reference price updated");
        }
    }

    async fn on_rebalance_event(&mut self, role: ProviderRole, _status: &DealerStatus) {
        info!(%role, "Rebalance activity");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dealer::VenueStatus;
    use crate::provider::types::CashMetrics;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn venue(role: ProviderRole, total: Decimal, exposure: Decimal) -> VenueStatus {
        VenueStatus {
            role,
            ready: true,
            balance: BalanceReport::new(CashMetrics {
                total,
                pending: Decimal::ZERO,
                ratio: dec!(0.1),
            }),
            position: PositionReport::new(Some(exposure), Some(dec!(10000))),
        }
    }

    fn status(maker_total: Decimal, maker_exposure: Decimal) -> DealerStatus {
        DealerStatus {
            ready: true,
            maker: venue(ProviderRole::Maker, maker_total, maker_exposure),
            taker: venue(ProviderRole::Taker, dec!(1500), dec!(-2)),
        }
    }

    #[tokio::test]
    async fn test_repeated_balance_reports_are_suppressed() {
        let mut reporter = LogReporter::new();
        let first = status(dec!(1000), dec!(2));
        let repeat = status(dec!(1000), dec!(2));
        let changed = status(dec!(1200), dec!(2));

        reporter.on_balance_event(ProviderRole::Maker, &first).await;
        let captured = reporter.maker.balance.clone().unwrap();
        assert_eq!(captured.cash.total, dec!(1000));

        // Value-equal repeat keeps the stored snapshot, timestamp included.
        reporter.on_balance_event(ProviderRole::Maker, &repeat).await;
        let held = reporter.maker.balance.as_ref().unwrap();
        assert_eq!(held.captured_at, captured.captured_at);

        reporter
            .on_balance_event(ProviderRole::Maker, &changed)
            .await;
        assert_eq!(reporter.maker.balance.as_ref().unwrap().cash.total, dec!(1200));
        // The taker slot was never touched.
        assert!(reporter.taker.balance.is_none());
    }

    #[tokio::test]
    async fn test_repeated_position_reports_are_suppressed() {
        let mut reporter = LogReporter::new();
        let first = status(dec!(1000), dec!(2));
        let repeat = status(dec!(1000), dec!(2));
        let changed = status(dec!(1000), dec!(3));

        reporter
            .on_position_event(ProviderRole::Maker, &first)
            .await;
        let captured = reporter.maker.position.clone().unwrap();

        reporter
            .on_position_event(ProviderRole::Maker, &repeat)
            .await;
        assert_eq!(
            reporter.maker.position.as_ref().unwrap().captured_at,
            captured.captured_at
        );

        reporter
            .on_position_event(ProviderRole::Maker, &changed)
            .await;
        assert_eq!(
            reporter.maker.position.as_ref().unwrap().exposure,
            Some(dec!(3))
        );
    }

    #[tokio::test]
    async fn test_ready_transition_logged_once_per_change() {
        let mut reporter = LogReporter::new();
        let up = status(dec!(1000), dec!(2));

        reporter.on_ready_event(&up).await;
        assert_eq!(reporter.last_ready, Some(true));

        let mut down = status(dec!(1000), dec!(2));
        down.ready = false;
        reporter.on_ready_event(&down).await;
        assert_eq!(reporter.last_ready, Some(false));
    }
}
