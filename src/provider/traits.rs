//! Venue-agnostic provider contract.
//!
//! The dealer core never inspects venue-internal fields; every decision in
//! the hedger and rebalance layers routes through this trait. Maker and
//! taker venue adapters are two independent implementations of the same
//! interface.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

use super::types::{
    AggregatedQuote, BalanceReport, CashMetrics, ChainAddresses, OpenVolume, PositionReport,
    PriceOffer,
};
use crate::cashops::CashOpKind;

/// Which side of the dealer a provider serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProviderRole {
    /// Receives quoted offers.
    Maker,
    /// Hedged against on a liquid market.
    Taker,
}

impl fmt::Display for ProviderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderRole::Maker => write!(f, "maker"),
            ProviderRole::Taker => write!(f, "taker"),
        }
    }
}

/// Typed event tags emitted by providers into the dealer loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Ready,
    Balance,
    Position,
    OrderBook,
    Collateral,
    PriceEvent,
    Rebalance,
    Transaction,
}

/// One inbound event: the tag plus the emitting provider's role.
#[derive(Debug, Clone, Copy)]
pub struct ProviderEvent {
    pub role: ProviderRole,
    pub kind: EventKind,
}

/// Capability set both venues must implement.
#[async_trait]
pub trait Provider: Send + Sync {
    fn role(&self) -> ProviderRole;

    /// Fully initialized: connected, balances and positions loaded, and the
    /// venue-specific session/health predicate holds.
    async fn is_ready(&self) -> bool;

    /// Actively unhealthy, as opposed to merely not yet ready.
    async fn is_broken(&self) -> bool;

    /// Signed net position. `None` while the provider is not ready.
    async fn exposure(&self) -> Option<Decimal>;

    /// Quotable ask/bid volume given the venue's balance and margin rules.
    /// `None` while unavailable.
    async fn open_volume(&self) -> Option<OpenVolume>;

    /// Cash totals, in-flight withdrawal amount and collateral ratio.
    async fn cash_metrics(&self) -> Option<CashMetrics>;

    /// Last known reference/open price.
    async fn open_price(&self) -> Option<Decimal>;

    /// Comparison-aware snapshots for reporters.
    async fn balance_report(&self) -> BalanceReport;
    async fn position_report(&self) -> PositionReport;

    /// Aggregated book queries (meaningful on the taker side).
    async fn aggregated_ask(&self, target_volume: Decimal) -> Option<AggregatedQuote>;
    async fn aggregated_bid(&self, target_volume: Decimal) -> Option<AggregatedQuote>;

    /// Push the current offer list to the venue. An empty list clears
    /// standing offers.
    async fn submit_offers(&self, offers: Vec<PriceOffer>) -> anyhow::Result<()>;

    /// Re-target collateral against the given reference price.
    async fn check_collateral(&self, open_price: Decimal) -> anyhow::Result<()>;

    /// Adjust net position by `delta` (venue-side hedge trade).
    async fn update_exposure(&self, delta: Decimal) -> anyhow::Result<()>;

    /// Enqueue a withdrawal cash operation. Returns the operation id.
    async fn withdraw(&self, amount: Decimal) -> anyhow::Result<u64>;

    /// Enqueue a cancel-all-pending-withdrawals cash operation.
    async fn cancel_withdrawals(&self) -> anyhow::Result<u64>;

    /// Load on-chain address metadata.
    async fn load_addresses(&self) -> anyhow::Result<()>;

    /// Load withdrawal history; gates rebalance assessment.
    async fn load_withdrawals(&self) -> anyhow::Result<()>;
    async fn withdrawals_loaded(&self) -> bool;

    async fn chain_addresses(&self) -> ChainAddresses;

    /// Drive this provider's cash-operation queue one tick.
    async fn process_cash_ops(&self) -> anyhow::Result<()>;

    /// Queue introspection for the rebalance layer.
    async fn has_cash_tasks(&self, kind: CashOpKind) -> bool;
}
