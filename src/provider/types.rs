//! Shared value types exchanged between the dealer core and venue adapters.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::DealerError;

/// One price level as delivered by a venue book feed.
///
/// The sign of `volume` selects the side (negative = ask, positive = bid);
/// an `order_count` of zero removes the level.
#[derive(Debug, Clone, Copy)]
pub struct BookEntry {
    pub price: Decimal,
    pub volume: Decimal,
    pub order_count: u32,
}

/// Result of an aggregation query against one book side.
///
/// `volume` is the actually accumulated volume, which may exceed the
/// requested target since the last touched level is never split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatedQuote {
    pub volume: Decimal,
    pub price: Decimal,
}

impl AggregatedQuote {
    pub fn zero() -> Self {
        Self {
            volume: Decimal::ZERO,
            price: Decimal::ZERO,
        }
    }
}

/// Quotable volume per side given a venue's balance and margin rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenVolume {
    pub ask: Decimal,
    pub bid: Decimal,
}

/// Cash snapshot used by the rebalance layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CashMetrics {
    /// Settled cash on the venue.
    pub total: Decimal,
    /// Cash locked in in-flight withdrawals.
    pub pending: Decimal,
    /// Collateral fraction this venue requires (leverage-derived or an
    /// explicit override).
    pub ratio: Decimal,
}

/// On-chain address metadata for a provider.
///
/// Withdrawals are only safe once the selected default withdraw address is a
/// whitelisted member of the counterparty's deposit addresses; the rebalance
/// layer cross-validates both directions before acting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainAddresses {
    pub deposit: Option<String>,
    pub withdraw_whitelist: Vec<String>,
    pub default_withdraw: Option<String>,
}

impl ChainAddresses {
    /// True when our default withdraw address is whitelisted locally and is
    /// one of the counterparty's deposit addresses.
    pub fn routes_to(&self, counterparty: &ChainAddresses) -> bool {
        let Some(default) = &self.default_withdraw else {
            return false;
        };
        self.withdraw_whitelist.iter().any(|a| a == default)
            && counterparty.deposit.as_deref() == Some(default.as_str())
    }
}

/// Immutable two-sided (or one-sided) quote pushed to the maker venue.
#[derive(Debug, Clone, Serialize)]
pub struct PriceOffer {
    pub volume: Decimal,
    pub ask: Option<Decimal>,
    pub bid: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl PriceOffer {
    /// Build an offer, rejecting zero volume and offers with no priced side.
    pub fn new(
        volume: Decimal,
        ask: Option<Decimal>,
        bid: Option<Decimal>,
    ) -> Result<Self, DealerError> {
        let priced = |side: Option<Decimal>| side.is_some_and(|p| p != Decimal::ZERO);
        if volume == Decimal::ZERO || (!priced(ask) && !priced(bid)) {
            return Err(DealerError::InvalidOffer { volume, ask, bid });
        }
        Ok(Self {
            volume,
            ask,
            bid,
            created_at: Utc::now(),
        })
    }

    /// Value equality: volume and both prices. The timestamp is deliberately
    /// excluded; freshness is judged separately against the refresh delay.
    pub fn same_as(&self, other: &PriceOffer) -> bool {
        self.volume == other.volume && self.ask == other.ask && self.bid == other.bid
    }
}

/// Balance snapshot handed to status reporters.
///
/// Comparison-aware: reporters use [`same_as`](Self::same_as) to suppress
/// duplicate notifications, ignoring the capture timestamp.
#[derive(Debug, Clone, Serialize)]
pub struct BalanceReport {
    pub cash: CashMetrics,
    pub captured_at: DateTime<Utc>,
}

impl BalanceReport {
    pub fn new(cash: CashMetrics) -> Self {
        Self {
            cash,
            captured_at: Utc::now(),
        }
    }

    pub fn same_as(&self, other: &BalanceReport) -> bool {
        self.cash == other.cash
    }
}

/// Position snapshot handed to status reporters.
#[derive(Debug, Clone, Serialize)]
pub struct PositionReport {
    pub exposure: Option<Decimal>,
    pub open_price: Option<Decimal>,
    pub captured_at: DateTime<Utc>,
}

impl PositionReport {
    pub fn new(exposure: Option<Decimal>, open_price: Option<Decimal>) -> Self {
        Self {
            exposure,
            open_price,
            captured_at: Utc::now(),
        }
    }

    pub fn same_as(&self, other: &PositionReport) -> bool {
        self.exposure == other.exposure && self.open_price == other.open_price
    }
}
