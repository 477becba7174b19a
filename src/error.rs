//! Typed errors for construction-time invariant violations.
//!
//! These are configuration-class errors: they are raised synchronously when
//! the dealer is being assembled and are never retried. Transient external
//! failures never surface here; they stay inside the cash-operation retry
//! loop as `false` results.

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DealerError {
    /// Leverage is set once at provider construction and is immutable.
    #[error("leverage already set to {current}, refusing to overwrite with {requested}")]
    LeverageAlreadySet { current: Decimal, requested: Decimal },

    /// A cash operation's id is assigned exactly once, by its owning manager.
    #[error("cash operation already has id {current}, refusing to assign {requested}")]
    IdAlreadyAssigned { current: u64, requested: u64 },

    /// Readiness latches only ever transition false -> true.
    #[error("provider {flag} already initialized")]
    AlreadyInitialized { flag: &'static str },

    /// An offer must carry nonzero volume and at least one priced side.
    #[error("invalid offer: volume {volume}, ask {ask:?}, bid {bid:?}")]
    InvalidOffer {
        volume: Decimal,
        ask: Option<Decimal>,
        bid: Option<Decimal>,
    },
}
