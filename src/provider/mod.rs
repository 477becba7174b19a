//! Provider contract and supporting types.
//!
//! The `Provider` trait is the seam between the dealer core and the two
//! venue adapters. Real adapters (websocket sessions, wire protocols) live
//! outside this crate; the in-crate `SimProvider` implements the same
//! contract for paper trading and tests.

mod core;
pub mod sim;
mod traits;
pub mod types;

pub use self::core::ProviderCore;
pub use sim::SimProvider;
pub use traits::{EventKind, Provider, ProviderEvent, ProviderRole};
pub use types::{
    AggregatedQuote, BalanceReport, BookEntry, CashMetrics, ChainAddresses, OpenVolume,
    PositionReport, PriceOffer,
};
