//! # Maker-Taker Dealer
//!
//! A hedging dealer that quotes two-sided offers on a maker venue priced
//! from a taker venue's order book, and keeps the taker's net position the
//! exact mirror of the maker's.
//!
//! ## Architecture
//!
//! - `book`: Aggregation order book with volume-weighted price queries
//! - `cashops`: Retryable cash operations and their FIFO manager
//! - `config`: Configuration management and validation
//! - `dealer`: Event router and status reporting
//! - `hedger`: Offer computation and exposure synchronization
//! - `provider`: Venue contract, shared state and the simulated venue
//! - `rebalance`: Cross-venue fund rebalancing protocol
//! - `utils`: Shared decimal arithmetic helpers

pub mod book;
pub mod cashops;
pub mod config;
pub mod dealer;
pub mod error;
pub mod hedger;
pub mod provider;
pub mod rebalance;
pub mod utils;

pub use config::DealerConfig;
pub use error::DealerError;
