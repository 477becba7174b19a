//! Configuration management for the dealer.
//!
//! Loads settings from a config file and environment variables. The hedger
//! and rebalance blocks are required: a missing key fails deserialization
//! and aborts startup before any venue connection is made.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Main dealer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealerConfig {
    /// Offer computation parameters (required).
    pub hedger: HedgerConfig,
    /// Fund rebalancing parameters (required).
    pub rebalance: RebalanceConfig,
    /// Paper-mode venue parameters.
    #[serde(default)]
    pub paper: PaperConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HedgerConfig {
    /// Markup applied to quoted prices: ask x (1 + ratio), bid x (1 - ratio).
    pub price_ratio: Decimal,
    /// Hard cap on per-side offer volume.
    pub max_offer_volume: Decimal,
    /// Window within which a value-equal offer list is not re-pushed.
    pub offer_refresh_delay_ms: u64,
    /// Cooldown between exposure updates pushed to the taker.
    #[serde(default = "default_exposure_cooldown_ms")]
    pub exposure_cooldown_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceConfig {
    /// Master switch for the rebalance protocol.
    pub enable: bool,
    /// Minimum withdrawal relative to total pooled cash (0.0-1.0).
    pub threshold_pct: Decimal,
    /// Minimum absolute withdrawal amount.
    pub min_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperConfig {
    #[serde(default = "default_paper_balance")]
    pub maker_balance: Decimal,
    #[serde(default = "default_paper_balance")]
    pub taker_balance: Decimal,
    #[serde(default = "default_paper_leverage")]
    pub maker_leverage: Decimal,
    #[serde(default = "default_paper_leverage")]
    pub taker_leverage: Decimal,
}

fn default_exposure_cooldown_ms() -> u64 {
    500
}

fn default_paper_balance() -> Decimal {
    Decimal::new(10_000, 0)
}

fn default_paper_leverage() -> Decimal {
    Decimal::new(10, 0)
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            maker_balance: default_paper_balance(),
            taker_balance: default_paper_balance(),
            maker_leverage: default_paper_leverage(),
            taker_leverage: default_paper_leverage(),
        }
    }
}

impl DealerConfig {
    /// Load configuration from `config.*` and `DEALER__`-prefixed
    /// environment variables.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("DEALER"))
            .build()
            .context("Failed to build configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration (hedger and rebalance blocks are required)")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.hedger.price_ratio >= Decimal::ZERO && self.hedger.price_ratio < Decimal::ONE,
            "hedger.price_ratio must be in [0, 1)"
        );

        anyhow::ensure!(
            self.hedger.max_offer_volume > Decimal::ZERO,
            "hedger.max_offer_volume must be positive"
        );

        anyhow::ensure!(
            self.rebalance.threshold_pct >= Decimal::ZERO
                && self.rebalance.threshold_pct <= Decimal::ONE,
            "rebalance.threshold_pct must be between 0 and 1"
        );

        anyhow::ensure!(
            self.rebalance.min_amount >= Decimal::ZERO,
            "rebalance.min_amount must be non-negative"
        );

        Ok(())
    }
}
