//! Common provider state block.
//!
//! Both venue adapters embed a [`ProviderCore`] by composition: readiness
//! latches, the set-once leverage, the optional collateral override, the
//! last open price and chain addresses. The core is not itself a
//! `Provider`; venue adapters wrap it with their session handling, wire
//! protocol and cash-operation queue.

use rust_decimal::Decimal;

use super::types::ChainAddresses;
use crate::error::DealerError;
use crate::provider::ProviderRole;
use crate::utils::decimal::safe_div;

#[derive(Debug)]
pub struct ProviderCore {
    role: ProviderRole,
    connected: bool,
    balance_initialized: bool,
    position_initialized: bool,
    leverage: Option<Decimal>,
    collateral_pct: Option<Decimal>,
    open_price: Option<Decimal>,
    chain_addresses: ChainAddresses,
}

impl ProviderCore {
    pub fn new(role: ProviderRole) -> Self {
        Self {
            role,
            connected: false,
            balance_initialized: false,
            position_initialized: false,
            leverage: None,
            collateral_pct: None,
            open_price: None,
            chain_addresses: ChainAddresses::default(),
        }
    }

    pub fn role(&self) -> ProviderRole {
        self.role
    }

    /// All three readiness latches set. Venue-specific health is layered on
    /// top by the adapter.
    pub fn is_initialized(&self) -> bool {
        self.connected && self.balance_initialized && self.position_initialized
    }

    pub fn set_connected(&mut self) {
        self.connected = true;
    }

    /// Latch the balance-initialized flag. Re-invoking without an
    /// intervening [`reset`](Self::reset) is an error.
    pub fn set_init_balance(&mut self) -> Result<(), DealerError> {
        if self.balance_initialized {
            return Err(DealerError::AlreadyInitialized { flag: "balance" });
        }
        self.balance_initialized = true;
        Ok(())
    }

    /// Latch the position-initialized flag.
    pub fn set_init_position(&mut self) -> Result<(), DealerError> {
        if self.position_initialized {
            return Err(DealerError::AlreadyInitialized { flag: "position" });
        }
        self.position_initialized = true;
        Ok(())
    }

    /// Clear all readiness latches (session loss / reconnect).
    pub fn reset(&mut self) {
        self.connected = false;
        self.balance_initialized = false;
        self.position_initialized = false;
    }

    /// Set leverage once at construction time.
    pub fn set_leverage(&mut self, leverage: Decimal) -> Result<(), DealerError> {
        if let Some(current) = self.leverage {
            return Err(DealerError::LeverageAlreadySet {
                current,
                requested: leverage,
            });
        }
        self.leverage = Some(leverage);
        Ok(())
    }

    pub fn leverage(&self) -> Option<Decimal> {
        self.leverage
    }

    pub fn set_collateral_pct(&mut self, pct: Decimal) {
        self.collateral_pct = Some(pct);
    }

    /// Collateral fraction: the explicit override when present, otherwise
    /// derived from leverage (1 / leverage).
    pub fn collateral_ratio(&self) -> Decimal {
        if let Some(pct) = self.collateral_pct {
            return pct;
        }
        self.leverage
            .map(|l| safe_div(Decimal::ONE, l))
            .unwrap_or(Decimal::ZERO)
    }

    pub fn set_open_price(&mut self, price: Decimal) {
        self.open_price = Some(price);
    }

    pub fn open_price(&self) -> Option<Decimal> {
        self.open_price
    }

    pub fn set_chain_addresses(&mut self, addresses: ChainAddresses) {
        self.chain_addresses = addresses;
    }

    pub fn chain_addresses(&self) -> &ChainAddresses {
        &self.chain_addresses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_init_flags_latch_once() {
        let mut core = ProviderCore::new(ProviderRole::Maker);
        assert!(!core.is_initialized());

        core.set_connected();
        assert!(core.set_init_balance().is_ok());
        assert!(core.set_init_position().is_ok());
        assert!(core.is_initialized());

        assert!(core.set_init_balance().is_err());
        assert!(core.set_init_position().is_err());
    }

    #[test]
    fn test_reset_allows_reinitialization() {
        let mut core = ProviderCore::new(ProviderRole::Taker);
        core.set_connected();
        core.set_init_balance().unwrap();
        core.set_init_position().unwrap();

        core.reset();
        assert!(!core.is_initialized());
        assert!(core.set_init_balance().is_ok());
    }

    #[test]
    fn test_leverage_is_immutable() {
        let mut core = ProviderCore::new(ProviderRole::Taker);
        core.set_leverage(dec!(10)).unwrap();
        assert!(matches!(
            core.set_leverage(dec!(20)),
            Err(DealerError::LeverageAlreadySet { .. })
        ));
    }

    #[test]
    fn test_collateral_ratio_prefers_override() {
        let mut core = ProviderCore::new(ProviderRole::Maker);
        assert_eq!(core.collateral_ratio(), Decimal::ZERO);

        core.set_leverage(dec!(10)).unwrap();
        assert_eq!(core.collateral_ratio(), dec!(0.1));

        core.set_collateral_pct(dec!(0.25));
        assert_eq!(core.collateral_ratio(), dec!(0.25));
    }
}
