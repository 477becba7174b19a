//! Simulated venue for paper trading and tests.
//!
//! Implements the full [`Provider`] contract against in-memory state:
//! deterministic balances, a scriptable order book and cash operations that
//! settle instantly (or on demand). Paper mode in `main` runs two of these
//! through the real dealer loop; the unit tests of the hedger, rebalance and
//! dealer modules drive them directly.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::debug;

use super::core::ProviderCore;
use super::traits::{EventKind, Provider, ProviderEvent, ProviderRole};
use super::types::{
    AggregatedQuote, BalanceReport, BookEntry, CashMetrics, ChainAddresses, OpenVolume,
    PositionReport, PriceOffer,
};
use crate::book::AggregationOrderBook;
use crate::cashops::{
    CashOpKind, CashOpTask, CashOperation, CashOpsManager, SetupOutcome,
};

/// Cash buckets shared between the provider and its queued cash operations.
///
/// A plain mutex: operations only take it for synchronous bookkeeping and
/// never hold it across an await.
#[derive(Debug)]
pub struct SimWallet {
    pub total: Decimal,
    pub pending: Decimal,
    /// Funds parked outside the trading balance, moved in by an internal
    /// transfer operation.
    pub reserve: Decimal,
    /// When false, in-flight withdrawals stay pending until a test confirms
    /// them.
    pub confirm_withdrawals: bool,
}

impl SimWallet {
    fn new(total: Decimal) -> Self {
        Self {
            total,
            pending: Decimal::ZERO,
            reserve: Decimal::ZERO,
            confirm_withdrawals: true,
        }
    }
}

/// Withdrawal: moves `amount` out of the settled balance, then waits for
/// off-chain confirmation to clear the pending bucket.
struct SimWithdrawTask {
    wallet: Arc<StdMutex<SimWallet>>,
    amount: Decimal,
    sent: bool,
}

#[async_trait]
impl CashOpTask for SimWithdrawTask {
    fn kind(&self) -> CashOpKind {
        CashOpKind::Withdraw
    }

    async fn setup(&mut self) -> SetupOutcome {
        if self.amount <= Decimal::ZERO {
            SetupOutcome::NothingToDo
        } else {
            SetupOutcome::Ready
        }
    }

    async fn execute(&mut self) -> bool {
        let mut wallet = self.wallet.lock().unwrap();
        if self.sent {
            return true;
        }
        if wallet.total < self.amount {
            return false;
        }
        wallet.total -= self.amount;
        wallet.pending += self.amount;
        self.sent = true;
        true
    }

    async fn assess_progress(&mut self) -> bool {
        let mut wallet = self.wallet.lock().unwrap();
        if wallet.confirm_withdrawals && wallet.pending >= self.amount {
            wallet.pending -= self.amount;
            return true;
        }
        wallet.pending == Decimal::ZERO
    }
}

/// Cancel-withdrawals: returns everything pending to the settled balance.
struct SimCancelTask {
    wallet: Arc<StdMutex<SimWallet>>,
}

#[async_trait]
impl CashOpTask for SimCancelTask {
    fn kind(&self) -> CashOpKind {
        CashOpKind::CancelWithdrawals
    }

    async fn setup(&mut self) -> SetupOutcome {
        if self.wallet.lock().unwrap().pending == Decimal::ZERO {
            SetupOutcome::NothingToDo
        } else {
            SetupOutcome::Ready
        }
    }

    async fn execute(&mut self) -> bool {
        let mut wallet = self.wallet.lock().unwrap();
        let pending = wallet.pending;
        wallet.pending = Decimal::ZERO;
        wallet.total += pending;
        true
    }

    async fn assess_progress(&mut self) -> bool {
        self.wallet.lock().unwrap().pending == Decimal::ZERO
    }
}

/// Internal transfer: sweeps the reserve bucket into the trading balance.
struct SimTransferTask {
    wallet: Arc<StdMutex<SimWallet>>,
}

#[async_trait]
impl CashOpTask for SimTransferTask {
    fn kind(&self) -> CashOpKind {
        CashOpKind::InternalTransfer
    }

    async fn setup(&mut self) -> SetupOutcome {
        if self.wallet.lock().unwrap().reserve == Decimal::ZERO {
            SetupOutcome::NothingToDo
        } else {
            SetupOutcome::Ready
        }
    }

    async fn execute(&mut self) -> bool {
        let mut wallet = self.wallet.lock().unwrap();
        let reserve = wallet.reserve;
        wallet.reserve = Decimal::ZERO;
        wallet.total += reserve;
        true
    }

    async fn assess_progress(&mut self) -> bool {
        self.wallet.lock().unwrap().reserve == Decimal::ZERO
    }
}

#[derive(Debug)]
struct SimState {
    core: ProviderCore,
    healthy: bool,
    broken: bool,
    exposure: Decimal,
    open_volume: Option<OpenVolume>,
    book: AggregationOrderBook,
    withdrawals_loaded: bool,
    /// Every offer list pushed, newest last.
    offer_pushes: Vec<Vec<PriceOffer>>,
    /// Every exposure delta requested, newest last.
    exposure_updates: Vec<Decimal>,
    /// Every collateral check, newest last.
    collateral_checks: Vec<Decimal>,
}

/// Scriptable in-memory venue.
pub struct SimProvider {
    role: ProviderRole,
    state: Arc<RwLock<SimState>>,
    wallet: Arc<StdMutex<SimWallet>>,
    cash_ops: Arc<Mutex<CashOpsManager>>,
    events: Option<mpsc::Sender<ProviderEvent>>,
}

impl SimProvider {
    pub fn new(role: ProviderRole, balance: Decimal, leverage: Decimal) -> Self {
        let mut core = ProviderCore::new(role);
        // A sim venue is born fully initialized.
        core.set_connected();
        core.set_init_balance().ok();
        core.set_init_position().ok();
        core.set_leverage(leverage).ok();

        Self {
            role,
            state: Arc::new(RwLock::new(SimState {
                core,
                healthy: true,
                broken: false,
                exposure: Decimal::ZERO,
                open_volume: None,
                book: AggregationOrderBook::new(),
                withdrawals_loaded: false,
                offer_pushes: Vec::new(),
                exposure_updates: Vec::new(),
                collateral_checks: Vec::new(),
            })),
            wallet: Arc::new(StdMutex::new(SimWallet::new(balance))),
            cash_ops: Arc::new(Mutex::new(CashOpsManager::new())),
            events: None,
        }
    }

    /// Attach an event sender; the provider emits a `Balance` event whenever
    /// its cash-op queue drains after completing work.
    pub fn with_events(mut self, tx: mpsc::Sender<ProviderEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    // ---- test/paper-mode scripting ----

    pub async fn set_exposure(&self, exposure: Decimal) {
        self.state.write().await.exposure = exposure;
    }

    pub async fn set_open_volume(&self, ask: Decimal, bid: Decimal) {
        self.state.write().await.open_volume = Some(OpenVolume { ask, bid });
    }

    pub async fn clear_open_volume(&self) {
        self.state.write().await.open_volume = None;
    }

    pub async fn set_open_price_value(&self, price: Decimal) {
        self.state.write().await.core.set_open_price(price);
    }

    pub async fn set_collateral_pct(&self, pct: Decimal) {
        self.state.write().await.core.set_collateral_pct(pct);
    }

    pub async fn set_healthy(&self, healthy: bool) {
        self.state.write().await.healthy = healthy;
    }

    pub async fn set_broken(&self, broken: bool) {
        let mut state = self.state.write().await;
        state.broken = broken;
        if broken {
            state.healthy = false;
        }
    }

    pub async fn set_addresses(&self, addresses: ChainAddresses) {
        self.state.write().await.core.set_chain_addresses(addresses);
    }

    pub async fn apply_book_snapshot(&self, entries: &[BookEntry]) {
        self.state.write().await.book.apply_snapshot(entries);
    }

    pub async fn apply_book_update(&self, entry: &BookEntry) {
        self.state.write().await.book.apply_update(entry);
    }

    pub fn set_wallet(&self, total: Decimal, pending: Decimal) {
        let mut wallet = self.wallet.lock().unwrap();
        wallet.total = total;
        wallet.pending = pending;
    }

    pub fn set_reserve(&self, reserve: Decimal) {
        self.wallet.lock().unwrap().reserve = reserve;
    }

    pub fn hold_withdrawal_confirmations(&self, hold: bool) {
        self.wallet.lock().unwrap().confirm_withdrawals = !hold;
    }

    pub fn wallet_snapshot(&self) -> (Decimal, Decimal) {
        let wallet = self.wallet.lock().unwrap();
        (wallet.total, wallet.pending)
    }

    pub async fn offer_pushes(&self) -> Vec<Vec<PriceOffer>> {
        self.state.read().await.offer_pushes.clone()
    }

    pub async fn last_offers(&self) -> Option<Vec<PriceOffer>> {
        self.state.read().await.offer_pushes.last().cloned()
    }

    pub async fn exposure_updates(&self) -> Vec<Decimal> {
        self.state.read().await.exposure_updates.clone()
    }

    pub async fn collateral_checks(&self) -> Vec<Decimal> {
        self.state.read().await.collateral_checks.clone()
    }

    /// Sweep deposited reserve funds into the trading balance.
    pub async fn sweep_reserve(&self) -> anyhow::Result<u64> {
        let task = SimTransferTask {
            wallet: self.wallet.clone(),
        };
        let id = self
            .cash_ops
            .lock()
            .await
            .add_task(CashOperation::new(Box::new(task)))?;
        Ok(id)
    }
}

#[async_trait]
impl Provider for SimProvider {
    fn role(&self) -> ProviderRole {
        self.role
    }

    async fn is_ready(&self) -> bool {
        let state = self.state.read().await;
        state.core.is_initialized() && state.healthy
    }

    async fn is_broken(&self) -> bool {
        self.state.read().await.broken
    }

    async fn exposure(&self) -> Option<Decimal> {
        let state = self.state.read().await;
        if !(state.core.is_initialized() && state.healthy) {
            return None;
        }
        Some(state.exposure)
    }

    async fn open_volume(&self) -> Option<OpenVolume> {
        let state = self.state.read().await;
        if !(state.core.is_initialized() && state.healthy) {
            return None;
        }
        state.open_volume
    }

    async fn cash_metrics(&self) -> Option<CashMetrics> {
        let state = self.state.read().await;
        if !state.core.is_initialized() {
            return None;
        }
        let (total, pending) = {
            let wallet = self.wallet.lock().unwrap();
            (wallet.total, wallet.pending)
        };
        Some(CashMetrics {
            total,
            pending,
            ratio: state.core.collateral_ratio(),
        })
    }

    async fn open_price(&self) -> Option<Decimal> {
        self.state.read().await.core.open_price()
    }

    async fn balance_report(&self) -> BalanceReport {
        let cash = self.cash_metrics().await.unwrap_or(CashMetrics {
            total: Decimal::ZERO,
            pending: Decimal::ZERO,
            ratio: Decimal::ZERO,
        });
        BalanceReport::new(cash)
    }

    async fn position_report(&self) -> PositionReport {
        let state = self.state.read().await;
        let exposure = if state.core.is_initialized() {
            Some(state.exposure)
        } else {
            None
        };
        PositionReport::new(exposure, state.core.open_price())
    }

    async fn aggregated_ask(&self, target_volume: Decimal) -> Option<AggregatedQuote> {
        self.state.read().await.book.aggregated_ask(target_volume)
    }

    async fn aggregated_bid(&self, target_volume: Decimal) -> Option<AggregatedQuote> {
        self.state.read().await.book.aggregated_bid(target_volume)
    }

    async fn submit_offers(&self, offers: Vec<PriceOffer>) -> anyhow::Result<()> {
        debug!(role = %self.role, count = offers.len(), "Offers submitted");
        self.state.write().await.offer_pushes.push(offers);
        Ok(())
    }

    async fn check_collateral(&self, open_price: Decimal) -> anyhow::Result<()> {
        self.state.write().await.collateral_checks.push(open_price);
        Ok(())
    }

    async fn update_exposure(&self, delta: Decimal) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        state.exposure += delta;
        state.exposure_updates.push(delta);
        Ok(())
    }

    async fn withdraw(&self, amount: Decimal) -> anyhow::Result<u64> {
        let task = SimWithdrawTask {
            wallet: self.wallet.clone(),
            amount,
            sent: false,
        };
        let id = self
            .cash_ops
            .lock()
            .await
            .add_task(CashOperation::new(Box::new(task)))?;
        Ok(id)
    }

    async fn cancel_withdrawals(&self) -> anyhow::Result<u64> {
        let task = SimCancelTask {
            wallet: self.wallet.clone(),
        };
        let id = self
            .cash_ops
            .lock()
            .await
            .add_task(CashOperation::new(Box::new(task)))?;
        Ok(id)
    }

    async fn load_addresses(&self) -> anyhow::Result<()> {
        // Addresses are scripted; loading is a no-op beyond the event.
        Ok(())
    }

    async fn load_withdrawals(&self) -> anyhow::Result<()> {
        self.state.write().await.withdrawals_loaded = true;
        Ok(())
    }

    async fn withdrawals_loaded(&self) -> bool {
        self.state.read().await.withdrawals_loaded
    }

    async fn chain_addresses(&self) -> ChainAddresses {
        self.state.read().await.core.chain_addresses().clone()
    }

    async fn process_cash_ops(&self) -> anyhow::Result<()> {
        let drained = self.cash_ops.lock().await.process().await;
        if drained {
            if let Some(tx) = &self.events {
                let _ = tx
                    .send(ProviderEvent {
                        role: self.role,
                        kind: EventKind::Balance,
                    })
                    .await;
            }
        }
        Ok(())
    }

    async fn has_cash_tasks(&self, kind: CashOpKind) -> bool {
        self.cash_ops.lock().await.has_tasks(kind)
    }
}
