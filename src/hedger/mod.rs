//! Hedging decision engine.
//!
//! Derives two-sided maker offers from maker/taker open volume and taker
//! book depth, and keeps the taker's net position the exact mirror of the
//! maker's. Owns the rebalance manager once the first exposure
//! synchronization succeeds.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{HedgerConfig, RebalanceConfig};
use crate::provider::types::PriceOffer;
use crate::provider::Provider;
use crate::rebalance::RebalanceManager;
use crate::utils::decimal::round_price;

/// Exposure differences below this are treated as already in sync.
const EXPOSURE_EPSILON: Decimal = dec!(0.000001);

/// Cooldown gate for exposure updates pushed to the taker.
///
/// The first push inside a cooldown window schedules the delayed flush;
/// later pushes in the same window only overwrite the queued delta. Two
/// pushes arriving in the same tick before the cooldown check can both see
/// the window as open; that narrow race is a documented property of this
/// gate, not something callers should lock around.
struct ExposureGate {
    cooldown: Duration,
    inner: Arc<StdMutex<GateState>>,
}

#[derive(Default)]
struct GateState {
    last_sent: Option<Instant>,
    queued: Option<Decimal>,
    flush_scheduled: bool,
}

impl ExposureGate {
    fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            inner: Arc::new(StdMutex::new(GateState::default())),
        }
    }

    async fn push(&self, taker: &Arc<dyn Provider>, delta: Decimal) {
        enum Action {
            SendNow,
            AlreadyScheduled,
            Schedule(Duration),
        }

        let action = {
            let mut state = self.inner.lock().unwrap();
            let now = Instant::now();
            match state.last_sent {
                Some(sent) if now.duration_since(sent) < self.cooldown => {
                    // Inside the window: park the delta. The latest caller
                    // wins, whoever scheduled the flush.
                    state.queued = Some(delta);
                    if state.flush_scheduled {
                        Action::AlreadyScheduled
                    } else {
                        state.flush_scheduled = true;
                        Action::Schedule(self.cooldown - now.duration_since(sent))
                    }
                }
                _ => {
                    state.last_sent = Some(now);
                    Action::SendNow
                }
            }
        };

        match action {
            Action::SendNow => {
                if let Err(e) = taker.update_exposure(delta).await {
                    warn!(error = %e, "Exposure update failed");
                }
            }
            Action::AlreadyScheduled => {}
            Action::Schedule(remaining) => {
                let inner = self.inner.clone();
                let taker = taker.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(remaining).await;
                    let delta = {
                        let mut state = inner.lock().unwrap();
                        state.flush_scheduled = false;
                        state.last_sent = Some(Instant::now());
                        state.queued.take()
                    };
                    if let Some(delta) = delta {
                        if let Err(e) = taker.update_exposure(delta).await {
                            warn!(error = %e, "Deferred exposure update failed");
                        }
                    }
                });
            }
        }
    }
}

/// Offer computation and exposure synchronization.
pub struct SimpleHedger {
    config: HedgerConfig,
    rebalance_config: RebalanceConfig,
    ready: bool,
    rebal_man: Option<RebalanceManager>,
    last_offers: Vec<PriceOffer>,
    exposure_gate: ExposureGate,
}

impl SimpleHedger {
    pub fn new(config: HedgerConfig, rebalance_config: RebalanceConfig) -> Self {
        let cooldown = Duration::from_millis(config.exposure_cooldown_ms);
        Self {
            config,
            rebalance_config,
            ready: false,
            rebal_man: None,
            last_offers: Vec::new(),
            exposure_gate: ExposureGate::new(cooldown),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn rebalance_manager(&self) -> Option<&RebalanceManager> {
        self.rebal_man.as_ref()
    }

    /// Recompute and push maker offers.
    pub async fn submit_offers(
        &mut self,
        maker: &Arc<dyn Provider>,
        taker: &Arc<dyn Provider>,
    ) -> anyhow::Result<()> {
        let open_volumes = match (maker.open_volume().await, taker.open_volume().await) {
            (Some(m), Some(t)) if self.ready => Some((m, t)),
            _ => None,
        };

        let Some((maker_volume, taker_volume)) = open_volumes else {
            // Not in a state to quote: take standing offers down, but only
            // once. Every book tick lands here before readiness.
            if !self.last_offers.is_empty() {
                maker.submit_offers(Vec::new()).await?;
                self.last_offers.clear();
            }
            return Ok(());
        };

        // Maker asks are hedged against taker bids and vice versa.
        let ask_request = maker_volume
            .ask
            .min(taker_volume.bid)
            .min(self.config.max_offer_volume);
        let bid_request = maker_volume
            .bid
            .min(taker_volume.ask)
            .min(self.config.max_offer_volume);

        let (ask_volume, ask_price) = match taker.aggregated_ask(ask_request).await {
            Some(quote) => (ask_request.min(quote.volume), quote.price),
            None => (Decimal::ZERO, Decimal::ZERO),
        };
        let (bid_volume, bid_price) = match taker.aggregated_bid(bid_request).await {
            Some(quote) => (bid_request.min(quote.volume), quote.price),
            None => (Decimal::ZERO, Decimal::ZERO),
        };

        let ask_price = round_price(ask_price * (Decimal::ONE + self.config.price_ratio));
        let bid_price = round_price(bid_price * (Decimal::ONE - self.config.price_ratio));

        let mut offers = Vec::new();
        if ask_volume == bid_volume && ask_volume != Decimal::ZERO {
            match PriceOffer::new(ask_volume, Some(ask_price), Some(bid_price)) {
                Ok(offer) => offers.push(offer),
                Err(e) => warn!(error = %e, "Skipping malformed two-sided offer"),
            }
        } else {
            if ask_volume != Decimal::ZERO {
                match PriceOffer::new(ask_volume, Some(ask_price), None) {
                    Ok(offer) => offers.push(offer),
                    Err(e) => warn!(error = %e, "Skipping malformed ask offer"),
                }
            }
            if bid_volume != Decimal::ZERO {
                match PriceOffer::new(bid_volume, None, Some(bid_price)) {
                    Ok(offer) => offers.push(offer),
                    Err(e) => warn!(error = %e, "Skipping malformed bid offer"),
                }
            }
        }

        if self.offers_unchanged(&offers) {
            debug!("Offer list unchanged within refresh delay, suppressing push");
            return Ok(());
        }

        debug!(count = offers.len(), "Pushing recomputed offers");
        maker.submit_offers(offers.clone()).await?;
        self.last_offers = offers;
        Ok(())
    }

    /// Value-equal to the last pushed list, with every prior offer still
    /// inside the refresh-delay window.
    fn offers_unchanged(&self, offers: &[PriceOffer]) -> bool {
        if offers.len() != self.last_offers.len() || offers.is_empty() {
            return false;
        }
        let delay = chrono::Duration::milliseconds(self.config.offer_refresh_delay_ms as i64);
        let now = Utc::now();
        offers
            .iter()
            .zip(self.last_offers.iter())
            .all(|(new, old)| new.same_as(old) && now - old.created_at < delay)
    }

    /// Mirror the maker's exposure onto the taker.
    ///
    /// The taker is expected to hold the exact negative of the maker's
    /// position; any residual larger than the epsilon is pushed to the
    /// taker through the cooldown gate. A broken maker is treated as flat,
    /// forcing the taker flat too.
    pub async fn check_exposure_sync(
        &mut self,
        maker: &Arc<dyn Provider>,
        taker: &Arc<dyn Provider>,
    ) -> anyhow::Result<()> {
        let Some(taker_exposure) = taker.exposure().await else {
            return Ok(());
        };

        let maker_exposure = match maker.exposure().await {
            Some(exposure) => exposure,
            None if maker.is_broken().await => {
                warn!("Maker broken with unknown exposure, forcing taker flat");
                Decimal::ZERO
            }
            None => return Ok(()),
        };

        let diff = maker_exposure + taker_exposure;
        if diff.abs() > EXPOSURE_EPSILON {
            info!(
                maker = %maker_exposure,
                taker = %taker_exposure,
                delta = %(-diff),
                "Exposure out of sync, updating taker"
            );
            self.exposure_gate.push(taker, -diff).await;
        }

        if !self.ready {
            info!("First exposure synchronization done, hedger ready");
            self.ready = true;
        }
        if self.rebal_man.is_none() {
            self.rebal_man = Some(RebalanceManager::new(self.rebalance_config.clone()));
        }

        Ok(())
    }

    /// Forward the maker's reference price to the taker's collateral check.
    pub async fn check_taker_collateral(
        &self,
        maker: &Arc<dyn Provider>,
        taker: &Arc<dyn Provider>,
    ) -> anyhow::Result<()> {
        if let Some(open_price) = maker.open_price().await {
            taker.check_collateral(open_price).await?;
        }
        Ok(())
    }

    /// Drive the rebalance protocol, if the manager exists yet.
    pub async fn process_rebalance(
        &mut self,
        maker: &Arc<dyn Provider>,
        taker: &Arc<dyn Provider>,
    ) -> anyhow::Result<()> {
        if let Some(rebal_man) = self.rebal_man.as_mut() {
            rebal_man
                .process_rebalance(maker.as_ref(), taker.as_ref())
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HedgerConfig, RebalanceConfig};
    use crate::provider::types::BookEntry;
    use crate::provider::{ProviderRole, SimProvider};

    fn test_hedger_config() -> HedgerConfig {
        HedgerConfig {
            price_ratio: dec!(0.01),
            max_offer_volume: dec!(5),
            offer_refresh_delay_ms: 1000,
            exposure_cooldown_ms: 500,
        }
    }

    fn test_rebalance_config() -> RebalanceConfig {
        RebalanceConfig {
            enable: true,
            threshold_pct: dec!(0.05),
            min_amount: dec!(100),
        }
    }

    fn hedger() -> SimpleHedger {
        SimpleHedger::new(test_hedger_config(), test_rebalance_config())
    }

    fn providers() -> (Arc<SimProvider>, Arc<SimProvider>, Arc<dyn Provider>, Arc<dyn Provider>) {
        let maker = Arc::new(SimProvider::new(ProviderRole::Maker, dec!(1000), dec!(10)));
        let taker = Arc::new(SimProvider::new(ProviderRole::Taker, dec!(1500), dec!(10)));
        let maker_dyn: Arc<dyn Provider> = maker.clone();
        let taker_dyn: Arc<dyn Provider> = taker.clone();
        (maker, taker, maker_dyn, taker_dyn)
    }

    fn ask(price: Decimal, volume: Decimal) -> BookEntry {
        BookEntry {
            price,
            volume: -volume,
            order_count: 1,
        }
    }

    fn bid(price: Decimal, volume: Decimal) -> BookEntry {
        BookEntry {
            price,
            volume,
            order_count: 1,
        }
    }

    async fn symmetric_book(taker: &SimProvider) {
        taker
            .apply_book_snapshot(&[
                ask(dec!(10010), dec!(3)),
                ask(dec!(10030), dec!(4)),
                bid(dec!(9990), dec!(3)),
                bid(dec!(9970), dec!(4)),
            ])
            .await;
    }

    async fn make_ready(h: &mut SimpleHedger, maker: &Arc<dyn Provider>, taker: &Arc<dyn Provider>) {
        h.check_exposure_sync(maker, taker).await.unwrap();
        assert!(h.is_ready());
    }

    #[tokio::test]
    async fn test_not_ready_with_nothing_standing_skips_push() {
        let (maker, taker, maker_dyn, taker_dyn) = providers();
        let mut h = hedger();

        taker.set_open_volume(dec!(5), dec!(5)).await;
        // Book ticks arrive before the first exposure sync; none of them
        // should touch the maker.
        h.submit_offers(&maker_dyn, &taker_dyn).await.unwrap();
        h.submit_offers(&maker_dyn, &taker_dyn).await.unwrap();

        assert!(maker.offer_pushes().await.is_empty());
        assert!(taker.offer_pushes().await.is_empty());
    }

    #[tokio::test]
    async fn test_lost_volume_clears_standing_offers_once() {
        let (maker, taker, maker_dyn, taker_dyn) = providers();
        let mut h = hedger();
        make_ready(&mut h, &maker_dyn, &taker_dyn).await;

        maker.set_open_volume(dec!(2), dec!(2)).await;
        taker.set_open_volume(dec!(2), dec!(2)).await;
        symmetric_book(&taker).await;
        h.submit_offers(&maker_dyn, &taker_dyn).await.unwrap();
        assert_eq!(maker.offer_pushes().await.len(), 1);

        // Volume limits disappear: one clearing push, then silence.
        maker.clear_open_volume().await;
        h.submit_offers(&maker_dyn, &taker_dyn).await.unwrap();
        h.submit_offers(&maker_dyn, &taker_dyn).await.unwrap();

        let pushes = maker.offer_pushes().await;
        assert_eq!(pushes.len(), 2);
        assert!(pushes[1].is_empty());
    }

    #[tokio::test]
    async fn test_two_sided_offer_with_markup() {
        let (maker, taker, maker_dyn, taker_dyn) = providers();
        let mut h = hedger();
        make_ready(&mut h, &maker_dyn, &taker_dyn).await;

        maker.set_open_volume(dec!(2), dec!(2)).await;
        taker.set_open_volume(dec!(2), dec!(2)).await;
        symmetric_book(&taker).await;

        h.submit_offers(&maker_dyn, &taker_dyn).await.unwrap();

        let offers = maker.last_offers().await.unwrap();
        assert_eq!(offers.len(), 1);
        let offer = &offers[0];
        assert_eq!(offer.volume, dec!(2));
        // The top level covers the request on each side, then the 1% markup.
        assert_eq!(offer.ask, Some(dec!(10110.10)));
        assert_eq!(offer.bid, Some(dec!(9890.10)));
    }

    #[tokio::test]
    async fn test_two_sided_offer_prices_from_multi_level_vwap() {
        let (maker, taker, maker_dyn, taker_dyn) = providers();
        let mut h = hedger();
        make_ready(&mut h, &maker_dyn, &taker_dyn).await;

        maker.set_open_volume(dec!(0.8), dec!(0.8)).await;
        taker.set_open_volume(dec!(5), dec!(5)).await;
        // 0.8 spans all four levels on each side; the quote is the volume
        // weighted average across them, capped back to the requested size.
        taker
            .apply_book_snapshot(&[
                ask(dec!(10004), dec!(0.25)),
                ask(dec!(10008), dec!(0.25)),
                ask(dec!(10012), dec!(0.25)),
                ask(dec!(10016), dec!(0.25)),
                bid(dec!(9996), dec!(0.25)),
                bid(dec!(9992), dec!(0.25)),
                bid(dec!(9988), dec!(0.25)),
                bid(dec!(9984), dec!(0.25)),
            ])
            .await;

        h.submit_offers(&maker_dyn, &taker_dyn).await.unwrap();

        let offers = maker.last_offers().await.unwrap();
        assert_eq!(offers.len(), 1);
        let offer = &offers[0];
        assert_eq!(offer.volume, dec!(0.8));
        // Average fill price is 10010 / 9990, then the 1% markup each way.
        assert_eq!(offer.ask, Some(dec!(10110.10)));
        assert_eq!(offer.bid, Some(dec!(9890.10)));
    }

    #[tokio::test]
    async fn test_unequal_volumes_emit_single_sided_offers() {
        let (maker, taker, maker_dyn, taker_dyn) = providers();
        let mut h = hedger();
        make_ready(&mut h, &maker_dyn, &taker_dyn).await;

        // Maker can quote 3 asks but only 1 bid.
        maker.set_open_volume(dec!(3), dec!(1)).await;
        taker.set_open_volume(dec!(4), dec!(4)).await;
        symmetric_book(&taker).await;

        h.submit_offers(&maker_dyn, &taker_dyn).await.unwrap();

        let offers = maker.last_offers().await.unwrap();
        assert_eq!(offers.len(), 2);
        assert_eq!(offers[0].volume, dec!(3));
        assert!(offers[0].ask.is_some() && offers[0].bid.is_none());
        assert_eq!(offers[1].volume, dec!(1));
        assert!(offers[1].bid.is_some() && offers[1].ask.is_none());
    }

    #[tokio::test]
    async fn test_empty_book_side_zeroes_that_side() {
        let (maker, taker, maker_dyn, taker_dyn) = providers();
        let mut h = hedger();
        make_ready(&mut h, &maker_dyn, &taker_dyn).await;

        maker.set_open_volume(dec!(2), dec!(2)).await;
        taker.set_open_volume(dec!(2), dec!(2)).await;
        taker
            .apply_book_snapshot(&[bid(dec!(9990), dec!(5))])
            .await;

        h.submit_offers(&maker_dyn, &taker_dyn).await.unwrap();

        let offers = maker.last_offers().await.unwrap();
        assert_eq!(offers.len(), 1);
        assert!(offers[0].ask.is_none());
        assert_eq!(offers[0].volume, dec!(2));
    }

    #[tokio::test]
    async fn test_identical_offers_suppressed_within_refresh_delay() {
        let (maker, taker, maker_dyn, taker_dyn) = providers();
        let mut h = hedger();
        make_ready(&mut h, &maker_dyn, &taker_dyn).await;

        maker.set_open_volume(dec!(2), dec!(2)).await;
        taker.set_open_volume(dec!(2), dec!(2)).await;
        symmetric_book(&taker).await;

        h.submit_offers(&maker_dyn, &taker_dyn).await.unwrap();
        h.submit_offers(&maker_dyn, &taker_dyn).await.unwrap();

        assert_eq!(maker.offer_pushes().await.len(), 1);

        // A book change makes the recomputed list differ and pushes again.
        taker.apply_book_update(&ask(dec!(10010), dec!(1))).await;
        h.submit_offers(&maker_dyn, &taker_dyn).await.unwrap();
        assert_eq!(maker.offer_pushes().await.len(), 2);
    }

    #[tokio::test]
    async fn test_exposure_sync_pushes_negative_diff() {
        let (maker, taker, maker_dyn, taker_dyn) = providers();
        let mut h = hedger();

        maker.set_exposure(dec!(5)).await;
        taker.set_exposure(dec!(-3)).await;

        h.check_exposure_sync(&maker_dyn, &taker_dyn).await.unwrap();

        assert_eq!(taker.exposure_updates().await, vec![dec!(-2)]);
        assert_eq!(taker.exposure().await, Some(dec!(-5)));
        assert!(h.is_ready());
        assert!(h.rebalance_manager().is_some());
    }

    #[tokio::test]
    async fn test_exposure_in_sync_is_left_alone() {
        let (maker, taker, maker_dyn, taker_dyn) = providers();
        let mut h = hedger();

        maker.set_exposure(dec!(5)).await;
        taker.set_exposure(dec!(-5)).await;

        h.check_exposure_sync(&maker_dyn, &taker_dyn).await.unwrap();
        assert!(taker.exposure_updates().await.is_empty());
        assert!(h.is_ready());
    }

    #[tokio::test]
    async fn test_unavailable_taker_exposure_is_noop() {
        let (maker, taker, maker_dyn, taker_dyn) = providers();
        let mut h = hedger();

        maker.set_exposure(dec!(5)).await;
        taker.set_healthy(false).await;

        h.check_exposure_sync(&maker_dyn, &taker_dyn).await.unwrap();
        assert!(taker.exposure_updates().await.is_empty());
        assert!(!h.is_ready());
    }

    #[tokio::test]
    async fn test_broken_maker_forces_taker_flat() {
        let (maker, taker, maker_dyn, taker_dyn) = providers();
        let mut h = hedger();

        maker.set_broken(true).await;
        taker.set_exposure(dec!(-7)).await;

        h.check_exposure_sync(&maker_dyn, &taker_dyn).await.unwrap();

        assert_eq!(taker.exposure_updates().await, vec![dec!(7)]);
        assert_eq!(taker.exposure().await, Some(dec!(0)));
    }

    #[tokio::test]
    async fn test_unready_maker_not_broken_is_noop() {
        let (maker, taker, maker_dyn, taker_dyn) = providers();
        let mut h = hedger();

        maker.set_healthy(false).await;
        taker.set_exposure(dec!(-7)).await;

        h.check_exposure_sync(&maker_dyn, &taker_dyn).await.unwrap();
        assert!(taker.exposure_updates().await.is_empty());
    }

    #[tokio::test]
    async fn test_exposure_cooldown_coalesces_updates() {
        let (maker, taker, maker_dyn, taker_dyn) = providers();
        let mut cfg = test_hedger_config();
        cfg.exposure_cooldown_ms = 80;
        let mut h = SimpleHedger::new(cfg, test_rebalance_config());

        // First update goes straight through.
        maker.set_exposure(dec!(1)).await;
        h.check_exposure_sync(&maker_dyn, &taker_dyn).await.unwrap();
        assert_eq!(taker.exposure_updates().await.len(), 1);

        // Two more inside the window: only the latest survives, flushed
        // once the cooldown elapses.
        maker.set_exposure(dec!(2)).await;
        h.check_exposure_sync(&maker_dyn, &taker_dyn).await.unwrap();
        maker.set_exposure(dec!(3)).await;
        h.check_exposure_sync(&maker_dyn, &taker_dyn).await.unwrap();
        assert_eq!(taker.exposure_updates().await.len(), 1);

        tokio::time::sleep(Duration::from_millis(160)).await;
        let updates = taker.exposure_updates().await;
        assert_eq!(updates.len(), 2);
    }

    #[tokio::test]
    async fn test_collateral_forwarding_uses_maker_open_price() {
        let (maker, taker, maker_dyn, taker_dyn) = providers();
        let h = hedger();

        // No open price yet: nothing to forward.
        h.check_taker_collateral(&maker_dyn, &taker_dyn).await.unwrap();
        assert!(taker.collateral_checks().await.is_empty());

        maker.set_open_price_value(dec!(10000)).await;
        h.check_taker_collateral(&maker_dyn, &taker_dyn).await.unwrap();
        assert_eq!(taker.collateral_checks().await, vec![dec!(10000)]);
    }
}
