//! Top-level event router.
//!
//! [`DealerFactory`] owns the maker and taker providers, the hedger and the
//! status reporters, and drains a single event channel that every provider
//! feeds. Each event is dispatched to completion before the next one is
//! taken, so the handlers below never run concurrently with each other.

pub mod reporter;

use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::hedger::SimpleHedger;
use crate::provider::types::{BalanceReport, PositionReport};
use crate::provider::{EventKind, Provider, ProviderEvent, ProviderRole};
use reporter::StatusReporter;

/// Point-in-time view of one venue, handed to reporters.
#[derive(Debug, Clone, Serialize)]
pub struct VenueStatus {
    pub role: ProviderRole,
    pub ready: bool,
    pub balance: BalanceReport,
    pub position: PositionReport,
}

/// Point-in-time view of the whole dealer.
#[derive(Debug, Clone, Serialize)]
pub struct DealerStatus {
    pub ready: bool,
    pub maker: VenueStatus,
    pub taker: VenueStatus,
}

/// Routes provider events to the hedger and the reporters.
pub struct DealerFactory {
    maker: Arc<dyn Provider>,
    taker: Arc<dyn Provider>,
    hedger: SimpleHedger,
    reporters: Vec<Box<dyn StatusReporter>>,
    events: mpsc::Receiver<ProviderEvent>,
}

impl DealerFactory {
    pub fn new(
        maker: Arc<dyn Provider>,
        taker: Arc<dyn Provider>,
        hedger: SimpleHedger,
        events: mpsc::Receiver<ProviderEvent>,
    ) -> Self {
        Self {
            maker,
            taker,
            hedger,
            reporters: Vec::new(),
            events,
        }
    }

    pub fn add_reporter(&mut self, reporter: Box<dyn StatusReporter>) {
        self.reporters.push(reporter);
    }

    /// Maker, taker and hedger must all be ready before the dealer is.
    pub async fn is_ready(&self) -> bool {
        self.maker.is_ready().await && self.taker.is_ready().await && self.hedger.is_ready()
    }

    pub async fn status(&self) -> DealerStatus {
        DealerStatus {
            ready: self.is_ready().await,
            maker: self.venue_status(&self.maker).await,
            taker: self.venue_status(&self.taker).await,
        }
    }

    async fn venue_status(&self, provider: &Arc<dyn Provider>) -> VenueStatus {
        VenueStatus {
            role: provider.role(),
            ready: provider.is_ready().await,
            balance: provider.balance_report().await,
            position: provider.position_report().await,
        }
    }

    /// Drain the event channel until every sender is dropped.
    ///
    /// Any handler error is fatal to the loop; the surrounding process is
    /// expected to be restarted by its supervisor.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        info!("Dealer event loop starting");
        while let Some(event) = self.events.recv().await {
            self.on_event(event)
                .await
                .context("event handler failed")?;
        }
        info!("Event channel closed, dealer loop stopping");
        Ok(())
    }

    pub async fn on_event(&mut self, event: ProviderEvent) -> anyhow::Result<()> {
        debug!(role = %event.role, kind = ?event.kind, "Dispatching event");
        match event.kind {
            EventKind::Ready => {
                self.hedger
                    .check_exposure_sync(&self.maker, &self.taker)
                    .await?;
                self.hedger
                    .check_taker_collateral(&self.maker, &self.taker)
                    .await?;
                let status = self.status().await;
                for reporter in &mut self.reporters {
                    reporter.on_ready_event(&status).await;
                }
            }
            EventKind::Balance => {
                self.hedger
                    .check_exposure_sync(&self.maker, &self.taker)
                    .await?;
                self.hedger
                    .process_rebalance(&self.maker, &self.taker)
                    .await?;
                if event.role == ProviderRole::Taker {
                    self.hedger
                        .check_taker_collateral(&self.maker, &self.taker)
                        .await?;
                }
                let status = self.status().await;
                for reporter in &mut self.reporters {
                    reporter.on_balance_event(event.role, &status).await;
                }
            }
            EventKind::Position => {
                self.hedger
                    .check_exposure_sync(&self.maker, &self.taker)
                    .await?;
                match event.role {
                    // A maker fill changes what we can quote.
                    ProviderRole::Maker => {
                        self.hedger.submit_offers(&self.maker, &self.taker).await?;
                    }
                    ProviderRole::Taker => {
                        self.hedger
                            .check_taker_collateral(&self.maker, &self.taker)
                            .await?;
                    }
                }
                let status = self.status().await;
                for reporter in &mut self.reporters {
                    reporter.on_position_event(event.role, &status).await;
                }
            }
            EventKind::OrderBook => {
                // Only taker depth feeds offer pricing.
                if event.role == ProviderRole::Taker {
                    self.hedger.submit_offers(&self.maker, &self.taker).await?;
                }
            }
            EventKind::Collateral => {
                self.hedger
                    .check_taker_collateral(&self.maker, &self.taker)
                    .await?;
            }
            EventKind::PriceEvent => {
                let status = self.status().await;
                for reporter in &mut self.reporters {
                    reporter.on_price_event(event.role, &status).await;
                }
            }
            EventKind::Rebalance => {
                let status = self.status().await;
                for reporter in &mut self.reporters {
                    reporter.on_rebalance_event(event.role, &status).await;
                }
            }
            EventKind::Transaction => {
                self.maker.process_cash_ops().await?;
                self.taker.process_cash_ops().await?;
                self.hedger
                    .check_exposure_sync(&self.maker, &self.taker)
                    .await?;
                self.hedger
                    .process_rebalance(&self.maker, &self.taker)
                    .await?;
            }
        }
        Ok(())
    }
}
