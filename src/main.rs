//! Maker-Taker Dealer - Main Entry Point
//!
//! Runs the dealer loop in paper mode against two simulated venues.

use anyhow::Result;
use clap::{Parser, Subcommand};
use maker_taker_dealer::config::DealerConfig;
use maker_taker_dealer::dealer::reporter::LogReporter;
use maker_taker_dealer::dealer::DealerFactory;
use maker_taker_dealer::hedger::SimpleHedger;
use maker_taker_dealer::provider::types::{BookEntry, ChainAddresses};
use maker_taker_dealer::provider::{
    EventKind, Provider, ProviderEvent, ProviderRole, SimProvider,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Maker-Taker Dealer CLI
#[derive(Parser)]
#[command(name = "maker-taker-dealer")]
#[command(version, about = "Mirror-hedging dealer between a maker and a taker venue")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration and exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    let config = DealerConfig::load()?;

    if let Some(Commands::CheckConfig) = cli.command {
        info!("Configuration OK");
        return Ok(());
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Maker-Taker Dealer starting in paper mode"
    );
    log_config(&config);

    run_paper(config).await
}

/// Wire two simulated venues through the real dealer loop.
async fn run_paper(config: DealerConfig) -> Result<()> {
    let (tx, rx) = tokio::sync::mpsc::channel::<ProviderEvent>(256);

    let paper = config.paper.clone();
    let maker = Arc::new(
        SimProvider::new(
            ProviderRole::Maker,
            paper.maker_balance,
            paper.maker_leverage,
        )
        .with_events(tx.clone()),
    );
    let taker = Arc::new(
        SimProvider::new(
            ProviderRole::Taker,
            paper.taker_balance,
            paper.taker_leverage,
        )
        .with_events(tx.clone()),
    );

    // Cross-validated addresses so the rebalance layer may withdraw.
    maker
        .set_addresses(ChainAddresses {
            deposit: Some("maker-deposit".into()),
            withdraw_whitelist: vec!["taker-deposit".into()],
            default_withdraw: Some("taker-deposit".into()),
        })
        .await;
    taker
        .set_addresses(ChainAddresses {
            deposit: Some("taker-deposit".into()),
            withdraw_whitelist: vec!["maker-deposit".into()],
            default_withdraw: Some("maker-deposit".into()),
        })
        .await;
    maker.load_withdrawals().await?;
    taker.load_withdrawals().await?;

    let hedger = SimpleHedger::new(config.hedger.clone(), config.rebalance.clone());
    let mut dealer = DealerFactory::new(maker.clone(), taker.clone(), hedger, rx);
    dealer.add_reporter(Box::new(LogReporter::new()));

    tokio::spawn(drive_paper_market(maker, taker, tx));

    tokio::select! {
        result = dealer.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            Ok(())
        }
    }
}

/// Feed the simulated venues with a slowly drifting market.
///
/// A deterministic xorshift walk moves the taker mid price; each tick
/// refreshes the taker book, bumps open volumes off the venue balances and
/// emits the events a live venue adapter would.
async fn drive_paper_market(
    maker: Arc<SimProvider>,
    taker: Arc<SimProvider>,
    tx: tokio::sync::mpsc::Sender<ProviderEvent>,
) {
    let mut rng: u64 = 0x9E37_79B9_7F4A_7C15;
    let mut mid = dec!(10000);
    let mut interval = tokio::time::interval(Duration::from_millis(500));

    let send = |role: ProviderRole, kind: EventKind| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(ProviderEvent { role, kind }).await;
        }
    };

    // One readiness pass before the market starts moving.
    maker.set_open_price_value(mid).await;
    refresh_taker(&taker, mid).await;
    refresh_volumes(&maker, mid).await;
    send(ProviderRole::Maker, EventKind::Ready).await;
    send(ProviderRole::Taker, EventKind::Ready).await;

    loop {
        interval.tick().await;

        rng ^= rng << 13;
        rng ^= rng >> 7;
        rng ^= rng << 17;
        let step = Decimal::from(rng % 11) - dec!(5);
        mid += step;

        maker.set_open_price_value(mid).await;
        refresh_taker(&taker, mid).await;
        refresh_volumes(&maker, mid).await;

        send(ProviderRole::Taker, EventKind::OrderBook).await;
        send(ProviderRole::Maker, EventKind::PriceEvent).await;
        send(ProviderRole::Maker, EventKind::Balance).await;
        send(ProviderRole::Maker, EventKind::Transaction).await;
        send(ProviderRole::Taker, EventKind::Transaction).await;
    }
}

async fn refresh_taker(taker: &SimProvider, mid: Decimal) {
    taker
        .apply_book_snapshot(&[
            BookEntry {
                price: mid + dec!(5),
                volume: dec!(-2),
                order_count: 1,
            },
            BookEntry {
                price: mid + dec!(15),
                volume: dec!(-6),
                order_count: 1,
            },
            BookEntry {
                price: mid - dec!(5),
                volume: dec!(2),
                order_count: 1,
            },
            BookEntry {
                price: mid - dec!(15),
                volume: dec!(6),
                order_count: 1,
            },
        ])
        .await;
    refresh_volumes(taker, mid).await;
}

/// Quotable size per side from free cash at the current mid.
async fn refresh_volumes(provider: &SimProvider, mid: Decimal) {
    if let Some(cash) = provider.cash_metrics().await {
        if cash.ratio > Decimal::ZERO && mid > Decimal::ZERO {
            let volume = cash.total / (cash.ratio * mid);
            provider.set_open_volume(volume, volume).await;
        }
    }
}

fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::hourly("logs", "maker-taker-dealer.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    // Leak the guard to keep it alive for the program duration
    Box::leak(Box::new(_guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("maker_taker_dealer=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}

/// Log configuration on startup.
fn log_config(config: &DealerConfig) {
    info!("Configuration:");
    info!("   Price Ratio: {}", config.hedger.price_ratio);
    info!("   Max Offer Volume: {}", config.hedger.max_offer_volume);
    info!(
        "   Offer Refresh Delay: {}ms",
        config.hedger.offer_refresh_delay_ms
    );
    info!(
        "   Exposure Cooldown: {}ms",
        config.hedger.exposure_cooldown_ms
    );
    info!("   Rebalance Enabled: {}", config.rebalance.enable);
    info!("   Rebalance Threshold: {}", config.rebalance.threshold_pct);
    info!("   Rebalance Min Amount: {}", config.rebalance.min_amount);
}
