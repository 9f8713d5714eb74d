//! Spread Arb - Main Entry Point
//!
//! Paper trading against simulated venues, historical backtests and a
//! status view over the trade journal.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal_macros::dec;
use spread_arb::backtest::BacktestEngine;
use spread_arb::clock::{Clock, SystemClock};
use spread_arb::config::Config;
use spread_arb::exchange::VenueSimulator;
use spread_arb::persistence::{CsvTradeLog, TradeStore};
use spread_arb::strategy::{StrategyEngine, StrategyEvent, TracingSink};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Spread Arb CLI
#[derive(Parser)]
#[command(name = "spread-arb")]
#[command(version, about = "Cross-venue delta-neutral spread arbitrage")]
struct Cli {
    /// Path to the configuration file (JSON, TOML or YAML)
    #[arg(short, long, global = true, default_value = "config.json")]
    config: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Paper trade against two simulated venues (default)
    Paper,

    /// Replay the configured historical CSV files through the strategy
    Backtest {
        /// Output directory for trades.csv and events.json
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Show trade counts, fees and recent trades from the SQLite journal
    Status {
        /// Path to SQLite database (default: `database_path` from the config)
        #[arg(short, long)]
        db: Option<String>,

        /// Number of recent trades to list
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    match cli.command.unwrap_or(Commands::Paper) {
        Commands::Paper => {
            let config = Config::load(&cli.config)?;
            run_paper(config).await
        }
        Commands::Backtest { output } => {
            let config = Config::load(&cli.config)?;
            run_backtest(config, output.as_deref()).await
        }
        Commands::Status { db, limit } => {
            let db = match db {
                Some(db) => Some(db),
                None => Config::load(&cli.config)
                    .ok()
                    .and_then(|config| config.database_path),
            };
            match db {
                Some(db) => show_status(&db, limit),
                None => {
                    println!("❌ No database configured. Pass --db or set `database_path`.");
                    Ok(())
                }
            }
        }
    }
}

/// Initialize logging to stdout and an hourly rolling file.
fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::hourly("logs", "spread-arb.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    // Leak the guard to keep it alive for the program duration
    Box::leak(Box::new(_guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("spread_arb=debug".parse()?)
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
fn log_config(config: &Config) {
    info!("📋 Configuration:");
    info!("   Pair: {}", config.pair);
    info!("   Venues: {} / {}", config.connector_a, config.connector_b);
    info!(
        "   Open at |spread| >= {:.4}%, close at <= {:.4}%",
        config.min_spread_pct * dec!(100),
        config.take_profit_spread_pct * dec!(100)
    );
    info!("   Cooldown: {}s", config.cooldown_seconds);
    info!(
        "   Order size: ${}, max exposure: ${}",
        config.order_size_usd, config.max_exposure_usd
    );
    info!(
        "   Fee: {:.4}%, slippage: {:.4}%",
        config.fee_pct * dec!(100),
        config.slippage_pct * dec!(100)
    );
}

/// Run the paper trading loop until Ctrl-C.
async fn run_paper(config: Config) -> Result<()> {
    config.validate()?;

    info!("╔════════════════════════════════════════════════════════════╗");
    info!(
        "║          Spread Arb v{} - Paper Trading                  ║",
        env!("CARGO_PKG_VERSION")
    );
    info!("╚════════════════════════════════════════════════════════════╝");
    log_config(&config);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let venue_a = Arc::new(config.build_simulator(
        &config.connector_a,
        config.initial_price,
        clock.clone(),
        0,
    ));
    let venue_b = Arc::new(config.build_simulator(
        &config.connector_b,
        config.initial_price,
        clock.clone(),
        1,
    ));

    let mut engine = StrategyEngine::new(
        config.strategy_config(),
        venue_a.clone(),
        venue_b.clone(),
    )
    .with_clock(clock)
    .with_sink(Arc::new(TracingSink));

    let trade_log = CsvTradeLog::new(&config.log_path);
    let store = match config.database_path.as_deref() {
        Some(path) => {
            if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            Some(TradeStore::new(path)?)
        }
        None => None,
    };

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(Duration::from_secs(config.poll_interval_secs));

    info!("🚀 Starting paper trading loop (Ctrl-C to stop)...");

    let mut cycles: u64 = 0;
    let mut events: u64 = 0;
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("🛑 Shutdown signal received");
                break;
            }
            _ = ticker.tick() => {}
        }

        cycles += 1;
        match engine.step().await {
            Ok(Some(event)) => {
                events += 1;
                info!(
                    "📈 Event: {} spread={:.6}",
                    event.kind,
                    event.spread
                );
                record_event(&trade_log, store.as_ref(), &event);
            }
            Ok(None) => {}
            Err(e) => error!("❌ Strategy step failed: {}", e),
        }
    }

    info!("📊 Session: {} cycles, {} events", cycles, events);
    log_venue(&venue_a, &config.pair).await;
    log_venue(&venue_b, &config.pair).await;

    Ok(())
}

fn record_event(trade_log: &CsvTradeLog, store: Option<&TradeStore>, event: &StrategyEvent) {
    if let Err(e) = trade_log.append(event) {
        error!("Failed to append trade log: {:#}", e);
    }
    if let Some(store) = store {
        if let Err(e) = store.record_event(event) {
            error!("Failed to record trades in database: {:#}", e);
        }
    }
}

async fn log_venue(venue: &VenueSimulator, pair: &str) {
    let state = venue.get_state().await;
    let position = state.position(pair);
    info!(
        "   {}: balance ${:.4} (fees ${:.4}), position {} ${:.2}",
        venue.config().venue_id,
        state.balance,
        state.total_fees,
        position.side,
        position.notional
    );
}

/// Run a backtest over the configured historical data.
async fn run_backtest(config: Config, output_dir: Option<&str>) -> Result<()> {
    info!("╔════════════════════════════════════════════════════════════╗");
    info!("║              BACKTEST MODE                                 ║");
    info!("╚════════════════════════════════════════════════════════════╝");
    log_config(&config);

    let engine = BacktestEngine::new(config);
    let samples = engine.load_aligned()?;
    info!("📊 Aligned samples: {}", samples.len());

    let result = engine.run(&samples).await?;

    println!("\n{}", result.summary());

    if let Some(dir) = output_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir))?;

        let trades_path = Path::new(dir).join("trades.csv");
        if trades_path.exists() {
            warn!("Overwriting existing {}", trades_path.display());
            std::fs::remove_file(&trades_path)?;
        }
        let rows = result.write_trade_log(&trades_path)?;
        info!("📁 {} trades saved to: {}", rows, trades_path.display());

        let events_path = Path::new(dir).join("events.json");
        result.events_to_json(&events_path)?;
        info!("📁 Events saved to: {}", events_path.display());
    }

    Ok(())
}

/// Print a summary of the SQLite trade journal.
fn show_status(db_path: &str, limit: usize) -> Result<()> {
    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║              SPREAD ARB STATUS                             ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    if !Path::new(db_path).exists() {
        println!("\n❌ Database not found: {}", db_path);
        println!("   Paper trading has not recorded any trades yet, or the path is incorrect.");
        return Ok(());
    }

    let store = TradeStore::new(db_path)?;

    println!("\n📊 Trades recorded: {}", store.trade_count()?);

    let mut fees: Vec<_> = store.fees_by_venue()?.into_iter().collect();
    fees.sort_by(|a, b| a.0.cmp(&b.0));
    println!("\n💰 Fees by venue");
    for (venue, fee) in &fees {
        println!("   ├─ {:<16} ${:.4}", venue, fee);
    }

    let recent = store.recent_trades(limit)?;
    if !recent.is_empty() {
        println!("\n🧾 Recent trades");
        for trade in &recent {
            println!(
                "   {} {:<5} {:<10} {:<4} ${:.2} @ {:.4} (fee ${:.4}, spread {:.6})",
                trade.timestamp.format("%Y-%m-%d %H:%M:%S"),
                trade.kind,
                trade.connector,
                trade.side,
                trade.size_usd,
                trade.price,
                trade.fee,
                trade.spread,
            );
        }
    }

    Ok(())
}
