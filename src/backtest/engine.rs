//! Backtesting simulation engine.
//!
//! Replays aligned historical prices through the strategy engine against two
//! simulated venues. Time is driven by the data, not the wall clock.

use super::align::{align_nearest, AlignedSample};
use super::data::PriceSeries;
use super::metrics::BacktestMetrics;
use crate::clock::{Clock, ManualClock};
use crate::config::Config;
use crate::exchange::{Position, VenueAdapter, VenueSimulator};
use crate::persistence::CsvTradeLog;
use crate::strategy::{StrategyEngine, StrategyEvent, TracingSink};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// End-of-run state of one simulated venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueReport {
    pub venue: String,
    pub starting_balance: Decimal,
    pub balance: Decimal,
    pub position: Position,
    pub total_fees: Decimal,
    pub order_count: u64,
}

impl VenueReport {
    async fn capture(simulator: &VenueSimulator, pair: &str) -> Self {
        let state = simulator.get_state().await;
        Self {
            venue: simulator.venue_id(),
            starting_balance: state.starting_balance,
            balance: state.balance,
            position: state.position(pair),
            total_fees: state.total_fees,
            order_count: state.order_count,
        }
    }
}

/// Complete result of a backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub events: Vec<StrategyEvent>,
    pub metrics: BacktestMetrics,
    pub venue_a: VenueReport,
    pub venue_b: VenueReport,
    pub samples_processed: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl BacktestResult {
    /// Write every event as a pretty-printed JSON array.
    pub fn events_to_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(file, &self.events)?;
        Ok(())
    }

    /// Append every fill to a CSV trade log.
    pub fn write_trade_log<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        let log = CsvTradeLog::new(path);
        let mut rows = 0;
        for event in &self.events {
            rows += log.append(event)?;
        }
        Ok(rows)
    }

    /// Get a summary string.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "{}\n\nBacktest Period: {} to {}\nSamples: {}",
            self.metrics.summary(),
            self.start_time.format("%Y-%m-%d %H:%M:%S"),
            self.end_time.format("%Y-%m-%d %H:%M:%S"),
            self.samples_processed,
        );
        for report in [&self.venue_a, &self.venue_b] {
            out.push_str(&format!(
                "\n{}: balance ${:.4} (start ${:.2}), position {} ${:.2}",
                report.venue,
                report.balance,
                report.starting_balance,
                report.position.side,
                report.position.notional,
            ));
        }
        out
    }
}

/// The backtesting simulation engine.
pub struct BacktestEngine {
    config: Config,
}

impl BacktestEngine {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Load and align the two configured historical CSV files.
    pub fn load_aligned(&self) -> Result<Vec<AlignedSample>> {
        let (csv_a, csv_b) = self.config.validate_backtest()?;

        let series_a = PriceSeries::from_csv_file(csv_a)?;
        let series_b = PriceSeries::from_csv_file(csv_b)?;
        info!(
            rows_a = series_a.len(),
            rows_b = series_b.len(),
            "Historical data loaded"
        );

        Ok(align_nearest(&series_a, &series_b))
    }

    /// Replay aligned samples in order.
    ///
    /// Each row sets both simulators' reference prices and the replay clock,
    /// then runs one strategy step.
    pub async fn run(&self, samples: &[AlignedSample]) -> Result<BacktestResult> {
        self.config.validate()?;
        let (first, last) = match (samples.first(), samples.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => anyhow::bail!("No aligned samples to replay"),
        };

        let clock = Arc::new(ManualClock::new(first.timestamp));
        let replay_clock: Arc<dyn Clock> = clock.clone();

        let venue_a = Arc::new(self.config.build_simulator(
            &self.config.connector_a,
            first.price_a,
            replay_clock.clone(),
            0,
        ));
        let venue_b = Arc::new(self.config.build_simulator(
            &self.config.connector_b,
            first.price_b,
            replay_clock.clone(),
            1,
        ));

        let mut engine = StrategyEngine::new(
            self.config.strategy_config(),
            venue_a.clone(),
            venue_b.clone(),
        )
        .with_clock(replay_clock)
        .with_sink(Arc::new(TracingSink));

        info!(
            samples = samples.len(),
            start = %first.timestamp,
            end = %last.timestamp,
            "Starting backtest replay"
        );

        let mut events = Vec::new();
        for (i, sample) in samples.iter().enumerate() {
            venue_a.set_price(sample.price_a).await;
            venue_b.set_price(sample.price_b).await;
            clock.set(sample.timestamp);

            if let Some(event) = engine
                .step()
                .await
                .with_context(|| format!("Strategy step failed at {}", sample.timestamp))?
            {
                events.push(event);
            }

            if (i + 1) % 10_000 == 0 {
                debug!(processed = i + 1, events = events.len(), "Replay progress");
            }
        }

        let pair = self.config.pair.as_str();
        let result = BacktestResult {
            metrics: BacktestMetrics::from_events(&events),
            events,
            venue_a: VenueReport::capture(&venue_a, pair).await,
            venue_b: VenueReport::capture(&venue_b, pair).await,
            samples_processed: samples.len(),
            start_time: first.timestamp,
            end_time: last.timestamp,
        };

        info!(
            events = result.events.len(),
            fees = %result.metrics.total_fees,
            "Backtest complete"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::PositionSide;
    use crate::strategy::EventKind;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn config() -> Config {
        Config {
            pair: "BTC-PERP".to_string(),
            connector_a: "mock_a".to_string(),
            connector_b: "mock_b".to_string(),
            price_noise: false,
            ..Default::default()
        }
    }

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn sample(secs: i64, price_a: Decimal, price_b: Decimal) -> AlignedSample {
        AlignedSample {
            timestamp: t(secs),
            price_a,
            price_b,
        }
    }

    #[tokio::test]
    async fn test_open_then_close_round_trip() {
        let samples = vec![
            sample(0, dec!(101), dec!(99)),
            // Converged but still cooling down
            sample(30, dec!(100), dec!(100)),
            sample(60, dec!(100), dec!(100)),
            sample(90, dec!(101), dec!(99)),
        ];

        let result = BacktestEngine::new(config()).run(&samples).await.unwrap();

        assert_eq!(result.samples_processed, 4);
        assert_eq!(result.events.len(), 2);
        assert_eq!(result.events[0].kind, EventKind::Open);
        assert_eq!(result.events[0].timestamp, t(0));
        assert_eq!(result.events[1].kind, EventKind::Close);
        assert_eq!(result.events[1].timestamp, t(60));

        for report in [&result.venue_a, &result.venue_b] {
            assert_eq!(report.position.side, PositionSide::Flat);
            assert_eq!(report.order_count, 2);
            assert_eq!(report.total_fees, dec!(0.15));
            assert_eq!(report.balance, dec!(99.85));
        }

        assert_eq!(result.metrics.open_events, 1);
        assert_eq!(result.metrics.close_events, 1);
        assert_eq!(result.start_time, t(0));
        assert_eq!(result.end_time, t(90));
    }

    #[tokio::test]
    async fn test_cooldown_runs_on_replay_time() {
        let wide = |secs| sample(secs, dec!(101), dec!(99));

        let result = BacktestEngine::new(config())
            .run(&[wide(0), wide(1), wide(59)])
            .await
            .unwrap();
        assert_eq!(result.events.len(), 1);

        let result = BacktestEngine::new(config())
            .run(&[wide(0), wide(60), wide(120)])
            .await
            .unwrap();
        assert_eq!(result.events.len(), 3);
        assert_eq!(result.venue_a.position.notional, dec!(300));
        assert_eq!(result.venue_a.position.side, PositionSide::Short);
        assert_eq!(result.venue_b.position.side, PositionSide::Long);
    }

    #[tokio::test]
    async fn test_empty_input_fails() {
        let err = BacktestEngine::new(config()).run(&[]).await.unwrap_err();
        assert!(err.to_string().contains("No aligned samples"));
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_replay() {
        let config = Config {
            pair: String::new(),
            ..config()
        };
        let samples = [sample(0, dec!(101), dec!(99))];
        assert!(BacktestEngine::new(config).run(&samples).await.is_err());
    }

    #[tokio::test]
    async fn test_run_from_csv_files_and_write_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let csv_a = dir.path().join("a.csv");
        let csv_b = dir.path().join("b.csv");
        std::fs::write(
            &csv_a,
            "timestamp,price\n2024-01-01T00:00:00Z,101\n2024-01-01T00:01:00Z,100\n",
        )
        .unwrap();
        std::fs::write(
            &csv_b,
            "timestamp,price\n2024-01-01T00:00:02Z,99\n2024-01-01T00:01:01Z,100\n",
        )
        .unwrap();

        let config = Config {
            historical_csv_a: Some(csv_a.to_string_lossy().into_owned()),
            historical_csv_b: Some(csv_b.to_string_lossy().into_owned()),
            ..config()
        };
        let engine = BacktestEngine::new(config);

        let samples = engine.load_aligned().unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].price_b, dec!(99));

        let result = engine.run(&samples).await.unwrap();
        assert_eq!(result.events.len(), 2);

        let trades = dir.path().join("trades.csv");
        assert_eq!(result.write_trade_log(&trades).unwrap(), 4);
        assert_eq!(std::fs::read_to_string(&trades).unwrap().lines().count(), 5);

        let json = dir.path().join("events.json");
        result.events_to_json(&json).unwrap();
        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
        assert_eq!(parsed[0]["type"], "open");

        assert!(result.summary().contains("Samples: 2"));
    }

    #[test]
    fn test_load_aligned_requires_paths() {
        assert!(BacktestEngine::new(config()).load_aligned().is_err());
    }
}
