use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nyota::config::EngineConfig;
use nyota::domain::repositories::exchange_client::ExchangeClient;
use nyota::domain::repositories::notifier::Notifier;
use nyota::domain::services::indicator_engine::IndicatorEngine;
use nyota::domain::services::market_window::MarketWindow;
use nyota::domain::services::orchestrator::PositionOrchestrator;
use nyota::domain::services::risk_sizer::RiskSizer;
use nyota::domain::services::scheduler::DecisionScheduler;
use nyota::domain::services::signal_scorer::SignalScorer;
use nyota::domain::services::indicators::Candle;
use nyota::infrastructure::log_notifier::LogNotifier;
use nyota::infrastructure::paper_exchange::PaperExchange;

/// Deterministic price walk used to seed and feed the paper venue.
struct SyntheticFeed {
    state: u64,
    price: f64,
}

impl SyntheticFeed {
    fn new(seed: u64, start_price: f64) -> Self {
        SyntheticFeed {
            state: seed,
            price: start_price,
        }
    }

    fn next_unit(&mut self) -> f64 {
        // Plain LCG, plenty for market noise in paper mode.
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.state >> 11) as f64 / (1u64 << 53) as f64
    }

    fn next_candle(&mut self, timestamp: chrono::DateTime<Utc>) -> Candle {
        let open = self.price;
        let drift = (self.next_unit() - 0.48) * 0.004 * open;
        let close = (open + drift).max(open * 0.5);
        let spread = open * 0.001 * (1.0 + self.next_unit());
        let high = open.max(close) + spread;
        let low = (open.min(close) - spread).max(close * 0.5);
        let volume = 800.0 + self.next_unit() * 400.0;
        self.price = close;
        // Values are constructed in range, new() cannot fail here.
        Candle::new(open, high, low, close, volume, timestamp)
            .expect("synthetic candle in valid range")
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nyota=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("CONFIG_FILE").ok().map(PathBuf::from);
    let config = match EngineConfig::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "refusing to start with invalid configuration");
            return Err(err.into());
        }
    };
    info!(
        instruments = config.instruments.len(),
        balance = config.initial_balance,
        interval_secs = config.poll_interval.as_secs(),
        "starting paper trading engine"
    );

    let exchange = Arc::new(PaperExchange::new(config.initial_balance));
    let notifier = Arc::new(LogNotifier::new());

    // Seed each instrument with enough synthetic history for the
    // indicators to be ready on the first cycle, then keep feeding.
    let mut feeds: Vec<(String, SyntheticFeed)> = Vec::new();
    for (index, instrument) in config.instruments.iter().enumerate() {
        let mut feed = SyntheticFeed::new(0x9E3779B9 + index as u64, 100.0 * (index + 1) as f64);
        let start = Utc::now() - ChronoDuration::seconds((config.candle_retention * 60) as i64);
        let history: Vec<Candle> = (0..config.candle_retention)
            .map(|i| feed.next_candle(start + ChronoDuration::minutes(i as i64)))
            .collect();
        exchange.load_history(&instrument.symbol, history);
        feeds.push((instrument.symbol.clone(), feed));
    }

    let feeder_exchange = Arc::clone(&exchange);
    let feed_interval = config.poll_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(feed_interval);
        loop {
            interval.tick().await;
            for (symbol, feed) in feeds.iter_mut() {
                feeder_exchange.push_candle(symbol, feed.next_candle(Utc::now()));
            }
        }
    });

    let orchestrator = PositionOrchestrator::new(
        Arc::clone(&exchange) as Arc<dyn ExchangeClient>,
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        config.submit_timeout,
    );
    let mut scheduler = DecisionScheduler::new(
        exchange as Arc<dyn ExchangeClient>,
        notifier as Arc<dyn Notifier>,
        orchestrator,
        IndicatorEngine::new(config.indicators.clone()),
        SignalScorer::new(config.scorer.clone()),
        RiskSizer::new(config.risk.clone()),
        config.mode_table.clone(),
        config.instruments.clone(),
        MarketWindow::new(config.candle_retention),
        config.scheduler_config(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let engine = tokio::spawn(async move {
        scheduler.run(shutdown_rx).await;
    });

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, shutting down");
    let _ = shutdown_tx.send(true);
    engine.await?;
    Ok(())
}
