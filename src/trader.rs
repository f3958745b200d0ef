use crate::config::BotConfig;
use crate::execution::{
    BuyOutcome, ExecutionGateway, Executor, MarketData, Position, PositionManager, SellOutcome,
};
use crate::notifications::{messages, Notifier};
use crate::persistence::{Snapshot, SnapshotStore};
use crate::risk::Watchdog;
use crate::strategy::signals::validate_window_order;
use crate::strategy::{evaluate_exit, EntrySignal, ExitConfig, ExitReason, MomentumStrategy, Strategy};
use crate::{BotError, Result};
use chrono::Utc;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Result of the startup liquidation step
#[derive(Debug, Clone, PartialEq)]
pub enum StartupOutcome {
    /// Flag already set on a previous run
    AlreadyDone,
    /// No base asset held; flag set without an order
    NothingToSell,
    Sold { price: f64, qty: f64 },
    /// Balance too small to trade; flag left unset
    NotPlaced { base_balance: f64 },
    /// A collaborator failed; flag left unset so the next start retries
    Failed(String),
}

/// What a single iteration of the loop did
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    NotEnoughCandles(usize),
    /// Newest closed candle already evaluated
    NoNewCandle,
    NoSignal,
    Bought { price: f64, qty: f64 },
    /// Entry signal but no order placed
    BuySkipped,
    Holding { price: f64, peak_price: f64 },
    Sold {
        reason: ExitReason,
        entry_price: f64,
        exit_price: f64,
        qty: f64,
    },
    /// Exit signal but the exchange shows no base holdings
    Desync { entry_price: f64 },
    /// Exit signal but the base balance is below the tradable minimum
    SellNotPlaced { base_balance: f64 },
}

/// Ctrl+C listener whose OS handler is installed by [`ShutdownSignal::install`]
///
/// Created before startup so an interrupt during startup or the first tick is
/// held until the loop can shut down gracefully.
pub struct ShutdownSignal {
    ctrl_c: Pin<Box<dyn Future<Output = std::io::Result<()>>>>,
    received: bool,
}

impl ShutdownSignal {
    pub async fn install() -> Self {
        let mut ctrl_c: Pin<Box<dyn Future<Output = std::io::Result<()>>>> =
            Box::pin(tokio::signal::ctrl_c());

        // The handler is registered on the first poll
        let received = match poll_once(&mut ctrl_c).await {
            Some(Err(e)) => {
                tracing::error!("Unable to listen for shutdown signal: {}", e);
                true
            }
            Some(Ok(())) => true,
            None => false,
        };

        Self { ctrl_c, received }
    }

    /// Resolve once Ctrl+C has been pressed
    pub async fn recv(&mut self) {
        if self.received {
            return;
        }
        if let Err(e) = (&mut self.ctrl_c).await {
            tracing::error!("Unable to listen for shutdown signal: {}", e);
        }
        self.received = true;
    }
}

/// Poll `future` once without waiting for it
async fn poll_once<F: Future + Unpin>(future: &mut F) -> Option<F::Output> {
    tokio::select! {
        biased;
        output = future => Some(output),
        _ = std::future::ready(()) => None,
    }
}

/// Single-pair polling trader
///
/// Owns the position exclusively. Every state transition happens after the
/// collaborator call that justifies it has returned successfully, and is
/// followed by a snapshot save.
pub struct Trader<M, G, S, N> {
    market: M,
    gateway: G,
    store: S,
    notifier: N,
    strategy: MomentumStrategy,
    exit_config: ExitConfig,
    executor: Executor,
    positions: PositionManager,
    watchdog: Watchdog,
    timeframe: String,
    candle_limit: usize,
    loop_interval: Duration,
    last_candle_time: Option<i64>,
    /// Set once the operator was told a sell could not be placed
    stuck_sell_reported: bool,
}

impl<M, G, S, N> Trader<M, G, S, N>
where
    M: MarketData,
    G: ExecutionGateway,
    S: SnapshotStore,
    N: Notifier,
{
    pub fn new(config: &BotConfig, market: M, gateway: G, store: S, notifier: N) -> Self {
        Self {
            market,
            gateway,
            store,
            notifier,
            strategy: MomentumStrategy::new(config.entry.clone()),
            exit_config: config.exit.clone(),
            executor: Executor::new(&config.symbol, &config.base_asset, &config.quote_asset),
            positions: PositionManager::new(),
            watchdog: Watchdog::new(config.watchdog_threshold, Instant::now()),
            timeframe: config.timeframe.clone(),
            candle_limit: config.candle_limit,
            loop_interval: config.loop_interval,
            last_candle_time: None,
            stuck_sell_reported: false,
        }
    }

    pub fn position(&self) -> Position {
        self.positions.position()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.positions.snapshot()
    }

    pub fn watchdog(&self) -> &Watchdog {
        &self.watchdog
    }

    /// Restore state, announce the start, liquidate leftovers on first run
    pub async fn startup(&mut self) -> StartupOutcome {
        let snapshot = match self.store.load().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!("❌ Failed to load state, starting from defaults: {}", e);
                Snapshot::default()
            }
        };
        self.positions = PositionManager::from_snapshot(&snapshot);

        self.notifier
            .notify(&messages::started(
                self.executor.symbol(),
                self.positions.first_run_sell_done(),
            ))
            .await;

        let outcome = match self.startup_sell_if_needed().await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("❌ Error during startup sell: {}", e);
                StartupOutcome::Failed(e.to_string())
            }
        };

        tracing::info!(
            "📋 Initial state: {:?}, FIRST_RUN_SELL_DONE={}",
            self.positions.position(),
            self.positions.first_run_sell_done()
        );
        // Fresh liveness baseline once startup I/O is done
        self.watchdog.record_activity(Instant::now());

        outcome
    }

    async fn startup_sell_if_needed(&mut self) -> Result<StartupOutcome> {
        if self.positions.first_run_sell_done() {
            tracing::info!("FIRST_RUN_SELL_DONE already set, skipping startup sell");
            return Ok(StartupOutcome::AlreadyDone);
        }

        match self.executor.sell_all(&self.gateway).await? {
            SellOutcome::NoHoldings => {
                tracing::info!("Startup: no {} balance to sell", self.executor.base_asset());
                self.positions.mark_first_run_sell_done();
                self.persist().await;
                Ok(StartupOutcome::NothingToSell)
            }
            SellOutcome::NotPlaced { base_balance } => {
                tracing::warn!(
                    "Startup sell not placed for {:.6} {} (below tradable minimum)",
                    base_balance,
                    self.executor.base_asset()
                );
                Ok(StartupOutcome::NotPlaced { base_balance })
            }
            SellOutcome::Filled { fill, base_balance } => {
                let price = fill.average_price().unwrap_or(0.0);
                let qty = fill.executed_qty;
                tracing::info!(
                    "🔁 Startup sell completed: order={}, {:.6} of {:.6} {} @ {:.4}",
                    fill.order_id,
                    qty,
                    base_balance,
                    self.executor.base_asset(),
                    price
                );

                self.positions.mark_first_run_sell_done();
                let previous = self.positions.force_flat();
                if previous.is_open() {
                    tracing::info!("Startup sell closed the stored position {:?}", previous);
                }
                self.persist().await;

                self.notifier
                    .notify(&messages::startup_sell(
                        self.executor.base_asset(),
                        self.executor.quote_asset(),
                        price,
                        qty,
                        fill.total_commission(),
                    ))
                    .await;

                Ok(StartupOutcome::Sold { price, qty })
            }
        }
    }

    /// One loop iteration against the current position
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        match self.positions.position() {
            Position::Flat => self.tick_flat().await,
            Position::Open {
                entry_price,
                peak_price,
            } => self.tick_open(entry_price, peak_price).await,
        }
    }

    async fn tick_flat(&mut self) -> Result<TickOutcome> {
        let candles = self
            .market
            .get_candles(self.executor.symbol(), &self.timeframe, self.candle_limit)
            .await?;
        self.watchdog.record_activity(Instant::now());

        let Some(last) = candles.last() else {
            return Ok(TickOutcome::NotEnoughCandles(0));
        };
        if candles.len() < self.strategy.min_candles_required() {
            tracing::warn!("Not enough candles ({}), waiting...", candles.len());
            return Ok(TickOutcome::NotEnoughCandles(candles.len()));
        }

        if self.last_candle_time == Some(last.open_time) {
            tracing::debug!("No new candle yet, waiting...");
            return Ok(TickOutcome::NoNewCandle);
        }

        validate_window_order(&candles).map_err(|e| BotError::DataUnavailable(e.to_string()))?;
        self.last_candle_time = Some(last.open_time);

        let signal = self.strategy.evaluate(&candles);
        if !signal.enter {
            return Ok(TickOutcome::NoSignal);
        }

        self.enter(&signal).await
    }

    async fn enter(&mut self, signal: &EntrySignal) -> Result<TickOutcome> {
        match self.executor.buy(&self.market, &self.gateway).await? {
            BuyOutcome::Filled {
                fill,
                price,
                quote_balance,
            } => {
                self.positions
                    .open(price)
                    .map_err(|e| BotError::Exchange(format!("Cannot open position: {}", e)))?;
                self.persist().await;

                let qty = fill.executed_qty;
                tracing::info!(
                    "💰 BUY EXECUTED: {} {:.6} @ {:.4} (spent {:.2} {}), order={}",
                    self.executor.symbol(),
                    qty,
                    price,
                    quote_balance,
                    self.executor.quote_asset(),
                    fill.order_id
                );

                self.notifier
                    .notify(&messages::buy(
                        self.executor.symbol(),
                        price,
                        qty,
                        signal,
                        Utc::now(),
                    ))
                    .await;

                Ok(TickOutcome::Bought { price, qty })
            }
            BuyOutcome::NoBalance => {
                tracing::warn!(
                    "Buy signal but insufficient {} balance",
                    self.executor.quote_asset()
                );
                Ok(TickOutcome::BuySkipped)
            }
            BuyOutcome::NotPlaced => {
                tracing::warn!("Buy signal but order execution returned nothing");
                Ok(TickOutcome::BuySkipped)
            }
        }
    }

    async fn tick_open(&mut self, entry_price: f64, peak_price: f64) -> Result<TickOutcome> {
        let price = self.market.get_price(self.executor.symbol()).await?;
        self.watchdog.record_activity(Instant::now());

        let mut peak_price = peak_price;
        if self.positions.observe_price(price) {
            peak_price = price;
            tracing::debug!("New peak: {:.4}", peak_price);
            self.persist().await;
        }

        let signal = evaluate_exit(price, entry_price, peak_price, &self.exit_config);
        if !signal.should_exit {
            return Ok(TickOutcome::Holding { price, peak_price });
        }

        self.exit(signal.reason, price, entry_price, peak_price).await
    }

    async fn exit(
        &mut self,
        reason: ExitReason,
        price: f64,
        entry_price: f64,
        peak_price: f64,
    ) -> Result<TickOutcome> {
        match self.executor.sell_all(&self.gateway).await? {
            SellOutcome::Filled { fill, .. } => {
                self.stuck_sell_reported = false;
                let exit_price = fill.price_or(price);
                let qty = fill.executed_qty;
                self.positions
                    .close()
                    .map_err(|e| BotError::Exchange(format!("Cannot close position: {}", e)))?;
                self.persist().await;

                let report = messages::SellReport {
                    symbol: self.executor.symbol(),
                    reason,
                    entry_price,
                    exit_price,
                    peak_price,
                    qty,
                };
                tracing::info!(
                    "📉 EXIT {}: reason={}, entry={:.4}, exit={:.4}, pnl={:+.2}%, max_profit={:.2}%",
                    report.symbol,
                    reason,
                    entry_price,
                    exit_price,
                    report.pnl_pct(),
                    report.max_profit_pct()
                );
                self.notifier.notify(&messages::sell(&report)).await;

                Ok(TickOutcome::Sold {
                    reason,
                    entry_price,
                    exit_price,
                    qty,
                })
            }
            SellOutcome::NoHoldings => {
                self.stuck_sell_reported = false;
                tracing::error!(
                    "Sell signal but {} balance is 0 - possible desync of holding flag",
                    self.executor.base_asset()
                );
                self.positions.force_flat();
                self.persist().await;

                self.notifier
                    .notify(&messages::desync(
                        self.executor.base_asset(),
                        self.executor.symbol(),
                        entry_price,
                    ))
                    .await;

                Ok(TickOutcome::Desync { entry_price })
            }
            SellOutcome::NotPlaced { base_balance } => {
                if self.stuck_sell_reported {
                    tracing::warn!(
                        "Sell signal but order not placed for {:.6} {}",
                        base_balance,
                        self.executor.base_asset()
                    );
                } else {
                    tracing::error!(
                        "Sell signal but {:.6} {} is below the tradable minimum, position stays open",
                        base_balance,
                        self.executor.base_asset()
                    );
                    self.notifier
                        .notify(&messages::sell_not_placed(
                            self.executor.base_asset(),
                            self.executor.symbol(),
                            base_balance,
                            reason,
                        ))
                        .await;
                    self.stuck_sell_reported = true;
                }
                Ok(TickOutcome::SellNotPlaced { base_balance })
            }
        }
    }

    /// Send the inactivity alert if due at `now`
    ///
    /// Returns `true` when an alert was due (whether or not delivery worked).
    pub async fn check_watchdog_at(&mut self, now: Instant) -> bool {
        let Some(inactive) = self.watchdog.check(now) else {
            return false;
        };

        let minutes = inactive.as_secs() / 60;
        tracing::warn!("⏰ Watchdog: no activity for {} minutes", minutes);
        self.notifier.notify(&messages::watchdog(minutes)).await;
        true
    }

    /// Tick, handle its failure at the loop boundary, then check liveness
    pub async fn run_once(&mut self) -> Option<TickOutcome> {
        let outcome = match self.tick().await {
            Ok(outcome) => {
                tracing::debug!("Tick: {:?}", outcome);
                Some(outcome)
            }
            Err(e @ BotError::DataUnavailable(_)) => {
                tracing::warn!("⚠️  Market data unavailable, skipping tick: {}", e);
                self.notifier.notify(&messages::error(&e)).await;
                None
            }
            Err(e) => {
                tracing::error!("❌ Error in main loop: {}", e);
                self.notifier.notify(&messages::error(&e)).await;
                None
            }
        };

        self.check_watchdog_at(Instant::now()).await;
        outcome
    }

    /// Poll until `shutdown` resolves, then save state and say goodbye
    ///
    /// A shutdown that resolved before the call skips the loop entirely.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        if poll_once(&mut shutdown).await.is_some() {
            tracing::info!("🛑 Shutdown requested before the first tick");
            self.shutdown().await;
            return;
        }

        tracing::info!(
            "🔄 Entering main trading loop: {} on {} {}, every {:?}",
            self.strategy.name(),
            self.executor.symbol(),
            self.timeframe,
            self.loop_interval
        );

        loop {
            self.run_once().await;

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("🛑 Shutdown signal received");
                    break;
                }
                _ = sleep(self.loop_interval) => {}
            }
        }

        self.shutdown().await;
    }

    async fn shutdown(&mut self) {
        self.persist().await;
        self.notifier
            .notify(&messages::stopped(
                self.executor.symbol(),
                self.positions.is_open(),
            ))
            .await;
        tracing::info!("👋 Bot stopped by user");
    }

    async fn persist(&mut self) {
        let snapshot = self.positions.snapshot();
        if let Err(e) = self.store.save(&snapshot).await {
            tracing::error!("❌ Failed to save state: {}", e);
        }
    }
}
