//! Auto-Scanner (§4.L).
//!
//! Periodic tick: for every configured symbol, assemble the indicator
//! bundle(s) its enabled strategies need, fan those strategies out across a
//! bounded rayon pool, and dispatch any emitted decision through the
//! cooldown gate, the detection store, the grade tracker, and the
//! broadcaster. Grounded on the teacher's `main.rs` periodic
//! `tokio::spawn` + `tokio::time::interval` poller shape, with the
//! strategy fan-out itself borrowed from the worker-pool pattern rayon is
//! used for elsewhere in the pack.

use crate::broadcaster::Broadcaster;
use crate::detection_store::DetectionStore;
use crate::gates::cooldown::CooldownTracker;
use crate::grade_tracker::GradeTracker;
use crate::indicators::assembler::{entry_bar_count, entry_timeframe, preferred_trend_timeframe, TREND_BARS};
use crate::indicators::IndicatorAssembler;
use crate::marketdata::symbols::instrument_for;
use crate::marketdata::MarketDataClient;
use crate::models::{Decision, Grade, Style};
use crate::strategy::{Registry, UserSettings};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info};

pub struct ScannerConfig {
    pub symbols: Vec<String>,
    pub tick_interval: Duration,
    pub min_grade: Grade,
    pub settings: UserSettings,
}

pub struct Scanner {
    client: Arc<MarketDataClient>,
    registry: Arc<Registry>,
    detection_store: Arc<DetectionStore>,
    grade_tracker: Arc<GradeTracker>,
    broadcaster: Arc<Broadcaster>,
    cooldown: parking_lot::Mutex<CooldownTracker>,
    config: ScannerConfig,
    running: AtomicBool,
    shutdown: Notify,
}

impl Scanner {
    pub fn new(
        client: Arc<MarketDataClient>,
        registry: Arc<Registry>,
        detection_store: Arc<DetectionStore>,
        grade_tracker: Arc<GradeTracker>,
        broadcaster: Arc<Broadcaster>,
        config: ScannerConfig,
    ) -> Self {
        Self {
            client,
            registry,
            detection_store,
            grade_tracker,
            broadcaster,
            cooldown: parking_lot::Mutex::new(CooldownTracker::new()),
            config,
            running: AtomicBool::new(false),
            shutdown: Notify::new(),
        }
    }

    /// One full pass over every configured symbol. Returns the number of
    /// decisions dispatched (post-cooldown, pre-grade-filter).
    pub async fn tick(&self) -> usize {
        let started = std::time::Instant::now();
        self.prefetch_batch().await;

        let mut dispatched = 0usize;
        for symbol in &self.config.symbols {
            match self.scan_symbol(symbol).await {
                Ok(n) => dispatched += n,
                Err(detail) => {
                    error!(symbol, %detail, "scan failed for symbol");
                    self.broadcaster.publish_scan_error(symbol.clone(), detail);
                }
            }
        }
        self.broadcaster.publish_scan_completed(self.config.symbols.len(), dispatched);
        metrics::histogram!("scan_duration_seconds").record(started.elapsed().as_secs_f64());
        metrics::counter!("signals_found_total").increment(dispatched as u64);
        dispatched
    }

    /// Issue one batched market-data fetch covering every configured
    /// symbol and enabled style (§4.L step 2) so the per-symbol assembler
    /// calls that follow hit cache instead of each opening their own wire
    /// round trip. Partial failures are tolerated and simply logged; a
    /// symbol whose prefetch failed falls back to `scan_symbol`'s own
    /// per-request fetch (and its own error handling) a moment later.
    async fn prefetch_batch(&self) {
        let mut requests = Vec::new();
        for symbol in &self.config.symbols {
            for style in [Style::Intraday, Style::Swing] {
                if self.registry.filter_by_style(style).is_empty() {
                    continue;
                }
                requests.push((symbol.clone(), entry_timeframe(style), entry_bar_count(style)));
                requests.push((symbol.clone(), preferred_trend_timeframe(style), TREND_BARS));
            }
        }
        if requests.is_empty() {
            return;
        }

        let results = self.client.fetch_ohlcv_batch(&requests).await;
        let failed = results.values().filter(|r| r.is_err()).count();
        if failed > 0 {
            debug!(failed, total = results.len(), "batch prefetch had partial failures, symbols fall back to per-request fetch");
        }
    }

    async fn scan_symbol(&self, symbol: &str) -> Result<usize, String> {
        let instrument = instrument_for(symbol);
        let mut dispatched = 0usize;

        for style in [Style::Intraday, Style::Swing] {
            let strategies = self.registry.filter_by_style(style);
            if strategies.is_empty() {
                continue;
            }

            let assembler = IndicatorAssembler::new(&self.client);
            let bundle = assembler.assemble(symbol, style).await;
            if !bundle.is_aligned() {
                return Err(format!("indicator alignment invariant violated for {symbol} ({style:?})"));
            }
            if bundle.entry_bars.is_empty() {
                debug!(symbol, ?style, errors = ?bundle.errors, "skipping symbol, no bars fetched");
                continue;
            }

            let settings = self.config.settings.clone();
            let decisions: Vec<Decision> = strategies
                .par_iter()
                .filter_map(|strategy| strategy.analyze(&bundle, &settings, &instrument))
                .collect();

            for decision in decisions {
                if self.dispatch(decision) {
                    dispatched += 1;
                }
            }
        }

        Ok(dispatched)
    }

    /// Apply the cooldown gate, then record/track/broadcast. Returns
    /// `true` if the decision made it past cooldown.
    fn dispatch(&self, decision: Decision) -> bool {
        let now = chrono::Utc::now();
        let blocked = {
            let cooldown = self.cooldown.lock();
            cooldown.is_blocked(&decision.symbol, decision.strategy_style(), decision.direction, decision.grade, now)
        };
        if blocked {
            return false;
        }

        self.cooldown.lock().record(&decision.symbol, decision.strategy_style(), decision.direction, decision.grade, now);

        if let Some(upgrade) = self.grade_tracker.observe(&decision) {
            metrics::counter!("new_signals_total").increment(1);
            self.broadcaster.publish_grade_upgrade(upgrade);
        }

        if let Err(err) = self.detection_store.record(&decision) {
            error!(%err, "failed to persist detection");
        }

        if decision.grade >= self.config.min_grade {
            self.broadcaster.publish_decision(decision);
        }
        true
    }

    /// Idempotent start: a second call while already running is a no-op
    /// and returns `None`.
    pub fn start(self: &Arc<Self>) -> Option<tokio::task::JoinHandle<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            return None;
        }
        let scanner = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut ticker = interval(scanner.config.tick_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let dispatched = scanner.tick().await;
                        info!(dispatched, "scan tick complete");
                    }
                    _ = scanner.shutdown.notified() => {
                        scanner.running.store(false, Ordering::SeqCst);
                        break;
                    }
                }
            }
        }))
    }

    /// Signal the running loop to drain and stop. Idempotent: stopping an
    /// already-stopped scanner is a no-op.
    pub fn stop(&self) {
        if self.running.load(Ordering::SeqCst) {
            self.shutdown.notify_waiters();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

trait DecisionStyleExt {
    fn strategy_style(&self) -> Style;
}

impl DecisionStyleExt for Decision {
    /// The decision record itself doesn't carry `style` — it's derived the
    /// same way [`crate::detection_store`] derives it, off the validity
    /// window width.
    fn strategy_style(&self) -> Style {
        if self.valid_until - self.first_detected > chrono::Duration::minutes(90) {
            Style::Swing
        } else {
            Style::Intraday
        }
    }
}
