//! Fixed-period tick driver.
//!
//! Every tick runs the effect pipeline once, in declaration order. A failing
//! effect, whether it returns `Err` or panics, is recorded and the pipeline
//! carries on with the next one. Timing goes to the [`Profiler`] and never
//! feeds back into execution.
//!
//! # Overruns
//!
//! The scheduler is not reentrant: a tick always finishes before the next one
//! starts. When a pass takes longer than the period, [`OverrunPolicy`]
//! decides what happens to the ticks that came due meanwhile.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::effects::{Effect, EffectContext};
use crate::network_manager::MessageSender;
use crate::profiling::{Profiler, SchedulerMetrics};
use crate::world::World;

/// What to do with ticks that came due while a pass was still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverrunPolicy {
    /// Drop them and resume on the next period boundary.
    #[default]
    Skip,
    /// Run them back to back until caught up.
    Queue,
}

impl OverrunPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "skip" => Some(OverrunPolicy::Skip),
            "queue" | "burst" => Some(OverrunPolicy::Queue),
            _ => None,
        }
    }

    fn missed_tick_behavior(self) -> MissedTickBehavior {
        match self {
            OverrunPolicy::Skip => MissedTickBehavior::Skip,
            OverrunPolicy::Queue => MissedTickBehavior::Burst,
        }
    }
}

/// Outcome of one pipeline pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub elapsed: Duration,
    /// Names of effects that failed this tick.
    pub failed: Vec<&'static str>,
}

pub struct TickScheduler {
    world: Arc<World>,
    sender: Arc<dyn MessageSender>,
    effects: Vec<Arc<dyn Effect>>,
    period: Duration,
    policy: OverrunPolicy,
    ticker: AtomicU64,
    profiler: Mutex<Profiler>,
}

impl TickScheduler {
    pub fn new(
        world: Arc<World>,
        sender: Arc<dyn MessageSender>,
        effects: Vec<Arc<dyn Effect>>,
        period: Duration,
        policy: OverrunPolicy,
    ) -> Self {
        let names: Vec<&'static str> = effects.iter().map(|e| e.name()).collect();
        Self {
            world,
            sender,
            effects,
            period: period.max(Duration::from_millis(1)),
            policy,
            ticker: AtomicU64::new(0),
            profiler: Mutex::new(Profiler::new(&names)),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn policy(&self) -> OverrunPolicy {
        self.policy
    }

    /// Ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.ticker.load(Ordering::Relaxed)
    }

    pub fn metrics(&self) -> SchedulerMetrics {
        self.profiler
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .snapshot()
    }

    /// Run every effect once, in order.
    pub fn run_tick(&self) -> TickReport {
        let tick = self.ticker.fetch_add(1, Ordering::Relaxed) + 1;
        let ctx = EffectContext {
            tick,
            world: &self.world,
            sender: self.sender.as_ref(),
        };

        let tick_start = Instant::now();
        let mut failed = Vec::new();
        for (slot, effect) in self.effects.iter().enumerate() {
            let start = Instant::now();
            let outcome = match panic::catch_unwind(AssertUnwindSafe(|| effect.apply(&ctx))) {
                Ok(result) => result,
                Err(payload) => Err(format!("panicked: {}", panic_message(payload.as_ref()))),
            };

            if let Err(e) = &outcome {
                log::error!("Effect {} failed on tick {tick}: {e}", effect.name());
                failed.push(effect.name());
            }

            self.profiler
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .prof_stop(slot, start, outcome);
        }

        let elapsed = tick_start.elapsed();
        let mut profiler = self.profiler.lock().unwrap_or_else(|e| e.into_inner());
        profiler.tick_stop(tick_start, failed.len());
        profiler.prof_tick();

        TickReport {
            tick,
            elapsed,
            failed,
        }
    }

    /// Start ticking on the current tokio runtime.
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let (stop_tx, stop_rx) = oneshot::channel();
        let scheduler = Arc::clone(&self);
        let join = tokio::spawn(async move { scheduler.run(stop_rx).await });
        log::info!(
            "Tick scheduler started: period {:?}, overrun policy {:?}, {} effects",
            self.period,
            self.policy,
            self.effects.len()
        );
        SchedulerHandle {
            scheduler: self,
            stop_tx: Some(stop_tx),
            join: Some(join),
        }
    }

    async fn run(&self, mut stop_rx: oneshot::Receiver<()>) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(self.policy.missed_tick_behavior());

        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = interval.tick() => {
                    let report = self.run_tick();
                    self.note_overrun(&report);
                }
            }
        }
        log::info!("Tick scheduler stopped after {} ticks", self.ticks());
    }

    fn note_overrun(&self, report: &TickReport) {
        if report.elapsed <= self.period {
            return;
        }
        let behind = (report.elapsed.as_nanos() / self.period.as_nanos()) as u64;
        match self.policy {
            OverrunPolicy::Skip => {
                self.profiler
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .add_skipped(behind);
                log::warn!(
                    "Tick {} took {:.2?}; skipping {behind} ticks",
                    report.tick,
                    report.elapsed
                );
            }
            OverrunPolicy::Queue => {
                log::warn!(
                    "Tick {} took {:.2?}; {behind} ticks queued",
                    report.tick,
                    report.elapsed
                );
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Running scheduler. Dropping the handle also stops the task, but only
/// [`SchedulerHandle::stop`] waits for it.
pub struct SchedulerHandle {
    scheduler: Arc<TickScheduler>,
    stop_tx: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn metrics(&self) -> SchedulerMetrics {
        self.scheduler.metrics()
    }

    pub fn scheduler(&self) -> &Arc<TickScheduler> {
        &self.scheduler
    }

    /// Stop after the current tick and wait for the task to finish.
    pub async fn stop(mut self) -> SchedulerMetrics {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                log::error!("Tick scheduler task failed: {e}");
            }
        }
        let metrics = self.scheduler.metrics();
        self.scheduler
            .profiler
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .log_report();
        metrics
    }
}

// ---------------------------------------------------------------------------
//  Unit Tests
// ---------------------------------------------------------------------------
