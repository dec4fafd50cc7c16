//! Tick profiling: per-effect and whole-tick timing counters.
//!
//! The scheduler records into a [`Profiler`] after every effect call. The
//! counters are a pure side channel; nothing in the pipeline reads them.
//! [`Profiler::snapshot`] copies them out for callers, and
//! [`Profiler::prof_tick`] logs the most expensive effects periodically.

use std::time::{Duration, Instant};

/// How many ticks between profile reports.
pub const REPORT_INTERVAL_TICKS: u64 = 20 * 60;

/// Entries shown in a periodic report.
const MAX_BEST: usize = 5;

/// Running counters for one timed unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectMetrics {
    pub name: &'static str,
    pub calls: u64,
    pub failures: u64,
    pub total: Duration,
    pub max: Duration,
    /// Domain count reported by the effect, e.g. NPCs moved.
    pub processed: u64,
    pub last_error: Option<String>,
}

impl EffectMetrics {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    /// Mean call duration; zero before the first call.
    pub fn average(&self) -> Duration {
        match u32::try_from(self.calls) {
            Ok(0) => Duration::ZERO,
            Ok(calls) => self.total / calls,
            Err(_) => Duration::from_secs_f64(self.total.as_secs_f64() / self.calls as f64),
        }
    }

    fn record(&mut self, elapsed: Duration) {
        self.calls += 1;
        self.total += elapsed;
        self.max = self.max.max(elapsed);
    }
}

/// Read-only copy of everything the scheduler measured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerMetrics {
    /// Whole-pipeline timings; `failures` counts ticks with any failed effect.
    pub tick: EffectMetrics,
    /// One entry per effect, in pipeline order.
    pub effects: Vec<EffectMetrics>,
    /// Ticks dropped because the pipeline overran its interval.
    pub skipped_ticks: u64,
}

impl SchedulerMetrics {
    pub fn effect(&self, name: &str) -> Option<&EffectMetrics> {
        self.effects.iter().find(|m| m.name == name)
    }
}

#[derive(Debug)]
pub struct Profiler {
    tick: EffectMetrics,
    effects: Vec<EffectMetrics>,
    skipped_ticks: u64,
    tick_counter: u64,
}

impl Profiler {
    pub fn new(effect_names: &[&'static str]) -> Self {
        Self {
            tick: EffectMetrics::new("tick"),
            effects: effect_names.iter().map(|n| EffectMetrics::new(n)).collect(),
            skipped_ticks: 0,
            tick_counter: 0,
        }
    }

    #[inline]
    pub fn prof_start(&self) -> Instant {
        Instant::now()
    }

    /// Record one effect call. Out-of-range slots are ignored.
    pub fn prof_stop(&mut self, slot: usize, start: Instant, outcome: Result<usize, String>) {
        let elapsed = start.elapsed();
        let Some(metrics) = self.effects.get_mut(slot) else {
            return;
        };
        metrics.record(elapsed);
        match outcome {
            Ok(processed) => metrics.processed += processed as u64,
            Err(e) => {
                metrics.failures += 1;
                metrics.last_error = Some(e);
            }
        }
    }

    /// Record the whole pipeline pass.
    pub fn tick_stop(&mut self, start: Instant, failed_effects: usize) {
        self.tick.record(start.elapsed());
        if failed_effects > 0 {
            self.tick.failures += 1;
        }
    }

    pub fn add_skipped(&mut self, ticks: u64) {
        self.skipped_ticks += ticks;
    }

    pub fn snapshot(&self) -> SchedulerMetrics {
        SchedulerMetrics {
            tick: self.tick.clone(),
            effects: self.effects.clone(),
            skipped_ticks: self.skipped_ticks,
        }
    }

    /// Called once per tick; logs a report every [`REPORT_INTERVAL_TICKS`].
    pub fn prof_tick(&mut self) {
        self.tick_counter += 1;
        if self.tick_counter < REPORT_INTERVAL_TICKS {
            return;
        }
        self.tick_counter = 0;
        self.log_report();
    }

    /// Log the most expensive effects by cumulative time.
    pub fn log_report(&self) {
        let mut best: Vec<&EffectMetrics> = self.effects.iter().filter(|m| m.calls > 0).collect();
        best.sort_by(|a, b| b.total.cmp(&a.total));

        log::info!(
            "Tick profile: {} ticks, avg {:.2?}, max {:.2?}, {} skipped",
            self.tick.calls,
            self.tick.average(),
            self.tick.max,
            self.skipped_ticks
        );
        let tick_total = self.tick.total.as_secs_f64().max(f64::EPSILON);
        for m in best.into_iter().take(MAX_BEST) {
            log::info!(
                "  {:20.20} {:6.2}% avg {:.2?} max {:.2?} failures {}",
                m.name,
                100.0 * m.total.as_secs_f64() / tick_total,
                m.average(),
                m.max,
                m.failures
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_calls_failures_and_processed() {
        let mut profiler = Profiler::new(&["a", "b"]);
        let start = profiler.prof_start();
        profiler.prof_stop(0, start, Ok(3));
        profiler.prof_stop(0, start, Ok(2));
        profiler.prof_stop(1, start, Err("boom".into()));

        let snapshot = profiler.snapshot();
        let a = snapshot.effect("a").unwrap();
        assert_eq!((a.calls, a.processed, a.failures), (2, 5, 0));
        let b = snapshot.effect("b").unwrap();
        assert_eq!((b.calls, b.failures), (1, 1));
        assert_eq!(b.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn average_of_nothing_is_zero() {
        assert_eq!(EffectMetrics::new("x").average(), Duration::ZERO);
    }

    #[test]
    fn average_divides_total() {
        let mut m = EffectMetrics::new("x");
        m.record(Duration::from_millis(2));
        m.record(Duration::from_millis(4));
        assert_eq!(m.average(), Duration::from_millis(3));
        assert_eq!(m.max, Duration::from_millis(4));
    }

    #[test]
    fn unknown_slot_is_ignored() {
        let mut profiler = Profiler::new(&["a"]);
        let start = profiler.prof_start();
        profiler.prof_stop(7, start, Ok(1));
        assert_eq!(profiler.snapshot().effects[0].calls, 0);
    }

    /// Tick failures count ticks, not failed effects.
    #[test]
    fn tick_failures_count_ticks() {
        let mut profiler = Profiler::new(&[]);
        let start = profiler.prof_start();
        profiler.tick_stop(start, 2);
        profiler.tick_stop(start, 0);
        let tick = profiler.snapshot().tick;
        assert_eq!((tick.calls, tick.failures), (2, 1));
    }
}
