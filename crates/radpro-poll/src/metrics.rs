//! Count rate and dose rate derivation
//!
//! The device only reports a monotonically increasing pulse counter. Rates are
//! derived from the difference between consecutive samples, optionally
//! smoothed over a short sliding window.

use std::collections::VecDeque;
use std::time::Duration;

use radpro_protocol::Field;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::client::RawSample;

/// Rates derived from one pulse count sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DerivedMetrics {
    /// Counts per second, rounded to 3 decimals
    pub cps: f64,
    /// Counts per minute, rounded to 1 decimal
    pub cpm: f64,
    /// Dose rate in µSv/h, absent without a usable tube sensitivity
    pub dose_rate: Option<f64>,
}

/// Last accepted pulse count and when it was read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateState {
    pub count: u64,
    pub timestamp: Instant,
}

#[derive(Debug, Clone, Copy)]
struct Interval {
    end: Instant,
    pulses: u64,
    seconds: f64,
}

/// Turns successive pulse count samples into rates
#[derive(Debug)]
pub struct MetricsEngine {
    state: Option<RateState>,
    window: VecDeque<Interval>,
    averaging_window: Duration,
}

impl MetricsEngine {
    /// Engine averaging over `averaging_window`; zero gives instantaneous rates
    pub fn new(averaging_window: Duration) -> Self {
        Self {
            state: None,
            window: VecDeque::new(),
            averaging_window,
        }
    }

    pub fn rate_state(&self) -> Option<RateState> {
        self.state
    }

    /// Forget the baseline, e.g. after switching to another device
    pub fn reset(&mut self) {
        self.state = None;
        self.window.clear();
    }

    /// Feed a pulse count sample
    ///
    /// Returns `None` for the first sample, after a counter reset, and when
    /// the sample is not newer than the previous one.
    pub fn update(&mut self, sample: &RawSample, sensitivity: Option<f64>) -> Option<DerivedMetrics> {
        if sample.field != Field::TubePulseCount {
            return None;
        }
        let count = sample.value.as_count()?;
        let current = RateState {
            count,
            timestamp: sample.timestamp,
        };

        let Some(previous) = self.state else {
            debug!("Baseline pulse count {}", count);
            self.state = Some(current);
            return None;
        };

        let elapsed = sample
            .timestamp
            .checked_duration_since(previous.timestamp)
            .filter(|d| !d.is_zero());
        let Some(elapsed) = elapsed else {
            warn!("Pulse count sample is not newer than the previous one; skipping");
            return None;
        };

        if count < previous.count {
            info!(
                "Pulse counter went from {} to {}; device was reset, rebaselining",
                previous.count, count
            );
            self.window.clear();
            self.state = Some(current);
            return None;
        }

        self.window.push_back(Interval {
            end: sample.timestamp,
            pulses: count - previous.count,
            seconds: elapsed.as_secs_f64(),
        });
        if let Some(cutoff) = sample.timestamp.checked_sub(self.averaging_window) {
            while self.window.len() > 1 && self.window.front().is_some_and(|i| i.end <= cutoff) {
                self.window.pop_front();
            }
        }
        self.state = Some(current);

        let pulses: u64 = self.window.iter().map(|i| i.pulses).sum();
        let seconds: f64 = self.window.iter().map(|i| i.seconds).sum();
        let cps = pulses as f64 / seconds;
        let cpm = cps * 60.0;
        let dose_rate = sensitivity
            .filter(|s| s.is_finite() && *s > 0.0)
            .map(|s| cpm / s);

        Some(DerivedMetrics {
            cps: round_to(cps, 3),
            cpm: round_to(cpm, 1),
            dose_rate,
        })
    }
}

impl Default for MetricsEngine {
    fn default() -> Self {
        Self::new(Duration::from_secs(crate::config::DEFAULT_AVERAGING_WINDOW_S))
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use radpro_protocol::Value;

    fn sample(count: u64, at: Instant) -> RawSample {
        RawSample {
            field: Field::TubePulseCount,
            value: Value::Count(count),
            timestamp: at,
        }
    }

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn test_first_sample_is_baseline() {
        let mut engine = MetricsEngine::new(Duration::ZERO);
        let t0 = Instant::now();
        assert_eq!(engine.update(&sample(1000, t0), Some(153.8)), None);
        assert_eq!(engine.rate_state().map(|s| s.count), Some(1000));
    }

    #[test]
    fn test_rates_from_two_samples() {
        let mut engine = MetricsEngine::new(Duration::ZERO);
        let t0 = Instant::now();
        engine.update(&sample(1000, t0), Some(153.8));

        let m = engine.update(&sample(1005, t0 + secs(1.0)), Some(153.8)).unwrap();
        assert_eq!(m.cps, 5.0);
        assert_eq!(m.cpm, 300.0);
        let dose = m.dose_rate.unwrap();
        assert!((dose - 1.9506).abs() < 1e-3, "dose rate {dose}");
    }

    #[test]
    fn test_no_dose_rate_without_sensitivity() {
        let mut engine = MetricsEngine::new(Duration::ZERO);
        let t0 = Instant::now();
        engine.update(&sample(0, t0), None);

        let m = engine.update(&sample(10, t0 + secs(2.0)), None).unwrap();
        assert_eq!(m.cps, 5.0);
        assert_eq!(m.dose_rate, None);

        let m = engine.update(&sample(20, t0 + secs(4.0)), Some(0.0)).unwrap();
        assert_eq!(m.dose_rate, None);
    }

    #[test]
    fn test_counter_reset_rebaselines() {
        let mut engine = MetricsEngine::new(Duration::ZERO);
        let t0 = Instant::now();
        engine.update(&sample(5000, t0), Some(153.8));

        assert_eq!(engine.update(&sample(3, t0 + secs(1.0)), Some(153.8)), None);
        assert_eq!(engine.rate_state().map(|s| s.count), Some(3));

        let m = engine.update(&sample(13, t0 + secs(3.0)), Some(153.8)).unwrap();
        assert_eq!(m.cps, 5.0);
    }

    #[test]
    fn test_time_glitch_leaves_state_alone() {
        let mut engine = MetricsEngine::new(Duration::ZERO);
        let t0 = Instant::now() + secs(10.0);
        engine.update(&sample(100, t0), None);

        assert_eq!(engine.update(&sample(110, t0), None), None);
        assert_eq!(engine.update(&sample(110, t0 - secs(1.0)), None), None);
        assert_eq!(
            engine.rate_state(),
            Some(RateState {
                count: 100,
                timestamp: t0
            })
        );
    }

    #[test]
    fn test_window_smooths_rates() {
        let mut engine = MetricsEngine::new(Duration::from_secs(5));
        let t0 = Instant::now();
        engine.update(&sample(0, t0), None);

        // 10 cps for one second, then 0 cps for one second
        engine.update(&sample(10, t0 + secs(1.0)), None);
        let m = engine.update(&sample(10, t0 + secs(2.0)), None).unwrap();
        assert_eq!(m.cps, 5.0);

        // Old intervals fall out of the window
        for i in 3..=8 {
            engine.update(&sample(10, t0 + secs(i as f64)), None);
        }
        let m = engine.update(&sample(10, t0 + secs(9.0)), None).unwrap();
        assert_eq!(m.cps, 0.0);
    }

    #[test]
    fn test_reset_forgets_baseline() {
        let mut engine = MetricsEngine::default();
        let t0 = Instant::now();
        engine.update(&sample(1, t0), None);
        engine.reset();
        assert_eq!(engine.rate_state(), None);
        assert_eq!(engine.update(&sample(2, t0 + secs(1.0)), None), None);
    }

    proptest! {
        #[test]
        fn rates_are_consistent(
            start in 0u64..1_000_000,
            delta in 0u64..100_000,
            millis in 1u64..60_000,
            sensitivity in 1.0f64..5000.0,
        ) {
            let mut engine = MetricsEngine::new(Duration::ZERO);
            let t0 = Instant::now();
            engine.update(&sample(start, t0), Some(sensitivity));
            let m = engine
                .update(&sample(start + delta, t0 + Duration::from_millis(millis)), Some(sensitivity))
                .unwrap();

            let cps = delta as f64 * 1000.0 / millis as f64;
            prop_assert!(m.cps >= 0.0);
            prop_assert!((m.cps - cps).abs() <= 5e-4 * cps.max(1.0));
            prop_assert!((m.cpm - cps * 60.0).abs() <= 0.05 + 1e-9 * (cps * 60.0).max(1.0));
            let dose = m.dose_rate.unwrap();
            prop_assert!((dose - cps * 60.0 / sensitivity).abs() <= 1e-9 * dose.max(1.0));
        }

        #[test]
        fn decreasing_count_never_yields_metrics(
            start in 1u64..1_000_000,
            drop_by in 1u64..1_000_000,
        ) {
            let mut engine = MetricsEngine::new(Duration::ZERO);
            let t0 = Instant::now();
            engine.update(&sample(start, t0), None);
            let next = start.saturating_sub(drop_by);
            prop_assume!(next < start);
            prop_assert_eq!(engine.update(&sample(next, t0 + Duration::from_secs(1)), None), None);
        }
    }
}
