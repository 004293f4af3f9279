//! Synthetic history fallback.
//!
//! When the metrics backend is unreachable or the fetched window is too
//! thin to train on, the engine discards it and trains on a generated
//! window instead: a daily sine cycle with per-sample noise and occasional
//! positive spikes, one sample per minute over the lookback.

use std::f64::consts::{FRAC_PI_2, PI};

use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use rand::Rng;

use loadcast_metrics::MetricSample;

/// Baseline load level of the generated cycle.
const BASE_LOAD: f64 = 50.0;
/// Peak-to-midline amplitude of the daily cycle.
const DAILY_AMPLITUDE: f64 = 30.0;
/// Half-width of the uniform per-sample noise.
const NOISE_SPAN: f64 = 5.0;
/// Chance of an additive positive spike per sample.
const SPIKE_PROBABILITY: f64 = 0.05;

/// Generate one sample per minute over the trailing `lookback_hours`,
/// oldest first, floored at zero.
///
/// Deterministic for a given `rng` state; the engine seeds from entropy in
/// production and from a fixed seed in tests.
pub fn synthetic_window(
    now: DateTime<Utc>,
    lookback_hours: u32,
    rng: &mut impl Rng,
) -> Vec<MetricSample> {
    let minutes = i64::from(lookback_hours) * 60;
    let mut samples = Vec::with_capacity(minutes as usize);

    for minute in (1..=minutes).rev() {
        let timestamp = now - ChronoDuration::minutes(minute);
        let hour = f64::from(timestamp.hour());
        let cycle = BASE_LOAD + DAILY_AMPLITUDE * (2.0 * PI * hour / 24.0 - FRAC_PI_2).sin();

        let value = if rng.gen_range(0.0..1.0) < SPIKE_PROBABILITY {
            cycle + rng.gen_range(20.0..50.0)
        } else {
            cycle + rng.gen_range(-NOISE_SPAN..NOISE_SPAN)
        };

        samples.push(MetricSample {
            timestamp,
            value: value.max(0.0),
        });
    }

    samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 12, 0, 0).unwrap()
    }

    #[test]
    fn one_sample_per_minute_over_lookback() {
        let mut rng = StdRng::seed_from_u64(7);
        let samples = synthetic_window(fixed_now(), 24, &mut rng);
        assert_eq!(samples.len(), 24 * 60);
    }

    #[test]
    fn deterministic_for_fixed_seed() {
        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);
        assert_eq!(
            synthetic_window(fixed_now(), 6, &mut a),
            synthetic_window(fixed_now(), 6, &mut b)
        );
    }

    #[test]
    fn different_seeds_differ() {
        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(8);
        assert_ne!(
            synthetic_window(fixed_now(), 6, &mut a),
            synthetic_window(fixed_now(), 6, &mut b)
        );
    }

    #[test]
    fn timestamps_ascend_strictly() {
        let mut rng = StdRng::seed_from_u64(7);
        let samples = synthetic_window(fixed_now(), 2, &mut rng);
        assert!(samples.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn values_never_negative() {
        let mut rng = StdRng::seed_from_u64(7);
        let samples = synthetic_window(fixed_now(), 24, &mut rng);
        assert!(samples.iter().all(|s| s.value >= 0.0));
    }

    #[test]
    fn midday_runs_hotter_than_midnight() {
        let mut rng = StdRng::seed_from_u64(7);
        let samples = synthetic_window(fixed_now(), 24, &mut rng);

        let mean_at = |hour: u32| {
            let (sum, n) = samples
                .iter()
                .filter(|s| s.timestamp.hour() == hour)
                .fold((0.0, 0u32), |(sum, n), s| (sum + s.value, n + 1));
            sum / f64::from(n)
        };

        // The cycle peaks at noon and bottoms out at midnight; noise and
        // spikes cannot close a 60-unit gap over an hour of samples.
        assert!(mean_at(12) > mean_at(0) + 20.0);
    }
}
