//! Seasonal regression model.
//!
//! A linear trend fitted by least squares, multiplied by hour-of-day and
//! day-of-week seasonal factors, with a residual sigma feeding the 95 %
//! prediction interval. Fitting produces a fully-formed immutable model;
//! the engine swaps it into the live slot, never updates it in place.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, Timelike, Utc};
use thiserror::Error;

use loadcast_metrics::MetricSample;

use crate::types::ForecastPoint;

/// z-score for the 95 % prediction interval.
const INTERVAL_Z: f64 = 1.96;

/// Errors from model fitting.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("not enough samples to fit a model: got {got}, need at least 2")]
    NotEnoughSamples { got: usize },
}

/// Trained seasonal model for one metric.
#[derive(Debug, Clone)]
pub struct SeasonalModel {
    trained_at: DateTime<Utc>,
    /// Epoch second of the first training sample; trend x = t − origin.
    origin: i64,
    slope: f64,
    intercept: f64,
    /// Multiplicative hour-of-day factors, mean-normalized to 1.
    hourly: [f64; 24],
    /// Multiplicative day-of-week factors (Monday = 0), mean-normalized.
    weekday: [f64; 7],
    /// Residual standard deviation around the fitted values.
    sigma: f64,
}

impl SeasonalModel {
    /// Fit on an ordered sample window.
    pub fn fit(samples: &[MetricSample], trained_at: DateTime<Utc>) -> Result<Self, ModelError> {
        if samples.len() < 2 {
            return Err(ModelError::NotEnoughSamples { got: samples.len() });
        }

        let origin = samples[0].timestamp.timestamp();
        let n = samples.len() as f64;
        let xs: Vec<f64> = samples
            .iter()
            .map(|s| (s.timestamp.timestamp() - origin) as f64)
            .collect();

        // Least-squares trend over seconds since the window start.
        let sum_x: f64 = xs.iter().sum();
        let sum_y: f64 = samples.iter().map(|s| s.value).sum();
        let sum_xy: f64 = xs.iter().zip(samples).map(|(x, s)| x * s.value).sum();
        let sum_xx: f64 = xs.iter().map(|x| x * x).sum();

        let denom = n * sum_xx - sum_x * sum_x;
        let (slope, intercept) = if denom.abs() < f64::EPSILON {
            (0.0, sum_y / n)
        } else {
            let slope = (n * sum_xy - sum_x * sum_y) / denom;
            (slope, (sum_y - slope * sum_x) / n)
        };

        // Floor for detrended ratios: a trend near zero would blow the
        // multiplicative factors up.
        let ratio_floor = ((sum_y / n).abs()).max(1.0) * 1e-3;
        let trend = |x: f64| (slope * x + intercept).max(ratio_floor);

        // Hour-of-day factors from detrended ratios.
        let mut hourly: [f64; 24] = bucket_factors(
            samples.iter().zip(&xs),
            |s| s.timestamp.hour() as usize,
            |s, x| s.value / trend(*x),
        );
        normalize(&mut hourly);

        // Day-of-week factors from what trend and hourly factors leave over.
        let mut weekday: [f64; 7] = bucket_factors(
            samples.iter().zip(&xs),
            |s| s.timestamp.weekday().num_days_from_monday() as usize,
            |s, x| s.value / (trend(*x) * hourly[s.timestamp.hour() as usize]).max(ratio_floor),
        );
        normalize(&mut weekday);

        // Residual sigma around the full fit.
        let mut ss = 0.0;
        for (s, x) in samples.iter().zip(&xs) {
            let fitted = trend(*x)
                * hourly[s.timestamp.hour() as usize]
                * weekday[s.timestamp.weekday().num_days_from_monday() as usize];
            ss += (s.value - fitted).powi(2);
        }
        let sigma = (ss / (n - 1.0)).sqrt();

        Ok(Self {
            trained_at,
            origin,
            slope,
            intercept,
            hourly,
            weekday,
            sigma,
        })
    }

    /// Predict a single point with its interval bounds.
    ///
    /// Predictions are floored at zero; `lower <= predicted <= upper` by
    /// construction.
    pub fn predict_at(&self, ts: DateTime<Utc>) -> ForecastPoint {
        let x = (ts.timestamp() - self.origin) as f64;
        let seasonal = self.hourly[ts.hour() as usize]
            * self.weekday[ts.weekday().num_days_from_monday() as usize];
        let predicted = ((self.slope * x + self.intercept) * seasonal).max(0.0);
        let spread = INTERVAL_Z * self.sigma;

        ForecastPoint {
            timestamp: ts,
            predicted,
            lower: (predicted - spread).max(0.0),
            upper: predicted + spread,
        }
    }

    /// Predict `minutes` one-minute steps starting one minute after `from`.
    pub fn predict_horizon(&self, from: DateTime<Utc>, minutes: u32) -> Vec<ForecastPoint> {
        (1..=i64::from(minutes))
            .map(|m| self.predict_at(from + ChronoDuration::minutes(m)))
            .collect()
    }

    /// When this model was fitted.
    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }
}

/// Mean ratio per bucket; buckets with no samples get a neutral 1.0.
fn bucket_factors<'a, const N: usize, I>(
    pairs: I,
    bucket_of: impl Fn(&MetricSample) -> usize,
    ratio_of: impl Fn(&MetricSample, &f64) -> f64,
) -> [f64; N]
where
    I: Iterator<Item = (&'a MetricSample, &'a f64)>,
{
    let mut sums = [0.0; N];
    let mut counts = [0u32; N];
    for (sample, x) in pairs {
        let b = bucket_of(sample);
        sums[b] += ratio_of(sample, x);
        counts[b] += 1;
    }

    let mut factors = [1.0; N];
    for b in 0..N {
        if counts[b] > 0 {
            factors[b] = sums[b] / f64::from(counts[b]);
        }
    }
    factors
}

/// Scale factors so they average to 1 (keeps the trend the level-setter).
fn normalize(factors: &mut [f64]) {
    let mean = factors.iter().sum::<f64>() / factors.len() as f64;
    if mean > f64::EPSILON {
        for f in factors.iter_mut() {
            *f /= mean;
        }
    }
}
