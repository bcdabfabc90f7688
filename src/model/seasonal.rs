//! Additive trend + seasonality model for hourly demand.
//!
//! `y(t) = trend(t) + daily(t) + weekly(t) + ε`
//!
//! - `trend` is piecewise linear: intercept, slope, and a hinge
//!   `(t - s_j)+` per changepoint `s_j`. Changepoints sit uniformly over the
//!   first 80% of history and their deltas are ridge-penalized, so the trend
//!   bends only where the data insists.
//! - `daily` and `weekly` are Fourier series evaluated on absolute days since
//!   the Unix epoch, so they stay phase-aligned past the end of history.
//!
//! Time is scaled to `[0, 1]` over the history span and `y` by `max |y|`
//! before fitting; the coefficients live in that scaled space.

use std::f64::consts::PI;

use chrono::{NaiveDateTime, TimeDelta};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::config::MAX_FORECAST_HOURS;
use crate::error::{AppError, Result};
use crate::model::ols::solve_ridge;
use crate::types::{ForecastRow, Observation};

const SECS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalConfig {
    pub daily_order: usize,
    pub weekly_order: usize,
    pub n_changepoints: usize,
    /// Fraction of history eligible for changepoints.
    pub changepoint_range: f64,
    /// L2 penalty per changepoint delta, per observation.
    pub changepoint_ridge: f64,
    /// L2 penalty per Fourier coefficient, per observation.
    pub seasonality_ridge: f64,
    /// Normal quantile for the uncertainty interval (1.2816 ≈ 80%).
    pub interval_z: f64,
}

impl Default for SeasonalConfig {
    fn default() -> Self {
        Self {
            daily_order: 4,
            weekly_order: 3,
            n_changepoints: 25,
            changepoint_range: 0.8,
            changepoint_ridge: 0.05,
            seasonality_ridge: 1e-6,
            interval_z: 1.281_551_565_544_600_4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalModel {
    config: SeasonalConfig,
    /// First observed timestamp; `t = 0`.
    start: NaiveDateTime,
    /// Seconds between the first and last observation; `t = 1` at the end.
    t_scale_secs: f64,
    y_scale: f64,
    /// Changepoint locations in scaled time.
    changepoints: Vec<f64>,
    /// `[intercept, slope, deltas.., daily.., weekly..]` in scaled units.
    coefficients: Vec<f64>,
    /// Residual standard deviation in scaled units.
    sigma: f64,
    /// Every distinct timestamp seen at fit time, ascending, including those
    /// whose value was null.
    history: Vec<NaiveDateTime>,
    n_observations: usize,
}

impl SeasonalModel {
    /// Fit on the full history. Observations with `y = None` are excluded
    /// from the regression but remain on the timeline.
    pub fn fit(observations: &[Observation], config: SeasonalConfig) -> Result<Self> {
        let mut history: Vec<NaiveDateTime> = observations.iter().map(|o| o.ds).collect();
        history.sort_unstable();
        history.dedup();

        let mut obs: Vec<(NaiveDateTime, f64)> = observations
            .iter()
            .filter_map(|o| o.y.filter(|y| y.is_finite()).map(|y| (o.ds, y)))
            .collect();
        obs.sort_by_key(|(ds, _)| *ds);

        if obs.len() < 2 {
            return Err(AppError::Training(format!(
                "history has {} non-null observations, need at least 2",
                obs.len()
            )));
        }

        let start = obs[0].0;
        let end = obs[obs.len() - 1].0;
        let t_scale_secs = (end - start).num_seconds() as f64;
        if t_scale_secs <= 0.0 {
            return Err(AppError::Training(
                "history spans zero time; need observations at distinct timestamps".to_string(),
            ));
        }

        let y_scale = obs.iter().fold(0.0_f64, |m, (_, y)| m.max(y.abs()));
        let y_scale = if y_scale > 0.0 { y_scale } else { 1.0 };

        let t: Vec<f64> = obs
            .iter()
            .map(|(ds, _)| (*ds - start).num_seconds() as f64 / t_scale_secs)
            .collect();
        let changepoints = place_changepoints(&t, &config);

        let mut model = Self {
            config,
            start,
            t_scale_secs,
            y_scale,
            changepoints,
            coefficients: Vec::new(),
            sigma: 0.0,
            history,
            n_observations: obs.len(),
        };

        let n = obs.len();
        let p = model.n_features();
        let mut x = DMatrix::<f64>::zeros(n, p);
        let mut row = Vec::with_capacity(p);
        for (i, (ds, _)) in obs.iter().enumerate() {
            model.features_into(*ds, &mut row);
            for (j, v) in row.iter().enumerate() {
                x[(i, j)] = *v;
            }
        }
        let y = DVector::from_iterator(n, obs.iter().map(|(_, y)| y / y_scale));

        let n_cp = model.changepoints.len();
        let penalties: Vec<f64> = (0..p)
            .map(|j| match j {
                0 | 1 => 0.0,
                j if j < 2 + n_cp => model.config.changepoint_ridge * n as f64,
                _ => model.config.seasonality_ridge * n as f64,
            })
            .collect();

        let beta = solve_ridge(&x, &y, &penalties).ok_or_else(|| {
            AppError::Training("least squares solve did not converge".to_string())
        })?;

        let residuals = &y - &x * &beta;
        let dof = n.saturating_sub(p).max(1) as f64;
        model.sigma = (residuals.norm_squared() / dof).sqrt();
        model.coefficients = beta.iter().copied().collect();
        Ok(model)
    }

    /// Last timestamp on the history timeline.
    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.history.last().copied()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn n_observations(&self) -> usize {
        self.n_observations
    }

    /// History timeline followed by `periods` hourly steps past its last
    /// timestamp.
    pub fn extend_timeline(&self, periods: i64) -> Result<Vec<NaiveDateTime>> {
        if periods < 0 {
            return Err(AppError::Prediction(format!(
                "Number of samples, {periods}, must be non-negative."
            )));
        }
        if periods > MAX_FORECAST_HOURS {
            return Err(AppError::Prediction(format!(
                "horizon of {periods} hours exceeds the maximum of {MAX_FORECAST_HOURS}"
            )));
        }
        let last = self
            .last_timestamp()
            .ok_or_else(|| AppError::Prediction("model has an empty history".to_string()))?;

        let overflow = || AppError::Prediction(format!("horizon of {periods} hours is out of range"));
        let span = TimeDelta::try_hours(periods).ok_or_else(overflow)?;
        last.checked_add_signed(span).ok_or_else(overflow)?;
        let extra = usize::try_from(periods).map_err(|_| overflow())?;

        let mut timeline = Vec::with_capacity(self.history.len() + extra);
        timeline.extend_from_slice(&self.history);
        let mut ds = last;
        for _ in 0..extra {
            ds += TimeDelta::hours(1);
            timeline.push(ds);
        }
        Ok(timeline)
    }

    /// One forecast row per timestamp.
    pub fn predict(&self, timeline: &[NaiveDateTime]) -> Result<Vec<ForecastRow>> {
        if self.coefficients.len() != self.n_features() {
            return Err(AppError::Prediction(format!(
                "model has {} coefficients, expected {}",
                self.coefficients.len(),
                self.n_features()
            )));
        }

        let mut row = Vec::with_capacity(self.coefficients.len());
        Ok(timeline
            .iter()
            .map(|&ds| {
                self.features_into(ds, &mut row);
                let scaled: f64 = row.iter().zip(&self.coefficients).map(|(f, b)| f * b).sum();
                let t = self.scaled_time(ds);
                let widen = (1.0 + (t - 1.0).max(0.0)).sqrt();
                let half = self.config.interval_z * self.sigma * widen;
                ForecastRow {
                    ds,
                    yhat: scaled * self.y_scale,
                    yhat_lower: (scaled - half) * self.y_scale,
                    yhat_upper: (scaled + half) * self.y_scale,
                }
            })
            .collect())
    }

    /// `extend_timeline` then `predict`.
    pub fn forecast(&self, periods: i64) -> Result<Vec<ForecastRow>> {
        let timeline = self.extend_timeline(periods)?;
        self.predict(&timeline)
    }

    fn n_features(&self) -> usize {
        2 + self.changepoints.len() + 2 * (self.config.daily_order + self.config.weekly_order)
    }

    fn scaled_time(&self, ds: NaiveDateTime) -> f64 {
        (ds - self.start).num_seconds() as f64 / self.t_scale_secs
    }

    fn features_into(&self, ds: NaiveDateTime, out: &mut Vec<f64>) {
        out.clear();
        let t = self.scaled_time(ds);
        out.push(1.0);
        out.push(t);
        out.extend(self.changepoints.iter().map(|s| (t - s).max(0.0)));

        let days = ds.and_utc().timestamp() as f64 / SECS_PER_DAY;
        fourier_into(days, 1.0, self.config.daily_order, out);
        fourier_into(days, 7.0, self.config.weekly_order, out);
    }
}

fn fourier_into(days: f64, period: f64, order: usize, out: &mut Vec<f64>) {
    for k in 1..=order {
        let x = 2.0 * PI * k as f64 * days / period;
        out.push(x.sin());
        out.push(x.cos());
    }
}

/// Uniform changepoints over the first `changepoint_range` of the (sorted)
/// scaled times, never at the first observation.
fn place_changepoints(t: &[f64], config: &SeasonalConfig) -> Vec<f64> {
    let hist_size = (t.len() as f64 * config.changepoint_range).floor() as usize;
    let n_cp = config.n_changepoints.min(hist_size.saturating_sub(1));
    if n_cp == 0 {
        return Vec::new();
    }
    let last = (hist_size - 1) as f64;
    let mut cps: Vec<f64> = (1..=n_cp)
        .map(|i| {
            let idx = (last * i as f64 / n_cp as f64).round() as usize;
            t[idx]
        })
        .collect();
    cps.dedup_by(|a, b| (*a - *b).abs() < f64::EPSILON);
    cps
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn ts(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap().and_hms_opt(hour, 0, 0).unwrap()
    }

    /// Hourly demand: level 1000, daily swing ±200, slight drift, ±5 jitter.
    fn synthetic_history(start: NaiveDateTime, hours: i64) -> Vec<Observation> {
        (0..hours)
            .map(|h| {
                let ds = start + TimeDelta::hours(h);
                let hour_of_day = (h % 24) as f64;
                let jitter = (h * 37 % 11) as f64 - 5.0;
                let y = 1000.0
                    + 200.0 * (2.0 * PI * hour_of_day / 24.0).sin()
                    + 0.1 * h as f64
                    + jitter;
                Observation { ds, y: Some(y) }
            })
            .collect()
    }

    #[test]
    fn fit_requires_two_non_null_points() {
        let err = SeasonalModel::fit(&[], SeasonalConfig::default()).unwrap_err();
        assert!(matches!(err, AppError::Training(_)));

        let one = vec![
            Observation { ds: ts(1, 0), y: Some(1.0) },
            Observation { ds: ts(1, 1), y: None },
        ];
        assert!(SeasonalModel::fit(&one, SeasonalConfig::default()).is_err());
    }

    #[test]
    fn fit_recovers_daily_cycle() {
        let history = synthetic_history(ts(1, 0), 14 * 24);
        let model = SeasonalModel::fit(&history, SeasonalConfig::default()).unwrap();

        let timeline: Vec<_> = history.iter().map(|o| o.ds).collect();
        let rows = model.predict(&timeline).unwrap();
        let mae = rows
            .iter()
            .zip(&history)
            .map(|(r, o)| (r.yhat - o.y.unwrap()).abs())
            .sum::<f64>()
            / rows.len() as f64;
        assert!(mae < 10.0, "in-sample MAE too large: {mae}");
    }

    #[test]
    fn forecast_continues_the_seasonal_shape() {
        let history = synthetic_history(ts(1, 0), 14 * 24);
        let model = SeasonalModel::fit(&history, SeasonalConfig::default()).unwrap();
        let last = model.last_timestamp().unwrap();

        let rows = model.forecast(48).unwrap();
        let future: Vec<_> = rows.iter().filter(|r| r.ds > last).collect();
        assert_eq!(future.len(), 48);

        // The sine peaks at hour 6 and troughs at hour 18.
        let peak = future.iter().find(|r| chrono::Timelike::hour(&r.ds) == 6).unwrap();
        let trough = future.iter().find(|r| chrono::Timelike::hour(&r.ds) == 18).unwrap();
        assert!(peak.yhat - trough.yhat > 300.0);
    }

    #[test]
    fn intervals_bracket_the_point_and_widen_past_history() {
        let history = synthetic_history(ts(1, 0), 7 * 24);
        let model = SeasonalModel::fit(&history, SeasonalConfig::default()).unwrap();
        let rows = model.forecast(24 * 30).unwrap();

        for r in &rows {
            assert!(r.yhat_lower <= r.yhat && r.yhat <= r.yhat_upper);
        }
        let first = &rows[0];
        let last = rows.last().unwrap();
        assert!(last.yhat_upper - last.yhat_lower > first.yhat_upper - first.yhat_lower);
    }

    #[test]
    fn timeline_keeps_history_and_nulls() {
        let mut history = synthetic_history(ts(1, 0), 48);
        history[10].y = None;
        history.push(Observation { ds: ts(3, 5), y: None });
        let model = SeasonalModel::fit(&history, SeasonalConfig::default()).unwrap();

        assert_eq!(model.history_len(), 49);
        assert_eq!(model.n_observations(), 47);
        assert_eq!(model.last_timestamp(), Some(ts(3, 5)));

        let timeline = model.extend_timeline(3).unwrap();
        assert_eq!(timeline.len(), 52);
        assert_eq!(timeline[49], ts(3, 6));
        assert_eq!(timeline[51], ts(3, 8));
    }

    #[test]
    fn zero_periods_is_history_only_and_negative_is_an_error() {
        let model = SeasonalModel::fit(&synthetic_history(ts(1, 0), 48), SeasonalConfig::default()).unwrap();
        assert_eq!(model.extend_timeline(0).unwrap().len(), 48);
        assert!(matches!(model.extend_timeline(-24), Err(AppError::Prediction(_))));
        assert!(model.extend_timeline(i64::MAX).is_err());
    }

    #[test]
    fn horizon_is_capped() {
        let model = SeasonalModel::fit(&synthetic_history(ts(1, 0), 48), SeasonalConfig::default()).unwrap();
        assert_eq!(
            model.extend_timeline(MAX_FORECAST_HOURS).unwrap().len(),
            48 + MAX_FORECAST_HOURS as usize
        );
        assert!(matches!(
            model.extend_timeline(MAX_FORECAST_HOURS + 1),
            Err(AppError::Prediction(_))
        ));
    }

    #[test]
    fn changepoints_skip_first_observation_and_stay_in_range() {
        let t: Vec<f64> = (0..100).map(|i| i as f64 / 99.0).collect();
        let cps = place_changepoints(&t, &SeasonalConfig::default());
        assert_eq!(cps.len(), 25);
        assert!(cps[0] > 0.0);
        assert!(*cps.last().unwrap() <= 0.8);
    }

    #[test]
    fn serde_round_trip_preserves_predictions() {
        let model = SeasonalModel::fit(&synthetic_history(ts(1, 0), 72), SeasonalConfig::default()).unwrap();
        let json = serde_json::to_string(&model).unwrap();
        let back: SeasonalModel = serde_json::from_str(&json).unwrap();
        for (a, b) in model.forecast(5).unwrap().iter().zip(back.forecast(5).unwrap()) {
            assert_eq!(a.ds, b.ds);
            assert!((a.yhat - b.yhat).abs() < 1e-6 * a.yhat.abs().max(1.0));
        }
    }
}
