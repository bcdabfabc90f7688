//! Client-side state for the forecast dashboard: fetching `/predict`, lenient
//! decoding of its rows, and the summary metrics shown above the table.

use chrono::NaiveDateTime;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::normalize::{coerce_numeric, parse_period};
use crate::types::DS_FORMAT;

pub const MIN_DAYS: i64 = 1;
pub const MAX_DAYS: i64 = 30;
pub const EMPTY_DATA: &str = "API returned empty data.";

// ---------------------------------------------------------------------------
// Forecast rows
// ---------------------------------------------------------------------------

/// One `/predict` row. Fields that fail to parse become `None`; bounds are
/// absent on the stale-model fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastPoint {
    pub ds: Option<NaiveDateTime>,
    pub raw_ds: String,
    pub yhat: Option<f64>,
    pub yhat_lower: Option<f64>,
    pub yhat_upper: Option<f64>,
}

impl ForecastPoint {
    pub fn from_value(v: &Value) -> Self {
        let raw_ds = match v.get("ds") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        let ds = NaiveDateTime::parse_from_str(&raw_ds, DS_FORMAT)
            .ok()
            .or_else(|| parse_period(&raw_ds).map(|t| t.naive_utc()));
        let num = |field: &str| v.get(field).and_then(coerce_numeric);

        Self {
            ds,
            raw_ds,
            yhat: num("yhat"),
            yhat_lower: num("yhat_lower"),
            yhat_upper: num("yhat_upper"),
        }
    }

    pub fn has_bounds(&self) -> bool {
        self.yhat_lower.is_some() && self.yhat_upper.is_some()
    }
}

/// Decode a `/predict` body. Anything other than a non-empty array is an error.
pub fn parse_forecast(body: &Value) -> Result<Vec<ForecastPoint>> {
    let rows = body
        .as_array()
        .ok_or_else(|| AppError::Parse(format!("expected a JSON array, got {body}")))?;
    if rows.is_empty() {
        return Err(AppError::Parse(EMPTY_DATA.to_string()));
    }
    Ok(rows.iter().map(ForecastPoint::from_value).collect())
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    /// `yhat` of the last row.
    pub final_demand: Option<f64>,
    /// Mean over rows with a numeric `yhat`.
    pub average_demand: Option<f64>,
}

pub fn metrics(points: &[ForecastPoint]) -> Metrics {
    let values: Vec<f64> = points.iter().filter_map(|p| p.yhat).collect();
    let average_demand = if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    };
    Metrics {
        final_demand: points.last().and_then(|p| p.yhat),
        average_demand,
    }
}

/// `12,345 MW`, rounded to whole megawatts.
pub fn format_mw(v: Option<f64>) -> String {
    let Some(v) = v else {
        return "—".to_string();
    };
    let rounded = v.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let sign = if rounded < 0.0 { "-" } else { "" };
    format!("{sign}{grouped} MW")
}

pub fn format_value(v: Option<f64>) -> String {
    v.map_or("—".to_string(), |x| format!("{x:.2}"))
}

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Idle,
    Loading,
    Ready,
    Error(String),
}

#[derive(Debug, Clone)]
pub struct DashboardState {
    pub api_url: String,
    pub days: i64,
    pub status: ConnectionStatus,
    pub points: Vec<ForecastPoint>,
    /// `days` used for the rows currently shown.
    pub generated_days: Option<i64>,
}

impl DashboardState {
    pub fn new(api_url: String, days: i64) -> Self {
        Self {
            api_url,
            days: days.clamp(MIN_DAYS, MAX_DAYS),
            status: ConnectionStatus::Idle,
            points: Vec::new(),
            generated_days: None,
        }
    }

    pub fn adjust_days(&mut self, delta: i64) {
        self.days = (self.days + delta).clamp(MIN_DAYS, MAX_DAYS);
    }

    pub fn metrics(&self) -> Option<Metrics> {
        (!self.points.is_empty()).then(|| metrics(&self.points))
    }

    /// Request a forecast for the current `days`. Failures leave the previous
    /// rows cleared and the error in `status`.
    pub async fn generate(&mut self, client: &reqwest::Client) {
        self.status = ConnectionStatus::Loading;
        match fetch_forecast(client, &self.api_url, self.days).await {
            Ok(points) => {
                self.points = points;
                self.generated_days = Some(self.days);
                self.status = ConnectionStatus::Ready;
            }
            Err(AppError::Parse(msg)) if msg == EMPTY_DATA => {
                self.points.clear();
                self.generated_days = None;
                self.status = ConnectionStatus::Error(msg);
            }
            Err(e) => {
                self.points.clear();
                self.generated_days = None;
                self.status = ConnectionStatus::Error(format!("Error connecting to API: {e}"));
            }
        }
    }
}

pub async fn fetch_forecast(
    client: &reqwest::Client,
    api_url: &str,
    days: i64,
) -> Result<Vec<ForecastPoint>> {
    let url = format!("{}/predict", api_url.trim_end_matches('/'));
    let resp = client.get(&url).query(&[("days", days)]).send().await?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(AppError::Fetch {
            status: status.as_u16(),
            body,
        });
    }

    let body: Value = resp.json().await?;
    parse_forecast(&body)
}
