use chrono::NaiveDateTime;
use tracing::{error, info, warn};

use crate::config::STALE_FALLBACK_ROWS;
use crate::error::{AppError, Result};
use crate::model::{ModelStore, SeasonalModel};
use crate::types::ForecastRecord;

/// Serving state, fixed for the life of the process.
#[derive(Debug)]
pub enum ModelState {
    Unloaded,
    Loaded(SeasonalModel),
}

impl ModelState {
    /// Load the blob once at startup. Any failure leaves the service Unloaded.
    pub async fn initialize(store: Option<&ModelStore>) -> Self {
        let Some(store) = store else {
            error!("No model store configured; serving without a model");
            return Self::Unloaded;
        };

        info!("Loading model from {}", store.location().display());
        match store.load().await {
            Ok(model) => {
                info!(
                    history = model.history_len(),
                    last = ?model.last_timestamp(),
                    "Model loaded successfully."
                );
                Self::Loaded(model)
            }
            Err(e) => {
                error!("Error loading model: {e}");
                Self::Unloaded
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    pub fn model(&self) -> Result<&SeasonalModel> {
        match self {
            Self::Loaded(m) => Ok(m),
            Self::Unloaded => Err(AppError::ModelUnavailable),
        }
    }
}

/// Forecast `days` ahead of the model's last timestamp and keep only rows
/// after `now`. When nothing is left, the tail of the full forecast is
/// returned with point estimates only.
pub fn select_forecast(
    model: &SeasonalModel,
    days: i64,
    now: NaiveDateTime,
) -> Result<Vec<ForecastRecord>> {
    let hours = days
        .checked_mul(24)
        .ok_or_else(|| AppError::Prediction(format!("days={days} is out of range")))?;
    let forecast = model.forecast(hours)?;

    let future: Vec<ForecastRecord> = forecast
        .iter()
        .filter(|row| row.ds > now)
        .map(ForecastRecord::full)
        .collect();

    if !future.is_empty() {
        info!(days, rows = future.len(), "Returning future forecast");
        return Ok(future);
    }

    warn!(
        days,
        last = ?model.last_timestamp(),
        "Forecast has no rows after now; model data is stale. Returning last {STALE_FALLBACK_ROWS} rows."
    );
    let tail = forecast.len().saturating_sub(STALE_FALLBACK_ROWS);
    Ok(forecast[tail..].iter().map(ForecastRecord::point_only).collect())
}
