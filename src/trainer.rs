use chrono::NaiveDateTime;
use tracing::info;

use crate::db::Warehouse;
use crate::error::{AppError, Result};
use crate::model::{ModelStore, SeasonalConfig, SeasonalModel};
use crate::types::Observation;

#[derive(Debug)]
pub struct TrainReport {
    pub rows: usize,
    pub observations: usize,
    pub last_timestamp: Option<NaiveDateTime>,
    pub blob_bytes: usize,
}

/// Full retrain: read all history, fit, overwrite the stored model.
pub async fn run_training(warehouse: &Warehouse, store: &ModelStore) -> Result<TrainReport> {
    info!("Querying data from warehouse table {}", warehouse.table());
    let history = warehouse.load_history().await?;
    let rows = history.len();
    info!("Successfully loaded {rows} rows.");

    info!("Training the model...");
    let model = tokio::task::spawn_blocking(move || train_model(&history))
        .await
        .map_err(|e| AppError::Training(format!("training task failed: {e}")))??;
    info!(
        observations = model.n_observations(),
        "Model training complete."
    );

    let blob_bytes = store.save(&model).await?;

    Ok(TrainReport {
        rows,
        observations: model.n_observations(),
        last_timestamp: model.last_timestamp(),
        blob_bytes,
    })
}

/// Daily + weekly seasonality, default trend flexibility.
pub fn train_model(history: &[Observation]) -> Result<SeasonalModel> {
    SeasonalModel::fit(history, SeasonalConfig::default())
}
