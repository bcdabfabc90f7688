use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::error;

use crate::api::forecast::{select_forecast, ModelState};
use crate::api::health::health;
use crate::config::DEFAULT_FORECAST_DAYS;
use crate::error::AppError;
use crate::types::ForecastRecord;

#[derive(Clone)]
pub struct ApiState {
    pub model: Arc<ModelState>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/predict", get(predict))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct PredictQuery {
    pub days: Option<i64>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn predict(
    State(state): State<ApiState>,
    Query(q): Query<PredictQuery>,
) -> Result<Json<Vec<ForecastRecord>>, AppError> {
    if !state.model.is_loaded() {
        return Err(AppError::ModelUnavailable);
    }
    let days = q.days.unwrap_or(DEFAULT_FORECAST_DAYS);

    let model = Arc::clone(&state.model);
    let records = tokio::task::spawn_blocking(move || {
        select_forecast(model.model()?, days, Utc::now().naive_utc())
    })
    .await
    .map_err(|e| AppError::Prediction(format!("prediction task failed: {e}")))?
    .inspect_err(|e| error!(days, "Prediction failed: {e}"))?;

    Ok(Json(records))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use chrono::{NaiveDate, TimeDelta};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::api::forecast::tests::{current_hour, model_ending_at};

    fn app(model: ModelState) -> Router {
        router(ApiState {
            model: Arc::new(model),
        })
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn unloaded_model_is_503_for_any_days() {
        for uri in ["/predict", "/predict?days=0", "/predict?days=-1", "/predict?days=7"] {
            let (status, body) = get_json(app(ModelState::Unloaded), uri).await;
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{uri}");
            assert_eq!(body, serde_json::json!({"detail": "Model not loaded."}));
        }
    }

    #[tokio::test]
    async fn year_old_model_returns_last_24_rows() {
        let last = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let model = model_ending_at(last, 72);

        let (status, body) = get_json(app(ModelState::Loaded(model)), "/predict?days=7").await;
        assert_eq!(status, StatusCode::OK);
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 24);
        let keys: Vec<_> = rows[0].as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys.len(), 2);
        assert!(rows[0].get("ds").is_some() && rows[0].get("yhat").is_some());
    }

    #[tokio::test]
    async fn current_model_returns_a_week_of_numeric_strings() {
        let model = model_ending_at(current_hour(), 96);

        let (status, body) = get_json(app(ModelState::Loaded(model)), "/predict?days=7").await;
        assert_eq!(status, StatusCode::OK);
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 168);
        for field in ["yhat", "yhat_lower", "yhat_upper"] {
            assert!(rows[0][field].as_str().unwrap().parse::<f64>().is_ok());
        }
        assert_eq!(rows[0]["ds"].as_str().unwrap().len(), "2025-01-01 00:00:00".len());
    }

    #[tokio::test]
    async fn days_defaults_to_a_week() {
        let model = model_ending_at(current_hour(), 96);
        let (_, body) = get_json(app(ModelState::Loaded(model)), "/predict").await;
        assert_eq!(body.as_array().unwrap().len(), 168);
    }

    #[tokio::test]
    async fn partially_elapsed_horizon_drops_past_hours() {
        let model = model_ending_at(current_hour() - TimeDelta::hours(5), 96);
        let (_, body) = get_json(app(ModelState::Loaded(model)), "/predict?days=1").await;
        assert_eq!(body.as_array().unwrap().len(), 24 - 5);
    }

    #[tokio::test]
    async fn negative_days_on_loaded_model_is_500() {
        let model = model_ending_at(current_hour(), 48);
        let (status, body) = get_json(app(ModelState::Loaded(model)), "/predict?days=-1").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["detail"].as_str().unwrap().contains("-24"));
    }

    #[tokio::test]
    async fn oversized_horizon_is_500_not_an_allocation() {
        let model = model_ending_at(current_hour(), 48);
        let (status, body) = get_json(app(ModelState::Loaded(model)), "/predict?days=50000000").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["detail"].as_str().unwrap().contains("exceeds the maximum"));

        let model = model_ending_at(current_hour(), 48);
        let (status, _) = get_json(app(ModelState::Loaded(model)), "/predict?days=366").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn health_reports_model_state() {
        let (status, body) = get_json(app(ModelState::Unloaded), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({"status": "ok", "model_loaded": false}));

        let model = model_ending_at(current_hour(), 48);
        let (_, body) = get_json(app(ModelState::Loaded(model)), "/").await;
        assert_eq!(body["model_loaded"], true);
    }
}
