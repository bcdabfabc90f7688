//! Single-route HTTP triggers for the batch jobs. Any method on `/` runs the
//! job to completion and answers in plain text.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::any, Router};
use chrono::Utc;
use tracing::error;

use crate::db::Warehouse;
use crate::error::Result;
use crate::ingest::Ingestor;
use crate::model::ModelStore;
use crate::trainer::run_training;

pub const INGEST_OK: &str = "Data ingestion complete.";
pub const TRAIN_OK: &str = "Model training and saving complete.";

pub struct TrainJob {
    pub warehouse: Warehouse,
    pub store: ModelStore,
}

pub fn ingest_router(ingestor: Arc<Ingestor>) -> Router {
    Router::new().route("/", any(trigger_ingest)).with_state(ingestor)
}

pub fn train_router(job: Arc<TrainJob>) -> Router {
    Router::new().route("/", any(trigger_train)).with_state(job)
}

async fn trigger_ingest(State(ingestor): State<Arc<Ingestor>>) -> (StatusCode, String) {
    respond(ingestor.run(Utc::now()).await.map(|_| ()), INGEST_OK)
}

async fn trigger_train(State(job): State<Arc<TrainJob>>) -> (StatusCode, String) {
    respond(
        run_training(&job.warehouse, &job.store).await.map(|_| ()),
        TRAIN_OK,
    )
}

fn respond(outcome: Result<()>, ok: &str) -> (StatusCode, String) {
    match outcome {
        Ok(()) => (StatusCode::OK, ok.to_string()),
        Err(e) => {
            error!("Job failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {e}"))
        }
    }
}
