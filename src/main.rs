use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use grid_forecaster::api::forecast::ModelState;
use grid_forecaster::api::routes::{router, ApiState};
use grid_forecaster::config::Config;
use grid_forecaster::error::Result;
use grid_forecaster::model::ModelStore;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Model: loaded once, never reloaded ---
    let store = match ModelStore::from_config(&cfg) {
        Ok(s) => Some(s),
        Err(e) => {
            warn!("{e}");
            None
        }
    };
    let model = Arc::new(ModelState::initialize(store.as_ref()).await);
    if !model.is_loaded() {
        warn!("Serving without a model; /predict will answer 503");
    }

    // --- HTTP API server ---
    let app = router(ApiState { model });
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Forecast API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
