use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use grid_forecaster::api::triggers::{train_router, TrainJob};
use grid_forecaster::config::Config;
use grid_forecaster::db::Warehouse;
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
    let warehouse = Warehouse::open(&cfg.db_path, cfg.require_table_id()?, cfg.schema).await?;
    let store = ModelStore::from_config(&cfg)?;
    info!(
        table = %warehouse.table(),
        model = %store.location().display(),
        "Training job configured"
    );

    let app = train_router(Arc::new(TrainJob { warehouse, store }));
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Training trigger listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
