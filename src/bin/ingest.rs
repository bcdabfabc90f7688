use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use grid_forecaster::api::triggers::ingest_router;
use grid_forecaster::config::Config;
use grid_forecaster::db::Warehouse;
use grid_forecaster::error::Result;
use grid_forecaster::ingest::Ingestor;
use grid_forecaster::secrets;

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
    let ingestor = Ingestor::new(&cfg, secrets::from_config(&cfg), warehouse)?;
    info!(
        project = cfg.project_id.as_deref().unwrap_or("-"),
        schema = %cfg.schema,
        table = %ingestor.warehouse().table(),
        lookback_days = cfg.lookback_days,
        "Ingestion job configured"
    );

    let app = ingest_router(Arc::new(ingestor));
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Ingestion trigger listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
