use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::{Config, FacetFilter};
use crate::db::Warehouse;
use crate::error::Result;
use crate::fetcher::{EiaClient, FetchWindow};
use crate::normalize::{normalize, NormalizeStats};
use crate::secrets::SecretProvider;

#[derive(Debug)]
pub struct IngestReport {
    pub window: FetchWindow,
    pub fetched: usize,
    pub stats: NormalizeStats,
    pub written: u64,
}

/// One fetch → normalize → append run over the trailing window.
pub struct Ingestor {
    secrets: Box<dyn SecretProvider>,
    secret_id: String,
    warehouse: Warehouse,
    eia_api_url: String,
    facets: FacetFilter,
    lookback_days: i64,
}

impl Ingestor {
    pub fn new(cfg: &Config, secrets: Box<dyn SecretProvider>, warehouse: Warehouse) -> Result<Self> {
        Ok(Self {
            secrets,
            secret_id: cfg.require_secret_id()?.to_string(),
            warehouse,
            eia_api_url: cfg.eia_api_url.clone(),
            facets: cfg.facets.clone(),
            lookback_days: cfg.lookback_days,
        })
    }

    pub fn warehouse(&self) -> &Warehouse {
        &self.warehouse
    }

    pub async fn run(&self, now: DateTime<Utc>) -> Result<IngestReport> {
        info!(secret = %self.secret_id, "Fetching API key");
        let api_key = self.secrets.access(&self.secret_id)?;

        let schema = self.warehouse.schema();
        let client = EiaClient::new(&self.eia_api_url, api_key, schema, self.facets.clone())?;
        let window = FetchWindow::trailing(now, self.lookback_days);
        info!(
            "Fetching data from {} to {}",
            window.start_param(),
            window.end_param()
        );

        let raw = client.fetch(&window).await?;
        let normalized = normalize(&raw, schema)?;
        info!(
            dropped = normalized.stats.bad_timestamps,
            null_demand = normalized.stats.null_demand,
            "Successfully parsed {} rows",
            normalized.rows.len()
        );

        let written = if normalized.rows.is_empty() {
            0
        } else {
            info!("Loading data into warehouse table {}", self.warehouse.table());
            self.warehouse.append(&normalized.rows).await?
        };
        info!("Load job complete. Loaded {written} rows.");

        Ok(IngestReport {
            window,
            fetched: raw.len(),
            stats: normalized.stats,
            written,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use axum::{routing::get, Json, Router};
    use chrono::TimeZone;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;
    use crate::error::AppError;
    use crate::types::WarehouseSchema;

    pub(crate) struct FixedSecret(pub(crate) &'static str);

    impl SecretProvider for FixedSecret {
        fn access(&self, _name: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    pub(crate) struct NoSecret;

    impl SecretProvider for NoSecret {
        fn access(&self, name: &str) -> Result<String> {
            Err(AppError::Secret(format!("{name} not found")))
        }
    }

    pub(crate) async fn eia_stub(rows: serde_json::Value) -> String {
        let app = Router::new().route(
            "/electricity/rto/region-data/data/",
            get(move || {
                let rows = rows.clone();
                async move { Json(json!({"response": {"data": rows}})) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    pub(crate) fn day_of_rows() -> serde_json::Value {
        let rows: Vec<_> = (0..24)
            .map(|h| {
                let value = if h == 3 { json!("W") } else { json!(format!("{}", 20000 + h)) };
                json!({
                    "period": format!("2025-01-01T{h:02}"),
                    "respondent": "CISO",
                    "respondent-name": "California Independent System Operator",
                    "type": "D",
                    "type-name": "Demand",
                    "value": value,
                    "value-units": "megawatthours"
                })
            })
            .collect();
        serde_json::Value::Array(rows)
    }

    pub(crate) fn test_config(base_url: String) -> Config {
        Config {
            log_level: "info".to_string(),
            api_port: 0,
            project_id: None,
            table_id: Some("p.d.hourly_demand".to_string()),
            db_path: ":memory:".to_string(),
            schema: WarehouseSchema::Region,
            secret_id: Some("eia-api-key".to_string()),
            secret_dir: None,
            model_bucket: None,
            model_filename: "model.json".to_string(),
            eia_api_url: base_url,
            facets: FacetFilter::Region {
                respondent: "CISO".to_string(),
                kind: "D".to_string(),
            },
            lookback_days: 7,
            dashboard_api_url: String::new(),
        }
    }

    pub(crate) async fn warehouse() -> Warehouse {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        Warehouse::new(pool, "hourly_demand", WarehouseSchema::Region).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 2, 0, 30, 0).unwrap()
    }

    #[tokio::test]
    async fn run_loads_normalized_rows() {
        let base = eia_stub(day_of_rows()).await;
        let ingestor = Ingestor::new(&test_config(base), Box::new(FixedSecret("k")), warehouse().await).unwrap();

        let report = ingestor.run(now()).await.unwrap();
        assert_eq!(report.fetched, 24);
        assert_eq!(report.written, 24);
        assert_eq!(report.stats.null_demand, 1);
        assert_eq!(report.window.end_param(), "2025-01-02T00");

        let rows = ingestor.warehouse().rows().await.unwrap();
        assert_eq!(rows[3].demand_mwh, None);
        assert_eq!(rows[4].demand_mwh, Some(20004.0));
    }

    #[tokio::test]
    async fn running_twice_duplicates_the_window() {
        let base = eia_stub(day_of_rows()).await;
        let ingestor = Ingestor::new(&test_config(base), Box::new(FixedSecret("k")), warehouse().await).unwrap();

        ingestor.run(now()).await.unwrap();
        ingestor.run(now()).await.unwrap();
        assert_eq!(ingestor.warehouse().count().await.unwrap(), 48);
    }

    #[tokio::test]
    async fn empty_response_completes_without_writing() {
        let base = eia_stub(json!([])).await;
        let ingestor = Ingestor::new(&test_config(base), Box::new(FixedSecret("k")), warehouse().await).unwrap();

        let report = ingestor.run(now()).await.unwrap();
        assert_eq!(report.written, 0);
    }

    #[tokio::test]
    async fn missing_secret_aborts_before_fetching() {
        let ingestor = Ingestor::new(
            &test_config("http://127.0.0.1:9".to_string()),
            Box::new(NoSecret),
            warehouse().await,
        )
        .unwrap();
        assert!(matches!(ingestor.run(now()).await, Err(AppError::Secret(_))));
    }
}
