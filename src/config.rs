use std::path::PathBuf;

use crate::error::{AppError, Result};
use crate::types::WarehouseSchema;

pub const EIA_API_URL: &str = "https://api.eia.gov/v2";

/// Rows requested per EIA call. The API caps `length` at 5000.
pub const EIA_PAGE_LENGTH: usize = 5000;

/// Client timeout for outbound HTTP calls (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Default horizon for `/predict` when `days` is omitted.
pub const DEFAULT_FORECAST_DAYS: i64 = 7;

/// Longest horizon `/predict` will build a timeline for (one leap year).
pub const MAX_FORECAST_HOURS: i64 = 366 * 24;

/// Rows returned when every forecast point is already in the past.
pub const STALE_FALLBACK_ROWS: usize = 24;

/// Placeholder the dashboard shows until `API_URL` is set.
pub const DASHBOARD_API_URL_PLACEHOLDER: &str = "YOUR_API_URL_HERE";

/// Facet filters sent to the EIA API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FacetFilter {
    /// `facets[respondent][]` + `facets[type][]`
    Region { respondent: String, kind: String },
    /// `facets[parent][]` + `facets[subba][]`
    SubRegion { parent: String, subba: String },
}

impl FacetFilter {
    pub fn query_params(&self) -> Vec<(String, String)> {
        match self {
            FacetFilter::Region { respondent, kind } => vec![
                ("facets[respondent][]".to_string(), respondent.clone()),
                ("facets[type][]".to_string(), kind.clone()),
            ],
            FacetFilter::SubRegion { parent, subba } => vec![
                ("facets[parent][]".to_string(), parent.clone()),
                ("facets[subba][]".to_string(), subba.clone()),
            ],
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub api_port: u16,
    /// Informational only; logged when the ingestion job starts (GCP_PROJECT_ID).
    pub project_id: Option<String>,
    /// Warehouse table identifier (TABLE_ID). Required by ingest and train.
    pub table_id: Option<String>,
    /// SQLite file backing the warehouse (DB_PATH).
    pub db_path: String,
    pub schema: WarehouseSchema,
    /// Logical name of the EIA API key (SECRET_ID).
    pub secret_id: Option<String>,
    /// When set, secrets are read from files in this directory (SECRET_DIR).
    pub secret_dir: Option<PathBuf>,
    /// Directory holding the model blob (MODEL_BUCKET).
    pub model_bucket: Option<PathBuf>,
    pub model_filename: String,
    pub eia_api_url: String,
    pub facets: FacetFilter,
    /// Trailing window fetched per ingestion run (INGEST_LOOKBACK_DAYS).
    pub lookback_days: i64,
    /// Forecast API base URL the dashboard calls (API_URL).
    pub dashboard_api_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let schema = std::env::var("WAREHOUSE_SCHEMA")
            .unwrap_or_else(|_| "region".to_string())
            .parse::<WarehouseSchema>()?;

        let facets = match schema {
            WarehouseSchema::Region => FacetFilter::Region {
                respondent: std::env::var("EIA_RESPONDENT").unwrap_or_else(|_| "CISO".to_string()),
                kind: std::env::var("EIA_TYPE").unwrap_or_else(|_| "D".to_string()),
            },
            WarehouseSchema::SubRegion => FacetFilter::SubRegion {
                parent: std::env::var("EIA_PARENT").unwrap_or_else(|_| "PJM".to_string()),
                subba: std::env::var("EIA_SUBBA").unwrap_or_else(|_| "AE".to_string()),
            },
        };

        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            project_id: non_empty_var("GCP_PROJECT_ID"),
            table_id: non_empty_var("TABLE_ID"),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "warehouse.db".to_string()),
            schema,
            secret_id: non_empty_var("SECRET_ID"),
            secret_dir: non_empty_var("SECRET_DIR").map(PathBuf::from),
            model_bucket: non_empty_var("MODEL_BUCKET").map(PathBuf::from),
            model_filename: std::env::var("MODEL_FILENAME")
                .unwrap_or_else(|_| "model.json".to_string()),
            eia_api_url: std::env::var("EIA_API_URL").unwrap_or_else(|_| EIA_API_URL.to_string()),
            facets,
            lookback_days: std::env::var("INGEST_LOOKBACK_DAYS")
                .unwrap_or_else(|_| "7".to_string())
                .parse::<i64>()
                .ok()
                .filter(|d| *d > 0)
                .ok_or_else(|| {
                    AppError::Config("INGEST_LOOKBACK_DAYS must be a positive integer".to_string())
                })?,
            dashboard_api_url: std::env::var("API_URL")
                .unwrap_or_else(|_| DASHBOARD_API_URL_PLACEHOLDER.to_string()),
        })
    }

    pub fn require_table_id(&self) -> Result<&str> {
        self.table_id
            .as_deref()
            .ok_or_else(|| AppError::Config("TABLE_ID is not set".to_string()))
    }

    pub fn require_secret_id(&self) -> Result<&str> {
        self.secret_id
            .as_deref()
            .ok_or_else(|| AppError::Config("SECRET_ID is not set".to_string()))
    }

    pub fn require_model_bucket(&self) -> Result<&std::path::Path> {
        self.model_bucket
            .as_deref()
            .ok_or_else(|| AppError::Config("MODEL_BUCKET is not set".to_string()))
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
