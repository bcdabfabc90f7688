use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

// ---------------------------------------------------------------------------
// Warehouse schema
// ---------------------------------------------------------------------------

/// Which normalized layout a deployment writes. Both variants share
/// `timestamp`, `demand_mwh` and `units`; they differ in identity columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarehouseSchema {
    /// Balancing-authority data: `region_code`, `region_name`.
    Region,
    /// Sub-balancing-authority data: `region_name` (parent), `subba_name`.
    SubRegion,
}

impl WarehouseSchema {
    /// Column names in table order.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            WarehouseSchema::Region => {
                &["timestamp", "demand_mwh", "units", "region_code", "region_name"]
            }
            WarehouseSchema::SubRegion => {
                &["timestamp", "demand_mwh", "units", "region_name", "subba_name"]
            }
        }
    }

    /// Source field → warehouse column for the identity columns.
    pub fn identity_fields(self) -> [(&'static str, &'static str); 2] {
        match self {
            WarehouseSchema::Region => [
                ("respondent", "region_code"),
                ("respondent-name", "region_name"),
            ],
            WarehouseSchema::SubRegion => [
                ("parent-name", "region_name"),
                ("subba-name", "subba_name"),
            ],
        }
    }

    /// Path of the EIA v2 route serving this layout.
    pub fn eia_route(self) -> &'static str {
        match self {
            WarehouseSchema::Region => "electricity/rto/region-data/data/",
            WarehouseSchema::SubRegion => "electricity/rto/region-sub-ba-data/data/",
        }
    }
}

impl std::fmt::Display for WarehouseSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WarehouseSchema::Region => "region",
            WarehouseSchema::SubRegion => "subregion",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for WarehouseSchema {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "region" => Ok(WarehouseSchema::Region),
            "subregion" | "subba" | "sub-region" => Ok(WarehouseSchema::SubRegion),
            other => Err(AppError::Config(format!(
                "WAREHOUSE_SCHEMA must be `region` or `subregion`, got `{other}`"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Readings
// ---------------------------------------------------------------------------

/// One row exactly as the EIA API returned it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct RawReading(pub serde_json::Map<String, serde_json::Value>);

impl RawReading {
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.0.get(field)
    }
}

/// Identity columns; the variant must match the table's [`WarehouseSchema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Region {
        region_code: String,
        region_name: String,
    },
    SubRegion {
        region_name: String,
        subba_name: String,
    },
}

impl Identity {
    pub fn schema(&self) -> WarehouseSchema {
        match self {
            Identity::Region { .. } => WarehouseSchema::Region,
            Identity::SubRegion { .. } => WarehouseSchema::SubRegion,
        }
    }

    /// Values of the two identity columns, in table order.
    pub fn values(&self) -> (&str, &str) {
        match self {
            Identity::Region {
                region_code,
                region_name,
            } => (region_code, region_name),
            Identity::SubRegion {
                region_name,
                subba_name,
            } => (region_name, subba_name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedReading {
    pub timestamp: DateTime<Utc>,
    /// `None` when the source value was missing or not numeric.
    pub demand_mwh: Option<f64>,
    pub units: String,
    pub identity: Identity,
}

/// Row shape the trainer reads back from the warehouse.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub ds: NaiveDateTime,
    pub y: Option<f64>,
}

// ---------------------------------------------------------------------------
// Forecast output
// ---------------------------------------------------------------------------

/// One predicted hour.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRow {
    pub ds: NaiveDateTime,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
}

pub const DS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Wire form of a forecast row: every field stringified. Bounds are absent
/// on the stale-model fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    pub ds: String,
    pub yhat: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yhat_lower: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yhat_upper: Option<String>,
}

impl ForecastRecord {
    pub fn full(row: &ForecastRow) -> Self {
        Self {
            ds: row.ds.format(DS_FORMAT).to_string(),
            yhat: row.yhat.to_string(),
            yhat_lower: Some(row.yhat_lower.to_string()),
            yhat_upper: Some(row.yhat_upper.to_string()),
        }
    }

    pub fn point_only(row: &ForecastRow) -> Self {
        Self {
            ds: row.ds.format(DS_FORMAT).to_string(),
            yhat: row.yhat.to_string(),
            yhat_lower: None,
            yhat_upper: None,
        }
    }
}
