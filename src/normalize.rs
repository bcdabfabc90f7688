//! Source rows → warehouse rows.
//!
//! Renames the EIA fields to the warehouse columns of the active
//! [`WarehouseSchema`], parses `period` into an instant and coerces `value`
//! into a number. A value that does not coerce becomes `None`; a period that
//! does not parse drops its row. Both are counted rather than raised. Fields
//! the schema does not name are ignored. A schema column absent from every
//! row rejects the batch; absent from some rows, it reads as null there.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::warn;

use crate::error::{AppError, Result};
use crate::types::{Identity, NormalizedReading, RawReading, WarehouseSchema};

const PERIOD_FIELD: &str = "period";
const VALUE_FIELD: &str = "value";
const UNITS_FIELD: &str = "value-units";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NormalizeStats {
    pub input_rows: usize,
    /// Rows dropped because `period` did not parse.
    pub bad_timestamps: usize,
    /// Rows kept with `demand_mwh = None`.
    pub null_demand: usize,
}

#[derive(Debug, Default)]
pub struct Normalized {
    pub rows: Vec<NormalizedReading>,
    pub stats: NormalizeStats,
}

pub fn normalize(raw: &[RawReading], schema: WarehouseSchema) -> Result<Normalized> {
    let mut out = Normalized {
        rows: Vec::with_capacity(raw.len()),
        stats: NormalizeStats {
            input_rows: raw.len(),
            ..Default::default()
        },
    };

    let [(src_a, _), (src_b, _)] = schema.identity_fields();
    let required = [PERIOD_FIELD, VALUE_FIELD, UNITS_FIELD, src_a, src_b];
    if let Some(missing) = required
        .into_iter()
        .find(|name| !raw.is_empty() && raw.iter().all(|row| row.get(name).is_none()))
    {
        return Err(AppError::SchemaMismatch(format!(
            "no row has a `{missing}` field; schema `{schema}` needs {required:?}"
        )));
    }

    for (i, row) in raw.iter().enumerate() {
        let period = field(row, PERIOD_FIELD);
        let value = field(row, VALUE_FIELD);
        let units = text(field(row, UNITS_FIELD));
        let a = text(field(row, src_a));
        let b = text(field(row, src_b));

        let Some(timestamp) = period.as_str().and_then(parse_period) else {
            warn!(row = i, period = %period, "Unparseable period, dropping row");
            out.stats.bad_timestamps += 1;
            continue;
        };

        let demand_mwh = coerce_numeric(value);
        if demand_mwh.is_none() {
            out.stats.null_demand += 1;
        }

        let identity = match schema {
            WarehouseSchema::Region => Identity::Region {
                region_code: a,
                region_name: b,
            },
            WarehouseSchema::SubRegion => Identity::SubRegion {
                region_name: a,
                subba_name: b,
            },
        };

        out.rows.push(NormalizedReading {
            timestamp,
            demand_mwh,
            units,
            identity,
        });
    }

    if out.stats.null_demand > 0 {
        warn!(
            count = out.stats.null_demand,
            "Non-numeric demand values coerced to null"
        );
    }

    Ok(out)
}

/// A key absent from one row reads as null, like a missing cell.
fn field<'a>(row: &'a RawReading, name: &str) -> &'a Value {
    static NULL: Value = Value::Null;
    row.get(name).unwrap_or(&NULL)
}

fn text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Numeric coercion: numbers and numeric strings pass, everything else is `None`.
pub fn coerce_numeric(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|x| x.is_finite())
}

/// Parse the period formats the EIA API emits. Offset-less forms are UTC.
pub fn parse_period(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    // Hourly periods: `2025-01-01T00`, local-hourly: `2025-01-01T00-08`.
    if s.len() >= 13 && s.as_bytes().get(10) == Some(&b'T') && s.is_char_boundary(13) {
        let (hour_part, offset_part) = s.split_at(13);
        if let Ok(naive) = NaiveDateTime::parse_from_str(&format!("{hour_part}:00"), "%Y-%m-%dT%H:%M") {
            if offset_part.is_empty() {
                return Some(Utc.from_utc_datetime(&naive));
            }
            if let Some(offset) = parse_hour_offset(offset_part) {
                return offset
                    .from_local_datetime(&naive)
                    .single()
                    .map(|dt| dt.with_timezone(&Utc));
            }
        }
    }

    // `T` forms without an offset; the space form is `/predict`'s `ds`
    // (DS_FORMAT), which the dashboard reads back through here.
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    // Daily-frequency EIA routes emit bare dates.
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// `-08`, `+05`, `-0330`, `+05:30`
fn parse_hour_offset(s: &str) -> Option<FixedOffset> {
    let sign = match s.as_bytes().first()? {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let digits: String = s[1..].chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
