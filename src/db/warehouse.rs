use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{debug, info};

use crate::db::models::{HistoryRow, ReadingRow};
use crate::error::{AppError, Result};
use crate::types::{Identity, NormalizedReading, Observation, WarehouseSchema};

/// Append-only demand table in SQLite.
///
/// Rows are never updated or deleted, and re-appending a batch stores it
/// twice: there is no uniqueness key.
#[derive(Debug, Clone)]
pub struct Warehouse {
    pool: sqlx::SqlitePool,
    table: String,
    schema: WarehouseSchema,
}

impl Warehouse {
    /// Open (creating if needed) the SQLite file at `db_path`.
    pub async fn open(db_path: &str, table_id: &str, schema: WarehouseSchema) -> Result<Self> {
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(opts).await?;
        info!("Warehouse ready at {db_path}");
        Self::new(pool, table_id, schema)
    }

    pub fn new(pool: sqlx::SqlitePool, table_id: &str, schema: WarehouseSchema) -> Result<Self> {
        Ok(Self {
            pool,
            table: table_name(table_id)?,
            schema,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn schema(&self) -> WarehouseSchema {
        self.schema
    }

    /// Create the table for the configured schema, or verify an existing one.
    pub async fn ensure_table(&self) -> Result<()> {
        let existing: Vec<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info(?) ORDER BY cid")
                .bind(&self.table)
                .fetch_all(&self.pool)
                .await?;

        if existing.is_empty() {
            let [_, _, _, a, b] = self.columns();
            let ddl = format!(
                r#"
                CREATE TABLE IF NOT EXISTS "{t}" (
                    timestamp  TEXT NOT NULL,
                    demand_mwh REAL,
                    units      TEXT NOT NULL,
                    {a}        TEXT NOT NULL,
                    {b}        TEXT NOT NULL
                )
                "#,
                t = self.table,
            );
            sqlx::query(&ddl).execute(&self.pool).await?;
            let index = format!(
                r#"CREATE INDEX IF NOT EXISTS "{t}_timestamp_idx" ON "{t}" (timestamp)"#,
                t = self.table
            );
            sqlx::query(&index).execute(&self.pool).await?;
            info!(table = %self.table, schema = %self.schema, "Created warehouse table");
            return Ok(());
        }

        if existing.iter().map(String::as_str).ne(self.schema.columns().iter().copied()) {
            return Err(AppError::SchemaMismatch(format!(
                "table {} has columns {:?}, configured schema `{}` expects {:?}",
                self.table,
                existing,
                self.schema,
                self.schema.columns()
            )));
        }
        Ok(())
    }

    /// Append `rows` in one transaction. Returns the number of rows written.
    pub async fn append(&self, rows: &[NormalizedReading]) -> Result<u64> {
        if let Some((i, r)) = rows
            .iter()
            .enumerate()
            .find(|(_, r)| r.identity.schema() != self.schema)
        {
            return Err(AppError::SchemaMismatch(format!(
                "row {i} is a `{}` reading, table {} uses `{}`",
                r.identity.schema(),
                self.table,
                self.schema
            )));
        }

        self.ensure_table().await?;
        if rows.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            r#"INSERT INTO "{}" ({}) VALUES (?, ?, ?, ?, ?)"#,
            self.table,
            self.schema.columns().join(", ")
        );

        let mut tx = self.pool.begin().await?;
        let mut written = 0u64;
        for r in rows {
            let (a, b) = r.identity.values();
            written += sqlx::query(&sql)
                .bind(encode_timestamp(&r.timestamp))
                .bind(r.demand_mwh)
                .bind(&r.units)
                .bind(a)
                .bind(b)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;

        debug!(table = %self.table, written, "Append committed");
        Ok(written)
    }

    pub async fn count(&self) -> Result<i64> {
        self.ensure_table().await?;
        let sql = format!(r#"SELECT COUNT(*) FROM "{}""#, self.table);
        let n: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(n)
    }

    /// Full history (timestamp, demand) ordered by timestamp ascending, with
    /// timezone dropped.
    pub async fn load_history(&self) -> Result<Vec<Observation>> {
        self.ensure_table().await?;
        let sql = format!(
            r#"SELECT timestamp, demand_mwh FROM "{}" ORDER BY timestamp ASC, rowid ASC"#,
            self.table
        );
        let rows: Vec<HistoryRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|r| {
                Ok(Observation {
                    ds: decode_timestamp(&r.timestamp)?.naive_utc(),
                    y: r.demand_mwh,
                })
            })
            .collect()
    }

    /// Every stored row in insertion order.
    pub async fn rows(&self) -> Result<Vec<NormalizedReading>> {
        self.ensure_table().await?;
        let [_, _, _, a, b] = self.columns();
        let sql = format!(
            r#"SELECT timestamp, demand_mwh, units, {a} AS ident_a, {b} AS ident_b
               FROM "{}" ORDER BY rowid ASC"#,
            self.table
        );
        let rows: Vec<ReadingRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|r| {
                let identity = match self.schema {
                    WarehouseSchema::Region => Identity::Region {
                        region_code: r.ident_a,
                        region_name: r.ident_b,
                    },
                    WarehouseSchema::SubRegion => Identity::SubRegion {
                        region_name: r.ident_a,
                        subba_name: r.ident_b,
                    },
                };
                Ok(NormalizedReading {
                    timestamp: decode_timestamp(&r.timestamp)?,
                    demand_mwh: r.demand_mwh,
                    units: r.units,
                    identity,
                })
            })
            .collect()
    }

    fn columns(&self) -> [&'static str; 5] {
        let c = self.schema.columns();
        [c[0], c[1], c[2], c[3], c[4]]
    }
}

/// `project.dataset.table` identifiers keep only the table segment.
fn table_name(table_id: &str) -> Result<String> {
    let name = table_id.rsplit('.').next().unwrap_or_default().trim();
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if !valid {
        return Err(AppError::Config(format!(
            "TABLE_ID `{table_id}` must end in a table name of letters, digits and underscores"
        )));
    }
    Ok(name.to_string())
}

fn encode_timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Parse(format!("stored timestamp `{s}`: {e}")))
}
