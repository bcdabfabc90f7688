//! Warehouse row types read back with `sqlx::query_as`.
//! Timestamps are stored as fixed-width RFC 3339 UTC text (microseconds), so
//! text order is time order.

#[derive(Debug, sqlx::FromRow)]
pub struct HistoryRow {
    pub timestamp: String,
    pub demand_mwh: Option<f64>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct ReadingRow {
    pub timestamp: String,
    pub demand_mwh: Option<f64>,
    pub units: String,
    pub ident_a: String,
    pub ident_b: String,
}
