use std::time::Duration;

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use tracing::{debug, info, warn};

use crate::config::{FacetFilter, EIA_PAGE_LENGTH, HTTP_TIMEOUT_SECS};
use crate::error::{AppError, Result};
use crate::types::{RawReading, WarehouseSchema};

/// Format the EIA API uses for hourly `start`/`end` bounds.
pub const PERIOD_PARAM_FORMAT: &str = "%Y-%m-%dT%H";

/// Inclusive hourly window requested from the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FetchWindow {
    /// Both bounds are truncated to the hour.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: truncate_to_hour(start),
            end: truncate_to_hour(end),
        }
    }

    /// The `days` leading up to `now`.
    pub fn trailing(now: DateTime<Utc>, days: i64) -> Self {
        Self::new(now - TimeDelta::days(days), now)
    }

    pub fn start_param(&self) -> String {
        self.start.format(PERIOD_PARAM_FORMAT).to_string()
    }

    pub fn end_param(&self) -> String {
        self.end.format(PERIOD_PARAM_FORMAT).to_string()
    }
}

pub fn truncate_to_hour(t: DateTime<Utc>) -> DateTime<Utc> {
    t.duration_trunc(TimeDelta::hours(1)).unwrap_or(t)
}

/// Client for the EIA v2 hourly RTO routes.
pub struct EiaClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    schema: WarehouseSchema,
    facets: FacetFilter,
}

impl EiaClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        schema: WarehouseSchema,
        facets: FacetFilter,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            schema,
            facets,
        })
    }

    pub fn url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.schema.eia_route()
        )
    }

    /// Query string for one page, starting at offset 0.
    pub fn query_params(&self, window: &FetchWindow) -> Vec<(String, String)> {
        let mut params = vec![
            ("api_key".to_string(), self.api_key.clone()),
            ("frequency".to_string(), "hourly".to_string()),
            ("data[0]".to_string(), "value".to_string()),
        ];
        params.extend(self.facets.query_params());
        params.extend([
            ("start".to_string(), window.start_param()),
            ("end".to_string(), window.end_param()),
            ("sort[0][column]".to_string(), "period".to_string()),
            ("sort[0][direction]".to_string(), "asc".to_string()),
            ("offset".to_string(), "0".to_string()),
            ("length".to_string(), EIA_PAGE_LENGTH.to_string()),
        ]);
        params
    }

    /// Fetch every row of `window` in a single call.
    pub async fn fetch(&self, window: &FetchWindow) -> Result<Vec<RawReading>> {
        let url = self.url();
        info!(
            start = %window.start_param(),
            end = %window.end_param(),
            "Querying EIA API at {url}"
        );

        let resp = self
            .client
            .get(&url)
            .query(&self.query_params(window))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Fetch {
                status: status.as_u16(),
                body,
            });
        }
        debug!("EIA API call successful ({status})");

        let body: serde_json::Value = resp.json().await?;
        let page = parse_response(body)?;

        if page.rows.is_empty() {
            info!("No data returned for this window");
        } else if let Some(total) = page.total.filter(|t| *t > page.rows.len()) {
            warn!(
                total,
                returned = page.rows.len(),
                "EIA reported more rows than one page holds; window truncated"
            );
        }

        Ok(page.rows)
    }
}

#[derive(Debug)]
pub struct Page {
    pub rows: Vec<RawReading>,
    /// `response.total`, when the API reported it.
    pub total: Option<usize>,
}

/// Extract `response.data` from an EIA body.
pub fn parse_response(body: serde_json::Value) -> Result<Page> {
    let response = body
        .get("response")
        .ok_or_else(|| AppError::Parse("`response` missing in JSON".to_string()))?;

    let data = response
        .get("data")
        .ok_or_else(|| AppError::Parse("`response.data` missing in JSON".to_string()))?;

    let items = data
        .as_array()
        .ok_or_else(|| AppError::Parse("`response.data` is not an array".to_string()))?;

    let rows = items
        .iter()
        .map(|item| match item {
            serde_json::Value::Object(map) => Ok(RawReading(map.clone())),
            other => Err(AppError::Parse(format!("data row is not an object: {other}"))),
        })
        .collect::<Result<Vec<_>>>()?;

    // The API has returned `total` both as a number and as a string.
    let total = response.get("total").and_then(|t| match t {
        serde_json::Value::Number(n) => n.as_u64().map(|n| n as usize),
        serde_json::Value::String(s) => s.parse::<usize>().ok(),
        _ => None,
    });

    Ok(Page { rows, total })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::{extract::Query, http::StatusCode, routing::get, Json, Router};
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn region_facets() -> FacetFilter {
        FacetFilter::Region {
            respondent: "CISO".to_string(),
            kind: "D".to_string(),
        }
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn window() -> FetchWindow {
        FetchWindow::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 1, 5, 23, 0, 0).unwrap(),
        )
    }

    #[test]
    fn window_truncates_to_the_hour() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 14, 37, 12).unwrap();
        let w = FetchWindow::trailing(now, 7);
        assert_eq!(w.end_param(), "2025-03-10T14");
        assert_eq!(w.start_param(), "2025-03-03T14");
    }

    #[test]
    fn query_params_carry_window_facets_and_page_length() {
        let client = EiaClient::new("http://x", "key", WarehouseSchema::Region, region_facets()).unwrap();
        let params: HashMap<String, String> = client.query_params(&window()).into_iter().collect();
        assert_eq!(params["start"], "2025-01-01T00");
        assert_eq!(params["end"], "2025-01-05T23");
        assert_eq!(params["facets[respondent][]"], "CISO");
        assert_eq!(params["length"], "5000");
        assert_eq!(params["sort[0][direction]"], "asc");
    }

    #[test]
    fn url_follows_schema_route() {
        let client = EiaClient::new(
            "https://api.eia.gov/v2/",
            "key",
            WarehouseSchema::SubRegion,
            FacetFilter::SubRegion {
                parent: "PJM".to_string(),
                subba: "AE".to_string(),
            },
        )
        .unwrap();
        assert_eq!(
            client.url(),
            "https://api.eia.gov/v2/electricity/rto/region-sub-ba-data/data/"
        );
    }

    #[test]
    fn parse_response_missing_nested_keys_is_fatal() {
        assert!(matches!(parse_response(json!({})), Err(AppError::Parse(_))));
        assert!(matches!(
            parse_response(json!({"response": {"total": 0}})),
            Err(AppError::Parse(_))
        ));
        assert!(matches!(
            parse_response(json!({"response": {"data": "nope"}})),
            Err(AppError::Parse(_))
        ));
    }

    #[test]
    fn parse_response_accepts_string_total() {
        let page = parse_response(json!({
            "response": {"total": "2", "data": [{"period": "2025-01-01T00"}, {"period": "2025-01-01T01"}]}
        }))
        .unwrap();
        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.total, Some(2));
    }

    #[test]
    fn parse_response_empty_data_is_not_an_error() {
        let page = parse_response(json!({"response": {"data": []}})).unwrap();
        assert!(page.rows.is_empty());
    }

    #[tokio::test]
    async fn fetch_returns_rows_for_matching_query() {
        let app = Router::new().route(
            "/electricity/rto/region-data/data/",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                assert_eq!(q.get("api_key").map(String::as_str), Some("secret"));
                assert_eq!(q.get("facets[type][]").map(String::as_str), Some("D"));
                Json(json!({
                    "response": {
                        "total": 1,
                        "data": [{
                            "period": "2025-01-01T00",
                            "respondent": "CISO",
                            "respondent-name": "California Independent System Operator",
                            "type": "D",
                            "value": "25000",
                            "value-units": "megawatthours"
                        }]
                    }
                }))
            }),
        );
        let base = serve(app).await;

        let client = EiaClient::new(base, "secret", WarehouseSchema::Region, region_facets()).unwrap();
        let rows = client.fetch(&window()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("respondent"), Some(&json!("CISO")));
    }

    #[tokio::test]
    async fn fetch_non_success_status_is_fatal() {
        let app = Router::new().route(
            "/electricity/rto/region-data/data/",
            get(|| async { (StatusCode::FORBIDDEN, "invalid api_key") }),
        );
        let base = serve(app).await;

        let client = EiaClient::new(base, "bad", WarehouseSchema::Region, region_facets()).unwrap();
        match client.fetch(&window()).await {
            Err(AppError::Fetch { status, body }) => {
                assert_eq!(status, 403);
                assert_eq!(body, "invalid api_key");
            }
            other => panic!("expected Fetch error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetch_malformed_body_is_fatal() {
        let app = Router::new().route(
            "/electricity/rto/region-data/data/",
            get(|| async { Json(json!({"error": "something"})) }),
        );
        let base = serve(app).await;

        let client = EiaClient::new(base, "k", WarehouseSchema::Region, region_facets()).unwrap();
        assert!(matches!(client.fetch(&window()).await, Err(AppError::Parse(_))));
    }
}
