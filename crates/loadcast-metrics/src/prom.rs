//! Prometheus HTTP API client.
//!
//! Issues instant and range queries against `/api/v1/query`. The instant
//! query aggregates across all emitters with `sum(<metric>)`; the range
//! query uses a range-vector selector over the lookback window.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http_body_util::{BodyExt, Empty};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::Deserialize;
use tracing::debug;

use crate::error::{MetricsError, MetricsResult};
use crate::source::{MetricSample, MetricsSource};

/// Prometheus-backed metrics source.
pub struct PromClient {
    base_url: String,
    http: Client<HttpConnector, Empty<Bytes>>,
    timeout: Duration,
}

impl PromClient {
    /// Create a client for the Prometheus instance at `base_url`
    /// (e.g. `http://prometheus:9090`).
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: Client::builder(TokioExecutor::new()).build_http(),
            timeout,
        }
    }

    /// GET the given URI and return the body, within the client timeout.
    async fn fetch(&self, uri: &str) -> MetricsResult<Bytes> {
        let uri: hyper::Uri = uri
            .parse()
            .map_err(|e: http::uri::InvalidUri| MetricsError::Http(e.to_string()))?;

        let request = async {
            let resp = self
                .http
                .get(uri)
                .await
                .map_err(|e| MetricsError::Http(e.to_string()))?;
            if !resp.status().is_success() {
                return Err(MetricsError::BadResponse(format!(
                    "status {}",
                    resp.status()
                )));
            }
            let body = resp
                .into_body()
                .collect()
                .await
                .map_err(|e| MetricsError::Http(e.to_string()))?;
            Ok(body.to_bytes())
        };

        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(MetricsError::Timeout(self.timeout.as_secs())),
        }
    }
}

#[async_trait]
impl MetricsSource for PromClient {
    async fn instant(&self, metric: &str) -> MetricsResult<f64> {
        let query = format!("sum({metric})");
        let uri = format!(
            "{}/api/v1/query?query={}",
            self.base_url,
            encode_query(&query)
        );
        let body = self.fetch(&uri).await?;
        let value = parse_instant(&body)?;
        debug!(%metric, value, "instant query");
        Ok(value)
    }

    async fn range(&self, metric: &str, lookback: Duration) -> MetricsResult<Vec<MetricSample>> {
        let query = format!("{metric}[{}s]", lookback.as_secs());
        let uri = format!(
            "{}/api/v1/query?query={}",
            self.base_url,
            encode_query(&query)
        );
        let body = self.fetch(&uri).await?;
        let samples = parse_range(&body)?;
        debug!(%metric, samples = samples.len(), "range query");
        Ok(samples)
    }
}

// ── Response parsing ───────────────────────────────────────────

#[derive(Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: Option<ApiData>,
}

#[derive(Deserialize)]
struct ApiData {
    #[serde(default)]
    result: Vec<ApiResult>,
}

#[derive(Deserialize, Default)]
struct ApiResult {
    /// Instant vector: `[timestamp, "value"]`.
    #[serde(default)]
    value: Option<(f64, String)>,
    /// Range vector: `[[timestamp, "value"], ...]`.
    #[serde(default)]
    values: Vec<(f64, String)>,
}

fn decode(body: &[u8]) -> MetricsResult<ApiData> {
    let resp: ApiResponse =
        serde_json::from_slice(body).map_err(|e| MetricsError::BadResponse(e.to_string()))?;
    if resp.status != "success" {
        return Err(MetricsError::BadResponse(format!(
            "query status {:?}",
            resp.status
        )));
    }
    resp.data
        .ok_or_else(|| MetricsError::BadResponse("missing data field".to_string()))
}

/// Extract the single scalar from an instant-vector response.
fn parse_instant(body: &[u8]) -> MetricsResult<f64> {
    let data = decode(body)?;
    let (_, raw) = data
        .result
        .first()
        .and_then(|r| r.value.as_ref())
        .ok_or_else(|| MetricsError::BadResponse("empty instant result".to_string()))?;
    raw.parse::<f64>()
        .map_err(|e| MetricsError::BadResponse(format!("non-numeric sample {raw:?}: {e}")))
}

/// Extract ordered samples from a range-vector (matrix) response.
///
/// An empty result set is not an error here: the caller decides whether
/// the window is usable.
fn parse_range(body: &[u8]) -> MetricsResult<Vec<MetricSample>> {
    let data = decode(body)?;
    let mut samples = Vec::new();
    if let Some(series) = data.result.first() {
        for (epoch, raw) in &series.values {
            let timestamp = epoch_to_utc(*epoch)?;
            let value = raw.parse::<f64>().map_err(|e| {
                MetricsError::BadResponse(format!("non-numeric sample {raw:?}: {e}"))
            })?;
            samples.push(MetricSample { timestamp, value });
        }
    }
    Ok(samples)
}

fn epoch_to_utc(epoch: f64) -> MetricsResult<DateTime<Utc>> {
    let secs = epoch.trunc() as i64;
    let nanos = (epoch.fract() * 1e9) as u32;
    DateTime::from_timestamp(secs, nanos)
        .ok_or_else(|| MetricsError::BadResponse(format!("timestamp {epoch} out of range")))
}

/// Percent-encode a PromQL expression for use as a query parameter.
fn encode_query(q: &str) -> String {
    let mut out = String::with_capacity(q.len());
    for b in q.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_instant_vector() {
        let body = br#"{"status":"success","data":{"resultType":"vector",
            "result":[{"metric":{},"value":[1700000000.5,"42.5"]}]}}"#;
        assert_eq!(parse_instant(body).unwrap(), 42.5);
    }

    #[test]
    fn parse_instant_empty_result_is_error() {
        let body = br#"{"status":"success","data":{"resultType":"vector","result":[]}}"#;
        assert!(matches!(
            parse_instant(body),
            Err(MetricsError::BadResponse(_))
        ));
    }

    #[test]
    fn parse_instant_error_status() {
        let body = br#"{"status":"error","errorType":"bad_data","error":"boom"}"#;
        assert!(matches!(
            parse_instant(body),
            Err(MetricsError::BadResponse(_))
        ));
    }

    #[test]
    fn parse_instant_non_numeric_value() {
        let body = br#"{"status":"success","data":{"resultType":"vector",
            "result":[{"metric":{},"value":[1700000000,"NaN-ish"]}]}}"#;
        assert!(matches!(
            parse_instant(body),
            Err(MetricsError::BadResponse(_))
        ));
    }

    #[test]
    fn parse_instant_garbage_body() {
        assert!(matches!(
            parse_instant(b"not json"),
            Err(MetricsError::BadResponse(_))
        ));
    }

    #[test]
    fn parse_range_matrix() {
        let body = br#"{"status":"success","data":{"resultType":"matrix",
            "result":[{"metric":{},"values":[[1700000000,"1.0"],[1700000060,"2.5"]]}]}}"#;
        let samples = parse_range(body).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].value, 1.0);
        assert_eq!(samples[1].value, 2.5);
        assert!(samples[0].timestamp < samples[1].timestamp);
    }

    #[test]
    fn parse_range_empty_result_is_ok() {
        let body = br#"{"status":"success","data":{"resultType":"matrix","result":[]}}"#;
        assert!(parse_range(body).unwrap().is_empty());
    }

    #[test]
    fn encode_query_escapes_promql() {
        assert_eq!(encode_query("sum(rps)"), "sum%28rps%29");
        assert_eq!(encode_query("rps[86400s]"), "rps%5B86400s%5D");
        assert_eq!(encode_query("plain_metric"), "plain_metric");
    }
}
