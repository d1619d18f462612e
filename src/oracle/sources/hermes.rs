//! Pyth Hermes REST client
//!
//! Requests the latest price update for one feed at a time and extracts the
//! fixed-point quote from the first record that refers to it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::oracle::{FetchError, PriceFetcher};
use crate::types::{FeedId, RawQuote};

pub const HERMES_URL: &str = "https://hermes.pyth.network";

/// Endpoint layout exposed by the oracle service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiFlavor {
    /// `/v2/updates/price/latest`, records under `parsed`
    #[default]
    HermesV2,
    /// `/api/latest_price_feeds`, records as a bare array
    LatestPriceFeeds,
}

impl ApiFlavor {
    fn path(&self) -> &'static str {
        match self {
            ApiFlavor::HermesV2 => "/v2/updates/price/latest",
            ApiFlavor::LatestPriceFeeds => "/api/latest_price_feeds",
        }
    }
}

pub struct HermesClient {
    client: Client,
    base_url: String,
    flavor: ApiFlavor,
    timeout: Duration,
}

impl HermesClient {
    /// Create a client whose every request is bounded by `timeout`
    pub fn new(base_url: &str, flavor: ApiFlavor, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pricewatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            flavor,
            timeout,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, self.flavor.path())
    }

    fn classify(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl PriceFetcher for HermesClient {
    fn name(&self) -> &'static str {
        "pyth"
    }

    async fn fetch(&self, feed_id: &FeedId) -> Result<RawQuote, FetchError> {
        let response = self
            .client
            .get(self.endpoint())
            .query(&[("ids[]", feed_id.as_str())])
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.text().await.map_err(|e| self.classify(e))?;
        let quote = parse_quote(&body, feed_id)?;

        tracing::debug!(
            source = %"pyth",
            feed_id = %feed_id,
            mantissa = quote.mantissa,
            exponent = quote.exponent,
            "Quote received"
        );

        Ok(quote)
    }
}

/// Extract the quote for `feed_id` from a Hermes response body.
///
/// Accepts both the v2 `{"parsed": [...]}` envelope and the legacy bare
/// array. Records carrying an `id` must match the requested feed.
pub fn parse_quote(body: &str, feed_id: &FeedId) -> Result<RawQuote, FetchError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| FetchError::Malformed(format!("invalid JSON: {}", e)))?;

    let records = match &value {
        Value::Array(records) => records,
        Value::Object(map) => map
            .get("parsed")
            .and_then(Value::as_array)
            .ok_or_else(|| FetchError::Malformed("missing parsed records".to_string()))?,
        _ => {
            return Err(FetchError::Malformed(
                "expected an object or array".to_string(),
            ))
        }
    };

    if records.is_empty() {
        return Err(FetchError::Malformed("no price records".to_string()));
    }

    let record = records
        .iter()
        .find(|record| match record.get("id").and_then(Value::as_str) {
            Some(id) => feed_id.matches(id),
            None => true,
        })
        .ok_or_else(|| FetchError::Malformed(format!("no record for feed {}", feed_id)))?;

    let price = record
        .get("price")
        .filter(|p| p.is_object())
        .ok_or_else(|| FetchError::Malformed("missing price object".to_string()))?;

    let mantissa = price
        .get("price")
        .ok_or_else(|| FetchError::Malformed("missing price.price".to_string()))?;
    let mantissa = integer_field(mantissa, "price")?;

    let exponent = price
        .get("expo")
        .or_else(|| price.get("exponent"))
        .ok_or_else(|| FetchError::Malformed("missing price.expo".to_string()))?;
    let exponent = integer_field(exponent, "expo")?;
    let exponent = i32::try_from(exponent).map_err(|_| FetchError::NonNumeric {
        field: "expo",
        value: exponent.to_string(),
    })?;

    let confidence = price
        .get("conf")
        .and_then(|c| integer_field(c, "conf").ok())
        .and_then(|c| u64::try_from(c).ok());
    let publish_time = price
        .get("publish_time")
        .and_then(|t| integer_field(t, "publish_time").ok());

    Ok(RawQuote {
        mantissa,
        exponent,
        publish_time,
        confidence,
    })
}

/// Integers arrive either as JSON numbers or as decimal strings
fn integer_field(value: &Value, field: &'static str) -> Result<i64, FetchError> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    parsed.ok_or_else(|| FetchError::NonNumeric {
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const BERA: &str = "0x962088abcfdbdb6e30db2e340c8cf887d9efb311b1f2f17b155a63dbb6d40265";

    fn feed() -> FeedId {
        FeedId::new(BERA).unwrap()
    }

    fn v2_body(mantissa: Value, expo: Value) -> String {
        serde_json::json!({
            "binary": { "encoding": "hex", "data": [] },
            "parsed": [{
                "id": BERA.trim_start_matches("0x"),
                "price": {
                    "price": mantissa,
                    "conf": "52000",
                    "expo": expo,
                    "publish_time": 1_735_689_600
                },
                "ema_price": { "price": "1", "conf": "1", "expo": -8, "publish_time": 1 }
            }]
        })
        .to_string()
    }

    /// Serve one canned HTTP response on a local port
    async fn serve_once(status_line: &'static str, body: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "{}\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\
             connection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}", addr)
    }

    #[test]
    fn parses_hermes_v2_envelope() {
        let quote = parse_quote(&v2_body("105000000".into(), (-8).into()), &feed()).unwrap();
        assert_eq!(quote.mantissa, 105_000_000);
        assert_eq!(quote.exponent, -8);
        assert_eq!(quote.confidence, Some(52_000));
        assert_eq!(quote.publish_time, Some(1_735_689_600));
    }

    #[test]
    fn parses_legacy_array_with_numeric_mantissa_and_exponent_alias() {
        let body = serde_json::json!([{
            "id": BERA,
            "price": { "price": 123456, "exponent": -2 }
        }])
        .to_string();
        let quote = parse_quote(&body, &feed()).unwrap();
        assert_eq!(quote.mantissa, 123_456);
        assert_eq!(quote.exponent, -2);
        assert_eq!(quote.publish_time, None);
        assert_eq!(quote.confidence, None);
    }

    #[test]
    fn picks_first_record_matching_the_feed() {
        let body = serde_json::json!({
            "parsed": [
                { "id": "c929105a1af143cbfc887c4573947f54422a9ca88a9e622d151b8abdf5c2962f",
                  "price": { "price": "1", "expo": 0 } },
                { "id": BERA.trim_start_matches("0x").to_uppercase(),
                  "price": { "price": "7", "expo": 0 } }
            ]
        })
        .to_string();
        assert_eq!(parse_quote(&body, &feed()).unwrap().mantissa, 7);
    }

    #[test]
    fn rejects_records_for_other_feeds() {
        let body = serde_json::json!({
            "parsed": [{ "id": "deadbeef", "price": { "price": "1", "expo": 0 } }]
        })
        .to_string();
        assert!(matches!(
            parse_quote(&body, &feed()),
            Err(FetchError::Malformed(_))
        ));
    }

    #[test]
    fn empty_or_misshapen_bodies_are_malformed() {
        for body in [
            "",
            "not json",
            "42",
            r#"{"parsed": []}"#,
            "[]",
            r#"{"data": []}"#,
            r#"[{"price": 5}]"#,
            r#"[{"price": {"expo": -8}}]"#,
            r#"[{"price": {"price": "5"}}]"#,
        ] {
            assert!(
                matches!(parse_quote(body, &feed()), Err(FetchError::Malformed(_))),
                "expected malformed for {:?}",
                body
            );
        }
    }

    #[test]
    fn non_numeric_mantissa_or_exponent_is_reported() {
        let err = parse_quote(&v2_body("1.05".into(), (-8).into()), &feed()).unwrap_err();
        assert!(matches!(err, FetchError::NonNumeric { field: "price", .. }));

        let err = parse_quote(&v2_body("105".into(), "minus eight".into()), &feed()).unwrap_err();
        assert!(matches!(err, FetchError::NonNumeric { field: "expo", .. }));

        let err =
            parse_quote(&v2_body("105".into(), 4_294_967_296_i64.into()), &feed()).unwrap_err();
        assert_eq!(err.kind(), "non_numeric");
    }

    #[test]
    fn endpoint_follows_api_flavor() {
        let v2 = HermesClient::new(
            "https://hermes.pyth.network/",
            ApiFlavor::HermesV2,
            Duration::from_secs(10),
        )
        .unwrap();
        assert_eq!(
            v2.endpoint(),
            "https://hermes.pyth.network/v2/updates/price/latest"
        );

        let legacy = HermesClient::new(
            "https://xc-mainnet.pyth.network",
            ApiFlavor::LatestPriceFeeds,
            Duration::from_secs(10),
        )
        .unwrap();
        assert_eq!(
            legacy.endpoint(),
            "https://xc-mainnet.pyth.network/api/latest_price_feeds"
        );
    }

    #[tokio::test]
    async fn fetch_returns_quote_from_live_response() {
        let url = serve_once("HTTP/1.1 200 OK", v2_body("110000000".into(), (-8).into())).await;
        let client = HermesClient::new(&url, ApiFlavor::HermesV2, Duration::from_secs(5)).unwrap();

        let quote = client.fetch(&feed()).await.unwrap();
        assert_eq!(quote.mantissa, 110_000_000);
        assert_eq!(quote.exponent, -8);
    }

    #[tokio::test]
    async fn fetch_maps_error_status() {
        let url = serve_once("HTTP/1.1 503 Service Unavailable", "{}".to_string()).await;
        let client = HermesClient::new(&url, ApiFlavor::HermesV2, Duration::from_secs(5)).unwrap();

        match client.fetch(&feed()).await {
            Err(FetchError::Status(code)) => assert_eq!(code, 503),
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn fetch_times_out_on_silent_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let client = HermesClient::new(
            &format!("http://{}", addr),
            ApiFlavor::HermesV2,
            Duration::from_millis(200),
        )
        .unwrap();

        let err = client.fetch(&feed()).await.unwrap_err();
        assert_eq!(err.kind(), "timeout");
    }

    #[tokio::test]
    async fn fetch_reports_transport_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HermesClient::new(
            &format!("http://{}", addr),
            ApiFlavor::HermesV2,
            Duration::from_secs(2),
        )
        .unwrap();

        let err = client.fetch(&feed()).await.unwrap_err();
        assert_eq!(err.kind(), "transport");
    }
}
