use crate::models::{FeedResponse, NearEarthObject};
use crate::source::NeoSource;
use crate::utils::retry::retry_with_backoff;
use async_trait::async_trait;
use chrono::NaiveDate;
use common::config::SourceConfig;
use common::{Error, Result};
use rquest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// HTTP client for the NASA NeoWs REST API.
pub struct NeoWsClient {
    http: rquest::Client,
    base_url: String,
    api_key: String,
    max_retries: u32,
    retry_base_delay_ms: u64,
}

impl NeoWsClient {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let http = rquest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
            retry_base_delay_ms: config.retry_base_delay_ms,
        })
    }

    fn endpoint(&self, path: &str, params: &[(&str, String)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/{}", self.base_url, path))?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                query.append_pair(key, value);
            }
            query.append_pair("api_key", &self.api_key);
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T> {
        retry_with_backoff(self.max_retries, self.retry_base_delay_ms, || {
            self.get_once(url)
        })
        .await
    }

    async fn get_once<T: DeserializeOwned>(&self, url: &Url) -> Result<T> {
        debug!(path = url.path(), "GET");
        let response = self.http.get(url.as_str()).send().await?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => return Err(Error::RateLimit),
            StatusCode::FORBIDDEN => return Err(Error::Forbidden),
            StatusCode::GATEWAY_TIMEOUT => return Err(Error::GatewayTimeout),
            status if !status.is_success() => {
                return Err(Error::Other(format!(
                    "HTTP {} from {}",
                    status,
                    url.path()
                )));
            }
            _ => {}
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl NeoSource for NeoWsClient {
    async fn feed(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<NearEarthObject>> {
        let url = self.endpoint(
            "feed",
            &[
                ("start_date", start_date.format("%Y-%m-%d").to_string()),
                ("end_date", end_date.format("%Y-%m-%d").to_string()),
            ],
        )?;
        let feed: FeedResponse = self.get_json(&url).await?;
        Ok(feed.into_objects())
    }

    async fn lookup(&self, neo_reference_id: &str) -> Result<NearEarthObject> {
        let url = self.endpoint(&format!("neo/{}", neo_reference_id), &[])?;
        self.get_json(&url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SourceConfig {
        SourceConfig {
            name: "nasa_neows".into(),
            base_url: "https://api.nasa.gov/neo/rest/v1/".into(),
            api_key: "DEMO_KEY".into(),
            max_span_days: 7,
            concurrency: 4,
            max_retries: 0,
            retry_base_delay_ms: 1,
            request_timeout_secs: 5,
        }
    }

    #[test]
    fn test_feed_endpoint_carries_window_and_key() {
        let client = NeoWsClient::new(&config()).unwrap();
        let url = client
            .endpoint(
                "feed",
                &[
                    ("start_date", "2024-01-01".to_string()),
                    ("end_date", "2024-01-08".to_string()),
                ],
            )
            .unwrap();

        assert_eq!(url.path(), "/neo/rest/v1/feed");
        assert_eq!(
            url.query(),
            Some("start_date=2024-01-01&end_date=2024-01-08&api_key=DEMO_KEY")
        );
    }

    #[test]
    fn test_lookup_endpoint_uses_reference_id() {
        let client = NeoWsClient::new(&config()).unwrap();
        let url = client.endpoint("neo/2000433", &[]).unwrap();

        assert_eq!(url.path(), "/neo/rest/v1/neo/2000433");
    }
}
