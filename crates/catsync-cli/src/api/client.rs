//! HTTP client for the product lookup API
//!
//! `EnrichmentApi` is the seam the batch client talks to; `ProductApiClient`
//! is the production implementation over `reqwest`.

use crate::api::{endpoints, types::*};
use crate::config::ApiConfig;
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use catsync_common::EnrichmentResult;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// Looks up enrichment data for a set of keys
#[async_trait]
pub trait EnrichmentApi: Send + Sync {
    /// One request for all `keys`
    ///
    /// Keys the API cannot resolve are simply absent from the result.
    async fn request_products(&self, keys: &[String]) -> Result<Vec<EnrichmentResult>>;
}

/// API client for the product endpoint
pub struct ProductApiClient {
    client: Client,
    base_url: String,
    api_key: String,
    domain: u32,
    stats_days: u32,
    rating: bool,
    buybox: bool,
    product_url_base: String,
}

impl ProductApiClient {
    /// Create a client from configuration
    ///
    /// Fails with a configuration error when no API key is set.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| SyncError::config("api.api_key is not set (CATSYNC_API_KEY)"))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SyncError::config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key,
            domain: config.domain,
            stats_days: config.stats_days,
            rating: config.rating,
            buybox: config.buybox,
            product_url_base: config.product_url_base.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn form(&self, keys: &[String]) -> ProductRequest {
        ProductRequest {
            domain: self.domain,
            stats: self.stats_days,
            rating: u8::from(self.rating),
            buybox: u8::from(self.buybox),
            key: self.api_key.clone(),
            asin: keys.join(","),
        }
    }
}

#[async_trait]
impl EnrichmentApi for ProductApiClient {
    async fn request_products(&self, keys: &[String]) -> Result<Vec<EnrichmentResult>> {
        let url = endpoints::product_url(&self.base_url);

        let response = self
            .client
            .post(&url)
            .form(&self.form(keys))
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() { "timed out" } else { "failed" };
                SyncError::transport(None, format!("request to {} {}: {}", url, kind, e))
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(keys = keys.len(), "Product API rate limit reached");
            return Err(SyncError::RateLimited);
        }
        if status != StatusCode::OK {
            return Err(SyncError::transport(
                Some(status.as_u16()),
                format!("unexpected response from {}", url),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SyncError::transport(Some(status.as_u16()), format!("cannot read response body: {}", e)))?;
        let payload: ProductResponse = serde_json::from_str(&body)
            .map_err(|e| SyncError::transport(Some(status.as_u16()), format!("invalid response body: {}", e)))?;

        if let Some(message) = payload.error_message() {
            return Err(SyncError::api(message));
        }

        debug!(
            requested = keys.len(),
            returned = payload.products.len(),
            tokens_left = ?payload.tokens_left,
            "Product lookup"
        );

        Ok(payload
            .products
            .into_iter()
            .map(|product| product.into_result(&self.product_url_base))
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str) -> ApiConfig {
        ApiConfig {
            base_url: base_url.to_string(),
            api_key: Some("test-key".to_string()),
            ..ApiConfig::default()
        }
    }

    #[test]
    fn test_client_requires_api_key() {
        let mut cfg = config("http://localhost:1");
        cfg.api_key = None;
        let err = ProductApiClient::new(&cfg).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Config);

        cfg.api_key = Some(String::new());
        assert!(ProductApiClient::new(&cfg).is_err());
    }

    #[test]
    fn test_form_parameters() {
        let client = ProductApiClient::new(&config("http://localhost:1")).unwrap();
        let form = client.form(&["A1".to_string(), "B2".to_string()]);
        assert_eq!(form.domain, 5);
        assert_eq!(form.stats, 90);
        assert_eq!(form.rating, 0);
        assert_eq!(form.buybox, 1);
        assert_eq!(form.asin, "A1,B2");
    }

    #[tokio::test]
    async fn test_successful_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/product"))
            .and(body_string_contains("asin=A1%2CB2"))
            .and(body_string_contains("key=test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "products": [{"asin": "A1", "title": "Widget", "stats": {"buyBoxPrice": 500}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ProductApiClient::new(&config(&server.uri())).unwrap();
        let results = client
            .request_products(&["A1".to_string(), "B2".to_string()])
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key, "A1");
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = ProductApiClient::new(&config(&server.uri())).unwrap();
        let keys = vec!["A1".to_string()];

        let err = client.request_products(&keys).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimited);

        let err = client.request_products(&keys).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.to_string().contains("HTTP 500"));
    }

    #[tokio::test]
    async fn test_payload_error_and_bad_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"error": {"message": "Invalid key"}})),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = ProductApiClient::new(&config(&server.uri())).unwrap();
        let keys = vec!["A1".to_string()];

        let err = client.request_products(&keys).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Api);
        assert!(err.to_string().contains("Invalid key"));

        let err = client.request_products(&keys).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn test_connection_failure_is_transport() {
        let client = ProductApiClient::new(&config("http://127.0.0.1:9")).unwrap();
        let err = client.request_products(&["A1".to_string()]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }
}
