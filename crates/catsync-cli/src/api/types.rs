//! API request and response types
//!
//! Matches the product lookup API's form parameters and JSON payload.

use super::endpoints;
use catsync_common::EnrichmentResult;
use serde::{Deserialize, Serialize};

/// Output field carrying the product title
pub const FIELD_TITLE: &str = "title";

/// Output field carrying the current buy-box price
pub const FIELD_BUYBOX_PRICE: &str = "buybox_price";

/// Output field carrying the public product page URL
pub const FIELD_URL: &str = "url";

/// Enriched fields in the order they are written after the key column
pub const OUTPUT_FIELDS: [&str; 3] = [FIELD_TITLE, FIELD_BUYBOX_PRICE, FIELD_URL];

/// Form body of a product lookup
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductRequest {
    pub domain: u32,
    pub stats: u32,
    pub rating: u8,
    pub buybox: u8,
    pub key: String,
    /// Comma-joined keys
    pub asin: String,
}

/// Response from the product endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    /// Present when the request failed at the application level
    #[serde(default)]
    pub error: Option<serde_json::Value>,

    #[serde(default)]
    pub products: Vec<Product>,

    /// Request tokens remaining after this call
    #[serde(default)]
    pub tokens_left: Option<i64>,
}

impl ProductResponse {
    /// Message of the application-level error, if any
    pub fn error_message(&self) -> Option<String> {
        match self.error.as_ref()? {
            serde_json::Value::Null | serde_json::Value::Bool(false) => None,
            serde_json::Value::Object(obj) => Some(
                obj.get("message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| serde_json::Value::Object(obj.clone()).to_string()),
            ),
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// One catalog item
#[derive(Debug, Clone, Deserialize)]
pub struct Product {
    pub asin: String,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub stats: Option<ProductStats>,
}

/// Aggregated price statistics for a product
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductStats {
    #[serde(default)]
    pub buy_box_price: Option<i64>,
}

impl Product {
    /// Convert into the enriched fields written back to the table
    pub fn into_result(self, page_base: &str) -> EnrichmentResult {
        let url = endpoints::product_page_url(page_base, &self.asin);
        let price = self.stats.and_then(|s| s.buy_box_price);
        EnrichmentResult::new(self.asin)
            .with_field(FIELD_TITLE, self.title)
            .with_field(FIELD_BUYBOX_PRICE, price)
            .with_field(FIELD_URL, url)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use catsync_common::CellValue;

    #[test]
    fn test_parse_products() {
        let json = r#"{
            "tokensLeft": 120,
            "products": [
                {"asin": "A1", "title": "Widget", "stats": {"buyBoxPrice": 1280, "current": [1, 2]}},
                {"asin": "C3", "title": null}
            ]
        }"#;
        let resp: ProductResponse = serde_json::from_str(json).unwrap();
        assert!(resp.error_message().is_none());
        assert_eq!(resp.tokens_left, Some(120));
        assert_eq!(resp.products.len(), 2);

        let mut products = resp.products.into_iter();
        let a1 = products.next().unwrap().into_result("https://example.test/dp/");
        assert_eq!(a1.key, "A1");
        assert_eq!(a1.field(FIELD_TITLE), CellValue::text("Widget"));
        assert_eq!(a1.field(FIELD_BUYBOX_PRICE), CellValue::Number(1280.0));
        assert_eq!(a1.field(FIELD_URL), CellValue::text("https://example.test/dp/A1"));

        let c3 = products.next().unwrap().into_result("https://example.test/dp/");
        assert_eq!(c3.field(FIELD_TITLE), CellValue::Empty);
        assert_eq!(c3.field(FIELD_BUYBOX_PRICE), CellValue::Empty);
    }

    #[test]
    fn test_error_payload() {
        let resp: ProductResponse =
            serde_json::from_str(r#"{"error": {"type": "invalidKey", "message": "Invalid key"}}"#)
                .unwrap();
        assert_eq!(resp.error_message().as_deref(), Some("Invalid key"));
        assert!(resp.products.is_empty());

        let resp: ProductResponse = serde_json::from_str(r#"{"error": null, "products": []}"#).unwrap();
        assert!(resp.error_message().is_none());

        let resp: ProductResponse = serde_json::from_str(r#"{"error": {"type": "x"}}"#).unwrap();
        assert!(resp.error_message().unwrap().contains("\"type\""));
    }

    #[test]
    fn test_request_form_encoding() {
        let req = ProductRequest {
            domain: 5,
            stats: 90,
            rating: 0,
            buybox: 1,
            key: "secret".into(),
            asin: "A1,B2".into(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["asin"], "A1,B2");
        assert_eq!(json["buybox"], 1);
    }
}
