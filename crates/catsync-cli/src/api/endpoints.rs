//! API endpoint URL construction

/// Product lookup endpoint
pub fn product_url(base_url: &str) -> String {
    format!("{}/product", base_url.trim_end_matches('/'))
}

/// Public product page for a catalog key
pub fn product_page_url(page_base: &str, key: &str) -> String {
    format!("{}{}", page_base, key)
}
