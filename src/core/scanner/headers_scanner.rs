// src/core/scanner/headers_scanner.rs

use std::collections::BTreeMap;
use std::error::Error as StdError;

use reqwest::header::HeaderMap;
use reqwest::redirect::Policy;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::ScannerSettings;
use crate::core::models::{ErrorCategory, HttpHeadersReport, SecurityHeadersSummary, ToolError};

const MAX_REDIRECTS: usize = 10;
const INVALID_UTF8: &str = "[Invalid UTF-8]";

/// Reads a header, joining repeated values with `", "`.
///
/// Non-UTF-8 values are reported as a placeholder so the header still counts
/// as present.
fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let values: Vec<&str> = headers
        .get_all(name)
        .iter()
        .map(|value| {
            value.to_str().unwrap_or_else(|_| {
                warn!(header_name = name, "Header found but contained invalid UTF-8.");
                INVALID_UTF8
            })
        })
        .collect();

    if values.is_empty() {
        debug!(header_name = name, "Header not found.");
        None
    } else {
        Some(values.join(", "))
    }
}

/// Fetches `target_url` (following redirects) and reports on its response headers.
pub async fn run_headers_scan(
    target_url: &Url,
    settings: &ScannerSettings,
) -> Result<HttpHeadersReport, ToolError> {
    info!(target = %target_url, "Starting headers scan.");

    let client = reqwest::Client::builder()
        .user_agent(settings.user_agent.as_str())
        .timeout(settings.network_timeout())
        .redirect(Policy::limited(MAX_REDIRECTS))
        .build()
        .map_err(|e| {
            error!(error = %e, "Failed to build HTTP client for headers scan.");
            ToolError::new(ErrorCategory::RequestError, format!("Failed to build HTTP client: {}", e))
        })?;

    let response = client.get(target_url.clone()).send().await.map_err(|e| {
        error!(url = %target_url, error = %e, "HTTP request failed for headers scan.");
        classify_request_error(&e)
    })?;

    info!(status = %response.status(), final_url = %response.url(), "Received HTTP response for headers scan.");
    let headers = response.headers();
    let report = HttpHeadersReport {
        final_url: response.url().to_string(),
        status_code: response.status().as_u16(),
        all_headers: collect_headers(headers),
        security_headers_summary: summarize_security_headers(headers),
    };

    let missing = report
        .security_headers_summary
        .entries()
        .iter()
        .filter(|(_, value)| value.is_none())
        .count();
    info!(headers = report.all_headers.len(), missing, "Headers scan finished.");
    Ok(report)
}

/// Every response header, keyed by its lowercase name.
pub fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .keys()
        .filter_map(|name| header_value(headers, name.as_str()).map(|value| (name.as_str().to_string(), value)))
        .collect()
}

/// Extracts the security-relevant headers. `Feature-Policy` stands in for a
/// missing `Permissions-Policy`.
pub fn summarize_security_headers(headers: &HeaderMap) -> SecurityHeadersSummary {
    SecurityHeadersSummary {
        strict_transport_security: header_value(headers, "strict-transport-security"),
        content_security_policy: header_value(headers, "content-security-policy"),
        x_content_type_options: header_value(headers, "x-content-type-options"),
        x_frame_options: header_value(headers, "x-frame-options"),
        referrer_policy: header_value(headers, "referrer-policy"),
        permissions_policy: header_value(headers, "permissions-policy")
            .or_else(|| header_value(headers, "feature-policy")),
        server: header_value(headers, "server"),
        x_powered_by: header_value(headers, "x-powered-by"),
    }
}

fn classify_request_error(e: &reqwest::Error) -> ToolError {
    if e.is_timeout() {
        ToolError::new(ErrorCategory::Timeout, format!("Timeout during HTTP request: {}", e))
    } else if e.is_connect() {
        if e.source().is_some_and(mentions_tls) {
            ToolError::new(ErrorCategory::SslError, format!("SSL Error during HTTP request: {}", e))
        } else {
            ToolError::new(ErrorCategory::ConnectionError, format!("Connection Error during HTTP request: {}", e))
        }
    } else {
        ToolError::new(ErrorCategory::RequestError, format!("An error occurred during HTTP request: {}", e))
    }
}

// reqwest has no TLS predicate. The top-level message embeds the URL, so only
// the cause chain is inspected.
fn mentions_tls(error: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(error);
    while let Some(err) = current {
        let text = err.to_string().to_lowercase();
        if text.contains("certificate") || text.contains("tls") || text.contains("ssl") {
            return true;
        }
        current = err.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_missing_headers_are_null() {
        let map = headers(&[("content-type", "text/html"), ("x-frame-options", "DENY")]);
        let summary = summarize_security_headers(&map);

        assert_eq!(summary.x_frame_options.as_deref(), Some("DENY"));
        assert!(summary.strict_transport_security.is_none());
        assert!(summary.content_security_policy.is_none());
    }

    #[test]
    fn test_feature_policy_fallback() {
        let map = headers(&[("feature-policy", "camera 'none'")]);
        assert_eq!(
            summarize_security_headers(&map).permissions_policy.as_deref(),
            Some("camera 'none'")
        );

        let both = headers(&[("feature-policy", "camera 'none'"), ("permissions-policy", "camera=()")]);
        assert_eq!(summarize_security_headers(&both).permissions_policy.as_deref(), Some("camera=()"));
    }

    #[test]
    fn test_repeated_headers_are_joined() {
        let map = headers(&[("set-cookie", "a=1"), ("set-cookie", "b=2"), ("server", "nginx")]);
        let all = collect_headers(&map);

        assert_eq!(all.get("set-cookie").map(String::as_str), Some("a=1, b=2"));
        assert_eq!(all.get("server").map(String::as_str), Some("nginx"));
    }

    #[test]
    fn test_invalid_utf8_uses_placeholder() {
        let mut map = HeaderMap::new();
        map.insert("x-powered-by", HeaderValue::from_bytes(&[0xff, 0xfe]).unwrap());
        assert_eq!(summarize_security_headers(&map).x_powered_by.as_deref(), Some(INVALID_UTF8));
    }

    #[tokio::test]
    async fn test_refused_connection_is_a_connection_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = Url::parse(&format!("http://127.0.0.1:{}/", port)).unwrap();
        let error = run_headers_scan(&url, &ScannerSettings::default()).await.unwrap_err();
        assert_eq!(error.category, ErrorCategory::ConnectionError);
    }
}
