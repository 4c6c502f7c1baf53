use std::collections::{BTreeMap, HashMap};
use std::{sync::OnceLock, time::Duration};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, warn};

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate may have installed a provider already.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Build a `reqwest::Client` with the given per-request timeout.
///
/// A zero timeout leaves reqwest's default (no timeout) in place.
pub fn build_client(request_timeout: Duration) -> reqwest::Client {
    install_rustls_provider();

    let mut builder = reqwest::Client::builder();
    if request_timeout > Duration::ZERO {
        builder = builder.timeout(request_timeout);
    }

    builder.build().unwrap_or_else(|error| {
        warn!(
            error = %error,
            "Failed to create configured HTTP client; falling back to reqwest defaults"
        );
        reqwest::Client::new()
    })
}

/// Convert configured header pairs into a `HeaderMap`.
///
/// Invalid names or values are skipped with a warning.
pub fn build_headers(headers: &HashMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        match (
            name.parse::<HeaderName>(),
            value.parse::<HeaderValue>(),
        ) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => warn!(header = %name, "Skipping invalid HTTP header"),
        }
    }
    map
}

/// Placeholder shown instead of a credential-bearing header value.
pub const REDACTED: &str = "***";

/// Header pairs for diagnostic output, with credential values masked.
///
/// `Authorization`, cookies and any header whose name mentions a token, key,
/// secret or password are replaced by [`REDACTED`].
pub fn redact_headers(headers: &HashMap<String, String>) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            let value = if is_sensitive_header(name) {
                REDACTED.to_string()
            } else {
                value.clone()
            };
            (name.clone(), value)
        })
        .collect()
}

fn is_sensitive_header(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    matches!(
        name.as_str(),
        "authorization" | "proxy-authorization" | "cookie" | "set-cookie"
    ) || ["token", "key", "secret", "password"]
        .iter()
        .any(|marker| name.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_headers_skips_invalid() {
        let mut headers = HashMap::new();
        headers.insert("X-Api-Key".to_string(), "secret".to_string());
        headers.insert("bad header".to_string(), "value".to_string());

        let map = build_headers(&headers);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("x-api-key").unwrap(), "secret");
    }

    #[test]
    fn test_redact_headers_masks_credentials() {
        let headers: HashMap<String, String> = [
            ("Authorization", "Bearer abc"),
            ("X-Service-Token", "t0ken"),
            ("X-API-Key", "k3y"),
            ("Accept", "application/json"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let redacted = redact_headers(&headers);
        assert_eq!(redacted["Authorization"], REDACTED);
        assert_eq!(redacted["X-Service-Token"], REDACTED);
        assert_eq!(redacted["X-API-Key"], REDACTED);
        assert_eq!(redacted["Accept"], "application/json");
    }

    #[test]
    fn test_build_client_zero_timeout() {
        let _client = build_client(Duration::ZERO);
    }
}
