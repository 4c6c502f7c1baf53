//! Internal HTTP API destination.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::pipeline::context::ExecutionContext;
use crate::pipeline::traits::{ConfigMap, Destination};
use crate::utils::http_client::{build_client, build_headers, redact_headers};
use crate::{Error, Result};

/// Internal API destination configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalApiConfig {
    /// Target URL.
    pub url: String,
    /// HTTP method (default: POST).
    #[serde(default = "default_method")]
    pub method: String,
    /// Custom headers.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_method() -> String {
    "POST".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Default for InternalApiConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: default_method(),
            headers: HashMap::new(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Sends each payload as the body of one HTTP request.
pub struct InternalApiDestination {
    config: InternalApiConfig,
    method: Method,
    client: Client,
}

impl InternalApiDestination {
    /// Create a new destination, validating its configuration.
    pub fn new(config: InternalApiConfig) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(Error::config("internal_api destination requires a url"));
        }
        reqwest::Url::parse(&config.url).map_err(|e| {
            Error::config(format!("invalid internal_api url '{}': {}", config.url, e))
        })?;

        let method = config
            .method
            .to_uppercase()
            .parse::<Method>()
            .map_err(|_| Error::config(format!("invalid HTTP method: {}", config.method)))?;

        let client = build_client(Duration::from_secs(config.timeout_secs));

        Ok(Self {
            config,
            method,
            client,
        })
    }

    pub fn config(&self) -> &InternalApiConfig {
        &self.config
    }
}

#[async_trait]
impl Destination for InternalApiDestination {
    fn component_type(&self) -> &'static str {
        "internal_api"
    }

    async fn store(&self, ctx: &ExecutionContext, data: &[u8]) -> Result<()> {
        let mut headers = build_headers(&self.config.headers);
        if !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        let request = self
            .client
            .request(self.method.clone(), &self.config.url)
            .headers(headers)
            .body(data.to_vec());

        ctx.run(async move {
            let response = request.send().await?;
            let status = response.status();

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                warn!("Internal API store failed: {} - {}", status, body);
                return Err(Error::HttpStatus {
                    status: status.as_u16(),
                    body,
                });
            }

            debug!(url = %self.config.url, bytes = data.len(), "Payload stored");
            Ok(())
        })
        .await
    }

    fn dest_config(&self) -> ConfigMap {
        let mut map = ConfigMap::new();
        map.insert("url".into(), json!(self.config.url));
        map.insert("method".into(), json!(self.method.as_str()));
        map.insert("headers".into(), json!(redact_headers(&self.config.headers)));
        map.insert("timeout_secs".into(), json!(self.config.timeout_secs));
        map
    }
}
