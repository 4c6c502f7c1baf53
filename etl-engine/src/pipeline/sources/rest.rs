//! REST API data source.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::pipeline::context::ExecutionContext;
use crate::pipeline::pagination::PaginationConfig;
use crate::pipeline::traits::{ConfigMap, DataSource};
use crate::utils::http_client::{build_client, build_headers, redact_headers};
use crate::{Error, Result};

/// REST source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestSourceConfig {
    /// Endpoint URL.
    pub url: String,
    /// HTTP method (default: GET).
    #[serde(default = "default_method")]
    pub method: String,
    /// Request headers.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Fixed query parameters sent with every request.
    #[serde(default)]
    pub query_params: HashMap<String, String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Optional pagination; when present the registry builds a paginated source.
    #[serde(default)]
    pub pagination: Option<PaginationConfig>,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Default for RestSourceConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: default_method(),
            headers: HashMap::new(),
            query_params: HashMap::new(),
            timeout_secs: default_timeout(),
            pagination: None,
        }
    }
}

/// Issues one HTTP request per fetch.
///
/// This source never paginates by itself; see
/// [`PaginatedSource`](super::PaginatedSource) for a caller that loops it.
pub struct RestSource {
    config: RestSourceConfig,
    method: Method,
    client: Client,
}

impl RestSource {
    /// Create a new REST source, validating its configuration.
    pub fn new(config: RestSourceConfig) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(Error::config("rest_api source requires a url"));
        }
        reqwest::Url::parse(&config.url)
            .map_err(|e| Error::config(format!("invalid rest_api url '{}': {}", config.url, e)))?;

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

    pub fn config(&self) -> &RestSourceConfig {
        &self.config
    }

    /// Fetch with extra query parameters merged over the configured ones.
    pub async fn fetch_with_params(
        &self,
        ctx: &ExecutionContext,
        extra_params: &BTreeMap<String, String>,
    ) -> Result<Vec<u8>> {
        let mut params: BTreeMap<&str, &str> = self
            .config
            .query_params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        for (k, v) in extra_params {
            params.insert(k.as_str(), v.as_str());
        }

        let request = self
            .client
            .request(self.method.clone(), &self.config.url)
            .headers(build_headers(&self.config.headers))
            .query(&params);

        debug!(url = %self.config.url, method = %self.method, "Fetching from REST source");

        ctx.run(async move {
            let response = request.send().await?;
            let status = response.status();
            let body = response.bytes().await?;

            if !status.is_success() {
                let body = String::from_utf8_lossy(&body).into_owned();
                warn!(status = status.as_u16(), "REST source returned non-success status");
                return Err(Error::HttpStatus {
                    status: status.as_u16(),
                    body,
                });
            }

            Ok(body.to_vec())
        })
        .await
    }
}

#[async_trait]
impl DataSource for RestSource {
    fn component_type(&self) -> &'static str {
        "rest_api"
    }

    async fn fetch(&self, ctx: &ExecutionContext) -> Result<Vec<u8>> {
        self.fetch_with_params(ctx, &BTreeMap::new()).await
    }

    fn source_config(&self) -> ConfigMap {
        let mut map = ConfigMap::new();
        map.insert("url".into(), json!(self.config.url));
        map.insert("method".into(), json!(self.method.as_str()));
        map.insert("headers".into(), json!(redact_headers(&self.config.headers)));
        map.insert("query_params".into(), json!(self.config.query_params));
        map.insert("timeout_secs".into(), json!(self.config.timeout_secs));
        if let Some(pagination) = &self.config.pagination {
            map.insert(
                "pagination".into(),
                serde_json::to_value(pagination).unwrap_or(Value::Null),
            );
        }
        map
    }
}
