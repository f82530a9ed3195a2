//! HTTP key source.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use url::Url;

use super::KeySource;
use crate::{
    config::{ConfigError, HttpSourceConfig},
    error::{JwksError, Result},
    key_set::{FetchResult, decode_key_set},
};

/// A completed HTTP response, reduced to what key-set decoding needs.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Raw `Cache-Control` header value, if present.
    pub cache_control: Option<String>,
    /// Response body.
    pub body: Bytes,
}

/// HTTP GET capability used by [`HttpKeySource`].
///
/// Timeouts and TLS belong to the implementation; the key source adds none.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Issues a GET request to `url`.
    async fn get(&self, url: &Url) -> Result<HttpResponse>;
}

#[async_trait]
impl<T: HttpTransport + ?Sized> HttpTransport for std::sync::Arc<T> {
    async fn get(&self, url: &Url) -> Result<HttpResponse> {
        (**self).get(url).await
    }
}

#[async_trait]
impl HttpTransport for reqwest::Client {
    async fn get(&self, url: &Url) -> Result<HttpResponse> {
        let response = reqwest::Client::get(self, url.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let status = response.status().as_u16();
        let cache_control = response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response.bytes().await?;
        Ok(HttpResponse { status, cache_control, body })
    }
}

/// Fetches key sets from absolute `http`/`https` URLs.
///
/// The freshness hint comes from the response's `Cache-Control: max-age`
/// directive. A missing header, `no-cache` or `no-store` yields a zero TTL,
/// which leaves the lifetime decision to the cache. A [`KeySetCache`] keeps
/// such a document for its `default_expiration`, even when the provider
/// asked not to store it.
///
/// [`KeySetCache`]: crate::KeySetCache
#[derive(Debug, Clone)]
pub struct HttpKeySource<T = reqwest::Client> {
    transport: T,
}

impl HttpKeySource<reqwest::Client> {
    /// Builds a source backed by a `reqwest` client configured from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid or the client
    /// cannot be built.
    pub fn from_config(config: &HttpSourceConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self { transport: client })
    }
}

impl<T: HttpTransport> HttpKeySource<T> {
    /// Builds a source over any GET capability.
    pub fn with_transport(transport: T) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl<T: HttpTransport> KeySource for HttpKeySource<T> {
    #[tracing::instrument(skip(self), fields(variant = "http"))]
    async fn fetch(&self, source_id: &str) -> Result<FetchResult> {
        let url = Url::parse(source_id)
            .map_err(|e| JwksError::invalid_source_id(source_id, e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(JwksError::invalid_source_id(
                source_id,
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }

        let response = self.transport.get(&url).await.inspect_err(|err| {
            tracing::warn!(error = %err, "key set request failed");
        })?;
        if !(200..300).contains(&response.status) {
            tracing::warn!(status = response.status, "key set endpoint returned an error status");
            return Err(JwksError::http_status(response.status));
        }

        let ttl = response.cache_control.as_deref().map(max_age).unwrap_or_default();
        let keys = decode_key_set(&response.body)?;
        if ttl.is_zero() {
            tracing::debug!(
                cache_control = response.cache_control.as_deref(),
                "no freshness window declared, cache default expiration applies"
            );
        }
        tracing::debug!(keys = keys.len(), ttl_secs = ttl.as_secs(), "fetched key set");
        Ok(FetchResult::new(keys, ttl))
    }
}

/// Extracts the freshness window from a `Cache-Control` value.
fn max_age(cache_control: &str) -> Duration {
    let mut max_age = None;
    for directive in cache_control.split(',') {
        let directive = directive.trim().to_ascii_lowercase();
        if directive == "no-store" || directive == "no-cache" {
            return Duration::ZERO;
        }
        if let Some(seconds) = directive.strip_prefix("max-age=") {
            max_age = seconds.trim_matches('"').parse::<u64>().ok();
        }
    }
    max_age.map(Duration::from_secs).unwrap_or_default()
}
