//! In-memory key source.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::KeySource;
use crate::{
    error::Result,
    key_set::{FetchResult, decode_key_set},
};

/// Serves a fixed key-set document regardless of the source identifier.
///
/// Useful for offline verification against a pinned document and for
/// deterministic tests. The body is decoded on every fetch, so a malformed
/// document fails each time it is fetched rather than at construction.
#[derive(Debug, Clone, Default)]
pub struct InMemoryKeySource {
    raw: Bytes,
    ttl: Duration,
}

impl InMemoryKeySource {
    /// Wraps a raw key-set document. The reported TTL is zero.
    pub fn new(raw: impl Into<Bytes>) -> Self {
        Self { raw: raw.into(), ttl: Duration::ZERO }
    }

    /// Reports `ttl` as the freshness hint of every fetch.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

#[async_trait]
impl KeySource for InMemoryKeySource {
    async fn fetch(&self, _source_id: &str) -> Result<FetchResult> {
        let keys = decode_key_set(&self.raw)?;
        Ok(FetchResult::new(keys, self.ttl))
    }
}
