//! Object-storage key source.
//!
//! Source identifiers take the form `scheme://bucket/key`, for example
//! `s3://idp-keys/prod/jwks.json`. The scheme names the storage service and
//! is not interpreted here: the [`ObjectStore`] capability decides which
//! service it talks to.

use std::{collections::HashMap, fmt, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use percent_encoding::percent_decode_str;
use url::Url;

use super::KeySource;
use crate::{
    error::{JwksError, Result},
    key_set::{FetchResult, decode_key_set},
};

/// Object-storage GET capability keyed by bucket and object key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Returns the body of the object at `bucket`/`key`.
    ///
    /// A missing object is a transport failure.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes>;
}

/// A parsed `scheme://bucket/key` locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocator {
    scheme: String,
    bucket: String,
    key: String,
}

impl ObjectLocator {
    /// Parses a source identifier.
    ///
    /// The leading `/` of the path is dropped and the rest is percent-decoded,
    /// so `s3://b/dir%20a/jwks.json` has key `dir a/jwks.json`.
    ///
    /// # Errors
    ///
    /// Returns [`JwksError::InvalidSourceId`] when the identifier is not a URL
    /// lacks a bucket or an object key, or its key does not decode to UTF-8.
    pub fn parse(source_id: &str) -> Result<Self> {
        let url = Url::parse(source_id)
            .map_err(|e| JwksError::invalid_source_id(source_id, e.to_string()))?;
        let bucket = url.host_str().unwrap_or_default();
        if bucket.is_empty() {
            return Err(JwksError::invalid_source_id(source_id, "missing bucket"));
        }
        let key = percent_decode_str(url.path().trim_start_matches('/'))
            .decode_utf8()
            .map_err(|e| JwksError::invalid_source_id(source_id, format!("object key: {e}")))?;
        if key.is_empty() {
            return Err(JwksError::invalid_source_id(source_id, "missing object key"));
        }
        Ok(Self {
            scheme: url.scheme().to_owned(),
            bucket: bucket.to_owned(),
            key: key.into_owned(),
        })
    }

    /// Returns the storage scheme (for example `s3`).
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Returns the bucket name.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Returns the object key within the bucket.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for ObjectLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.bucket, self.key)
    }
}

/// Fetches key sets from an object store.
///
/// Object stores carry no freshness hint, so every result has a zero TTL.
#[derive(Debug, Clone)]
pub struct ObjectStoreKeySource<O> {
    store: O,
}

impl<O: ObjectStore> ObjectStoreKeySource<O> {
    /// Builds a source over the given store.
    pub fn new(store: O) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<O: ObjectStore> KeySource for ObjectStoreKeySource<O> {
    #[tracing::instrument(skip(self), fields(variant = "object_store"))]
    async fn fetch(&self, source_id: &str) -> Result<FetchResult> {
        let locator = ObjectLocator::parse(source_id)?;
        let body = self.store.get_object(locator.bucket(), locator.key()).await.inspect_err(
            |err| tracing::warn!(error = %err, bucket = locator.bucket(), "object fetch failed"),
        )?;
        let keys = decode_key_set(&body)?;
        tracing::debug!(keys = keys.len(), "fetched key set");
        Ok(FetchResult::new(keys, Duration::ZERO))
    }
}

/// In-memory [`ObjectStore`] for tests and offline use.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<(String, String), Bytes>>,
}

impl MemoryObjectStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `body` at `bucket`/`key`, replacing any previous object.
    pub fn put(&self, bucket: &str, key: &str, body: impl Into<Bytes>) {
        self.objects.write().insert((bucket.to_owned(), key.to_owned()), body.into());
    }

    /// Removes the object at `bucket`/`key`.
    pub fn remove(&self, bucket: &str, key: &str) {
        self.objects.write().remove(&(bucket.to_owned(), key.to_owned()));
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        self.objects
            .read()
            .get(&(bucket.to_owned(), key.to_owned()))
            .cloned()
            .ok_or_else(|| JwksError::transport(format!("object {bucket}/{key} not found")))
    }
}

#[async_trait]
impl<O: ObjectStore + ?Sized> ObjectStore for std::sync::Arc<O> {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        (**self).get_object(bucket, key).await
    }
}
