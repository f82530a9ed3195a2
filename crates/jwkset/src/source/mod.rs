//! Key sources: where key-set documents come from.
//!
//! A [`KeySource`] retrieves a raw key-set document from one transport and
//! decodes it with [`decode_key_set`](crate::key_set::decode_key_set). Three
//! variants are provided:
//!
//! | Variant | Source identifier | Freshness hint |
//! |---|---|---|
//! | [`HttpKeySource`] | absolute `http`/`https` URL | `Cache-Control: max-age` |
//! | [`ObjectStoreKeySource`] | `scheme://bucket/key` | none |
//! | [`InMemoryKeySource`] | ignored | fixed, default none |
//!
//! [`KeySetCache`](crate::KeySetCache) wraps any of them and is a
//! `KeySource` itself.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{error::Result, key_set::FetchResult};

mod http;
mod memory;
mod object_store;

pub use http::{HttpKeySource, HttpResponse, HttpTransport};
pub use memory::InMemoryKeySource;
pub use object_store::{MemoryObjectStore, ObjectLocator, ObjectStore, ObjectStoreKeySource};

/// Retrieves and decodes a provider key set.
///
/// # Errors
///
/// Implementations return [`JwksError::Transport`](crate::JwksError::Transport)
/// when the source cannot be reached and
/// [`JwksError::Decode`](crate::JwksError::Decode) when the body is malformed.
/// An empty body is not an error: it yields an empty key set.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Fetches the key set named by `source_id`.
    async fn fetch(&self, source_id: &str) -> Result<FetchResult>;
}

#[async_trait]
impl<S: KeySource + ?Sized> KeySource for Arc<S> {
    async fn fetch(&self, source_id: &str) -> Result<FetchResult> {
        (**self).fetch(source_id).await
    }
}

#[async_trait]
impl<S: KeySource + ?Sized> KeySource for Box<S> {
    async fn fetch(&self, source_id: &str) -> Result<FetchResult> {
        (**self).fetch(source_id).await
    }
}
