//! Time-bounded key-set cache.
//!
//! [`KeySetCache`] decorates any [`KeySource`] with memoization keyed by
//! source identifier. It is a `KeySource` itself, so it composes with any
//! variant (or another cache).
//!
//! # Architecture
//!
//! ```text
//! fetch(source_id)
//!   → live entry?  yes → return cached keys (source not called)
//!                  no  → coalesce with any in-flight fetch for source_id
//!                      → first caller fetches from the wrapped source
//!                      → success: store with lifetime derived from TTL
//!                      → failure: nothing stored, every waiter gets the error
//!
//! sweeper task (every sweep_interval)
//!   → evict entries past their stored expiry
//! ```
//!
//! # Stored lifetime
//!
//! See [`CacheConfig::stored_lifetime`]: a zero TTL falls back to
//! `default_expiration`, a TTL longer than the sweep interval is shortened
//! by one interval, and nothing outlives `max_expiration`.
//!
//! # Examples
//!
//! ```no_run
//! use oidc_jwkset::{CacheConfig, HttpSourceConfig, KeySetCache, source::HttpKeySource};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = HttpKeySource::from_config(&HttpSourceConfig::default())?;
//! let cache = KeySetCache::new(source, CacheConfig::default())?;
//!
//! let fetched = cache.fetch("https://www.googleapis.com/oauth2/v3/certs").await?;
//! println!("{} keys, fresh for {:?}", fetched.keys.len(), fetched.ttl);
//! # Ok(())
//! # }
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use fail::fail_point;
use moka::{future::Cache, notification::RemovalCause};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    config::{CacheConfig, ConfigError},
    error::Result,
    key_set::{FetchResult, KeySet},
    source::KeySource,
};

/// Smallest TTL reported for a live entry. Zero would read as "no window
/// declared" to a wrapping cache.
const MIN_REPORTED_TTL: Duration = Duration::from_nanos(1);

/// A cached key set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Identifier the keys were fetched from.
    pub source_id: String,
    /// The cached keys, in provider order.
    pub keys: KeySet,
    /// TTL the source declared. Zero if it declared none.
    pub declared_ttl: Duration,
    /// When the fetch completed.
    pub fetched_at: Instant,
    /// When the entry stops being served.
    pub expires_at: Instant,
}

impl CacheEntry {
    /// Returns how long the entry will still be served.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

/// Per-entry expiry: each entry lives until its own `expires_at`.
struct EntryExpiry;

impl moka::Expiry<String, Arc<CacheEntry>> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Arc<CacheEntry>,
        created_at: Instant,
    ) -> Option<Duration> {
        Some(value.expires_at.saturating_duration_since(created_at))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Arc<CacheEntry>,
        updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.expires_at.saturating_duration_since(updated_at))
    }
}

/// Memoizing decorator over a [`KeySource`].
///
/// # Single flight
///
/// Concurrent misses for the same source identifier are coalesced: exactly
/// one call reaches the wrapped source and every waiter receives its result,
/// success or error. Misses for different identifiers run independently.
///
/// # Failures
///
/// A failed fetch is never cached and reaches the caller unmodified. The
/// next call for the same identifier tries the source again.
pub struct KeySetCache<S> {
    source: S,
    config: CacheConfig,
    entries: Cache<String, Arc<CacheEntry>>,
    cancel_token: CancellationToken,
    sweep_handle: Mutex<Option<JoinHandle<()>>>,
    sweep_count: Arc<AtomicU64>,
}

impl<S: KeySource> KeySetCache<S> {
    /// Creates a cache over `source` and starts its background sweep.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` fails validation.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime context.
    pub fn new(source: S, config: CacheConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;

        let entries: Cache<String, Arc<CacheEntry>> = Cache::builder()
            .max_capacity(config.max_capacity())
            .expire_after(EntryExpiry)
            .eviction_listener(
                |source_id: Arc<String>, _entry: Arc<CacheEntry>, cause: RemovalCause| {
                    tracing::debug!(source_id = %source_id, cause = ?cause, "key set evicted");
                },
            )
            .build();

        let cancel_token = CancellationToken::new();
        let sweep_count = Arc::new(AtomicU64::new(0));
        let handle = spawn_sweeper(
            entries.clone(),
            config.sweep_interval(),
            cancel_token.clone(),
            Arc::clone(&sweep_count),
        );

        Ok(Self {
            source,
            config,
            entries,
            cancel_token,
            sweep_handle: Mutex::new(Some(handle)),
            sweep_count,
        })
    }

    /// Returns the keys for `source_id`, from cache when a live entry exists.
    ///
    /// The returned TTL is the remaining lifetime of the cache entry, never
    /// zero while the entry is served.
    ///
    /// # Errors
    ///
    /// Returns whatever error the wrapped source produced on a miss.
    #[tracing::instrument(skip(self))]
    pub async fn fetch(&self, source_id: &str) -> Result<FetchResult> {
        let entry = self
            .entries
            .entry_by_ref(source_id)
            .or_try_insert_with(self.load(source_id))
            .await
            .map_err(Arc::unwrap_or_clone)?;

        if entry.is_fresh() {
            tracing::debug!("cache miss, fetched from source");
        } else {
            tracing::debug!("cache hit");
        }

        let entry = entry.into_value();
        Ok(FetchResult::new(entry.keys.clone(), entry.remaining().max(MIN_REPORTED_TTL)))
    }

    async fn load(&self, source_id: &str) -> Result<Arc<CacheEntry>> {
        fail_point!("key-set-cache-before-fetch", |_| {
            Err(crate::JwksError::transport("injected failure before upstream fetch"))
        });

        let fetched = self.source.fetch(source_id).await.inspect_err(|err| {
            tracing::warn!(error = %err, "upstream key set fetch failed, not caching");
        })?;

        let lifetime = self.config.stored_lifetime(fetched.ttl);
        let fetched_at = Instant::now();
        let expires_at = fetched_at.checked_add(lifetime).unwrap_or(fetched_at);
        tracing::debug!(
            keys = fetched.keys.len(),
            declared_ttl_secs = fetched.ttl.as_secs(),
            stored_secs = lifetime.as_secs(),
            "caching key set"
        );

        Ok(Arc::new(CacheEntry {
            source_id: source_id.to_owned(),
            keys: fetched.keys,
            declared_ttl: fetched.ttl,
            fetched_at,
            expires_at,
        }))
    }

    /// Returns the live entry for `source_id` without fetching.
    pub async fn entry(&self, source_id: &str) -> Option<Arc<CacheEntry>> {
        self.entries.get(source_id).await
    }

    /// Drops the cached keys for `source_id`; the next fetch goes upstream.
    ///
    /// An audit event is emitted at INFO level.
    #[tracing::instrument(skip(self))]
    pub async fn invalidate(&self, source_id: &str) {
        self.entries.invalidate(source_id).await;
        tracing::info!(
            audit.action = "invalidate_key_set",
            audit.resource = source_id,
            audit.result = "success",
            "audit_event"
        );
    }

    /// Drops every cached key set.
    ///
    /// An audit event is emitted at INFO level.
    #[tracing::instrument(skip(self))]
    pub async fn clear_all(&self) {
        let evicted = self.entries.entry_count();
        self.entries.invalidate_all();
        self.entries.run_pending_tasks().await;
        tracing::info!(
            audit.action = "clear_key_sets",
            audit.resource = "all_key_sets",
            audit.result = "success",
            audit.evicted = evicted,
            "audit_event"
        );
    }

    /// Stops the background sweep and clears the cache.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        let handle = self.sweep_handle.lock().take();
        if let Some(handle) = handle
            && let Err(err) = handle.await
        {
            tracing::warn!(error = %err, "key set sweep task panicked");
        }
        self.clear_all().await;
    }

    /// Applies pending evictions immediately.
    ///
    /// Counts are eventually consistent; tests call this before asserting.
    pub async fn sync(&self) {
        self.entries.run_pending_tasks().await;
    }

    /// Returns the number of cached source identifiers.
    ///
    /// Eventually consistent; call [`sync`](Self::sync) first for an exact count.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }

    /// Returns the number of completed background sweeps.
    #[must_use]
    pub fn sweep_count(&self) -> u64 {
        self.sweep_count.load(Ordering::Relaxed)
    }

    /// Returns the configuration in effect.
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the cancellation token of the background sweep.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }
}

impl<S> Drop for KeySetCache<S> {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

#[async_trait]
impl<S: KeySource> KeySource for KeySetCache<S> {
    async fn fetch(&self, source_id: &str) -> Result<FetchResult> {
        KeySetCache::fetch(self, source_id).await
    }
}

fn spawn_sweeper(
    entries: Cache<String, Arc<CacheEntry>>,
    interval: Duration,
    token: CancellationToken,
    sweep_count: Arc<AtomicU64>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!("key set sweep task shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    entries.run_pending_tasks().await;
                    sweep_count.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{
        JwksError, assert_jwks_error,
        testutil::{CountingSource, generate_test_key},
    };

    const SOURCE_ID: &str = "https://idp.example.com/jwks";

    fn one_key_result(ttl: Duration) -> FetchResult {
        let (_, key) = generate_test_key("k1");
        FetchResult::new(KeySet::new(vec![key]), ttl)
    }

    fn config() -> CacheConfig {
        CacheConfig::builder()
            .default_expiration(Duration::from_secs(600))
            .sweep_interval(Duration::from_secs(60))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_cache_hit_skips_source() {
        let expected = one_key_result(Duration::from_secs(3600));
        let source = Arc::new(CountingSource::new(expected.clone()));
        let cache = KeySetCache::new(Arc::clone(&source), config()).unwrap();

        let first = cache.fetch(SOURCE_ID).await.unwrap();
        let second = cache.fetch(SOURCE_ID).await.unwrap();

        assert_eq!(first.keys, expected.keys);
        assert_eq!(second.keys, expected.keys);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_identifiers_are_cached_separately() {
        let source = Arc::new(CountingSource::new(one_key_result(Duration::ZERO)));
        let cache = KeySetCache::new(Arc::clone(&source), config()).unwrap();

        cache.fetch("https://a.example.com/jwks").await.unwrap();
        cache.fetch("https://b.example.com/jwks").await.unwrap();
        cache.fetch("https://a.example.com/jwks").await.unwrap();

        assert_eq!(source.calls(), 2);
    }

    #[rstest]
    #[case::undeclared(0, 600)]
    #[case::within_sweep(45, 45)]
    #[case::beyond_sweep(3600, 3540)]
    #[tokio::test]
    async fn test_stored_expiry(#[case] declared: u64, #[case] stored: u64) {
        let source = CountingSource::new(one_key_result(Duration::from_secs(declared)));
        let cache = KeySetCache::new(source, config()).unwrap();

        let fetched = cache.fetch(SOURCE_ID).await.unwrap();
        let entry = cache.entry(SOURCE_ID).await.expect("entry cached");

        assert_eq!(entry.expires_at - entry.fetched_at, Duration::from_secs(stored));
        assert_eq!(entry.declared_ttl, Duration::from_secs(declared));
        assert!(fetched.ttl <= Duration::from_secs(stored));
    }

    #[tokio::test]
    async fn test_nested_cache_keeps_tiny_ttl() {
        let tiny = Duration::from_micros(1);
        let source = Arc::new(CountingSource::new(one_key_result(tiny)));
        let inner = KeySetCache::new(Arc::clone(&source), config()).unwrap();
        let outer = KeySetCache::new(inner, config()).unwrap();

        let fetched = outer.fetch(SOURCE_ID).await.unwrap();

        assert!(!fetched.ttl.is_zero());
        assert!(fetched.ttl <= tiny, "outer cache extended the window to {:?}", fetched.ttl);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let source = Arc::new(CountingSource::failing(JwksError::transport("connection refused")));
        let cache = KeySetCache::new(Arc::clone(&source), config()).unwrap();

        assert_jwks_error!(cache.fetch(SOURCE_ID).await, Transport);
        cache.sync().await;
        assert_eq!(cache.entry_count(), 0);

        source.set_result(Ok(one_key_result(Duration::ZERO)));
        let fetched = cache.fetch(SOURCE_ID).await.unwrap();

        assert_eq!(fetched.keys.len(), 1);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let source = Arc::new(CountingSource::new(one_key_result(Duration::ZERO)));
        let cache = KeySetCache::new(Arc::clone(&source), config()).unwrap();

        cache.fetch(SOURCE_ID).await.unwrap();
        cache.invalidate(SOURCE_ID).await;
        assert!(cache.entry(SOURCE_ID).await.is_none());
        cache.fetch(SOURCE_ID).await.unwrap();

        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_clear_all() {
        let source = Arc::new(CountingSource::new(one_key_result(Duration::ZERO)));
        let cache = KeySetCache::new(Arc::clone(&source), config()).unwrap();

        cache.fetch("https://a.example.com/jwks").await.unwrap();
        cache.fetch("https://b.example.com/jwks").await.unwrap();
        cache.sync().await;
        assert_eq!(cache.entry_count(), 2);

        cache.clear_all().await;
        assert_eq!(cache.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_misses_call_source_once() {
        let source = Arc::new(
            CountingSource::new(one_key_result(Duration::ZERO))
                .with_delay(Duration::from_millis(100)),
        );
        let cache = Arc::new(KeySetCache::new(Arc::clone(&source), config()).unwrap());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move { cache.fetch(SOURCE_ID).await }));
        }
        for handle in handles {
            let fetched = handle.await.unwrap().unwrap();
            assert_eq!(fetched.keys.len(), 1);
        }

        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_failure() {
        let source = Arc::new(
            CountingSource::failing(JwksError::http_status(502))
                .with_delay(Duration::from_millis(100)),
        );
        let cache = Arc::new(KeySetCache::new(Arc::clone(&source), config()).unwrap());

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move { cache.fetch(SOURCE_ID).await }));
        }
        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert!(matches!(err, JwksError::Transport { status: Some(502), .. }));
        }

        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_sweep_evicts_expired_entries() {
        let config = CacheConfig::builder()
            .default_expiration(Duration::from_millis(30))
            .sweep_interval(Duration::from_millis(20))
            .build()
            .unwrap();
        let source = Arc::new(CountingSource::new(one_key_result(Duration::ZERO)));
        let cache = KeySetCache::new(Arc::clone(&source), config).unwrap();

        cache.fetch(SOURCE_ID).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(cache.sweep_count() > 0);
        assert_eq!(cache.entry_count(), 0);
        assert!(cache.entry(SOURCE_ID).await.is_none());

        cache.fetch(SOURCE_ID).await.unwrap();
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_stops_sweeper() {
        let config =
            CacheConfig::builder().sweep_interval(Duration::from_millis(10)).build().unwrap();
        let cache = KeySetCache::new(CountingSource::new(FetchResult::default()), config).unwrap();

        cache.shutdown().await;
        assert!(cache.cancel_token().is_cancelled());
        let sweeps = cache.sweep_count();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.sweep_count(), sweeps);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config: CacheConfig = serde_json::from_str(r#"{"sweep_interval": "0s"}"#).unwrap();
        let result = KeySetCache::new(CountingSource::new(FetchResult::default()), config);
        assert!(result.is_err());
    }
}
