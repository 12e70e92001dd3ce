//! Collector configuration cache.
//!
//! The first call to [`ConfigCache::get`] fetches the configuration while the
//! caller waits; only one such fetch is in flight at a time. Once a value is
//! cached, a background task refreshes it every interval and readers are
//! served from memory. The value sits behind an `RwLock` held only for the
//! pointer swap, never across a network call.
//!
//! Failures are handled fail-safe:
//!
//! - initial fetch: nothing is cached, nothing is blocked, the next call retries;
//! - refresh: the previous configuration is retained.
//!
//! The refresh task stops when [`ConfigCache::shutdown`] is called or the
//! cache is dropped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::collector::ConfigSource;
use crate::config::Config;

type Slot = Arc<RwLock<Option<Arc<Config>>>>;

pub struct ConfigCache {
    source: Arc<dyn ConfigSource>,
    secret_key: String,
    refresh_every: Duration,
    current: Slot,
    initial_fetch: tokio::sync::Mutex<()>,
    updates: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl ConfigCache {
    /// Create an empty cache; nothing is fetched until the first [`get`](Self::get).
    ///
    /// An empty `secret_key` disables fetching.
    pub fn new(
        source: Arc<dyn ConfigSource>,
        secret_key: impl Into<String>,
        refresh_every: Duration,
    ) -> Self {
        Self {
            source,
            secret_key: secret_key.into(),
            refresh_every,
            current: Arc::new(RwLock::new(None)),
            initial_fetch: tokio::sync::Mutex::new(()),
            updates: Arc::new(AtomicUsize::new(0)),
            shutdown: CancellationToken::new(),
        }
    }

    /// Create a cache already holding `config`. No fetch or refresh happens.
    pub fn seeded(source: Arc<dyn ConfigSource>, config: Config) -> Self {
        let cache = Self::new(source, String::new(), Duration::from_secs(5));
        store(&cache.current, config);
        cache
    }

    /// The current configuration, fetching it first if none is cached.
    ///
    /// Returns `None` when no configuration could be obtained, which callers
    /// treat as "nothing blocked".
    pub async fn get(&self) -> Option<Arc<Config>> {
        if let Some(config) = load(&self.current) {
            return Some(config);
        }

        let _guard = self.initial_fetch.lock().await;
        // Another caller may have completed the fetch while we waited.
        if let Some(config) = load(&self.current) {
            return Some(config);
        }
        if self.secret_key.is_empty() || self.shutdown.is_cancelled() {
            return None;
        }

        self.updates.fetch_add(1, Ordering::SeqCst);
        match self.source.fetch_config(&self.secret_key).await {
            Ok(config) => {
                info!(
                    blocked = config.blocked_domains.len(),
                    "Collector config loaded"
                );
                let config = store(&self.current, config);
                self.spawn_refresh();
                Some(config)
            }
            Err(e) => {
                warn!("fetch bearer config: {}", e);
                None
            }
        }
    }

    /// The cached configuration without triggering a fetch.
    pub fn cached(&self) -> Option<Arc<Config>> {
        load(&self.current)
    }

    /// Number of fetch attempts made so far (initial and refresh).
    pub fn fetch_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Stop the background refresh task.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    fn spawn_refresh(&self) {
        let source = Arc::clone(&self.source);
        let secret_key = self.secret_key.clone();
        let every = self.refresh_every;
        let current = Arc::clone(&self.current);
        let updates = Arc::clone(&self.updates);
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Config refresh stopped");
                        break;
                    }
                    _ = tokio::time::sleep(every) => {}
                }

                updates.fetch_add(1, Ordering::SeqCst);
                match source.fetch_config(&secret_key).await {
                    Ok(config) => {
                        store(&current, config);
                        debug!("Collector config refreshed");
                    }
                    Err(e) => {
                        warn!("fetch bearer config (keeping previous): {}", e);
                    }
                }
            }
        });
    }
}

impl Drop for ConfigCache {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for ConfigCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigCache")
            .field("refresh_every", &self.refresh_every)
            .field("current", &load(&self.current))
            .field("updates", &self.fetch_count())
            .finish()
    }
}

fn load(slot: &Slot) -> Option<Arc<Config>> {
    slot.read().unwrap_or_else(|e| e.into_inner()).clone()
}

fn store(slot: &Slot, config: Config) -> Arc<Config> {
    let config = Arc::new(config);
    *slot.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&config));
    config
}
