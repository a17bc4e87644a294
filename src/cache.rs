//! Expiring loading cache with single-flight loads.
//!
//! Entries expire a fixed time after they were written, whatever the access
//! pattern. With no size limit, entries are only dropped when replaced, so a
//! large or churning key space (pod IPs in a busy cluster) grows the cache
//! for as long as the process lives.

use eyre::{Result, format_err};
use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::num::NonZero;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

pub const DEFAULT_EXPIRY_SECS: u64 = 3 * 60;

/// Computes the value of a missing or expired key.
pub trait Load: Send + Sync + 'static {
    type Key: Clone + Eq + Hash + std::fmt::Debug + Send + Sync + 'static;
    type Value: Clone + std::fmt::Debug + Send + Sync + 'static;

    fn load(&self, key: &Self::Key) -> impl Future<Output = Result<Self::Value>> + Send;
}

pub struct Builder {
    /// max entries, 0 means unbounded
    pub size: usize,
    pub expiry_secs: u64,
}
impl Default for Builder {
    fn default() -> Self {
        Self {
            size: 0,
            expiry_secs: DEFAULT_EXPIRY_SECS,
        }
    }
}
impl Builder {
    pub fn build<L: Load>(&self, loader: L) -> Cache<L> {
        let lru = match NonZero::new(self.size) {
            Some(size) => lru::LruCache::new(size),
            None => lru::LruCache::unbounded(),
        };
        Cache {
            loader: Arc::new(loader),
            state: Arc::new(Mutex::new(State {
                loaded: lru,
                loading: HashMap::new(),
            })),
            expiry: Duration::from_secs(self.expiry_secs),
        }
    }
}

pub struct Cache<L: Load> {
    loader: Arc<L>,
    state: Arc<Mutex<State<L::Key, L::Value>>>,
    expiry: Duration,
}

type Loading<V> = Shared<BoxFuture<'static, Result<V, LoadError>>>;

/// Loads in flight are kept apart from loaded entries so the size limit
/// never evicts them.
struct State<K, V> {
    loaded: lru::LruCache<K, Loaded<V>>,
    loading: HashMap<K, Loading<V>>,
}

struct Loaded<V> {
    cached_at: Instant,
    value: V,
}

impl<L: Load> Cache<L> {
    pub async fn get(&self, key: &L::Key) -> Result<L::Value, LoadError> {
        let loading = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;

            if let Some(entry) = state.loaded.get(key) {
                if entry.cached_at.elapsed() <= self.expiry {
                    trace!("using cached result: {key:?} -> {:?}", entry.value);
                    return Ok(entry.value.clone());
                }
                trace!("cached result expired: {key:?}");
            }

            match state.loading.get(key) {
                Some(loading) => {
                    trace!("joining in-flight load of {key:?}");
                    loading.clone()
                }
                None => {
                    let loading = self.start_load(key);
                    state.loading.insert(key.clone(), loading.clone());
                    loading
                }
            }
        };

        loading.await
    }

    /// Runs the load in its own task, which stores the result whether or not
    /// anyone still waits for it.
    fn start_load(&self, key: &L::Key) -> Loading<L::Value> {
        let loader = self.loader.clone();
        let state = self.state.clone();
        let task_key = key.clone();

        let task = tokio::spawn(async move {
            let key = task_key;
            let result = loader.load(&key).await.map_err(LoadError::from);
            let cached_at = Instant::now();

            let mut state = state.lock().await;
            state.loading.remove(&key);

            match &result {
                Ok(value) => {
                    debug!("caching result: {key:?} -> {value:?}");
                    let value = value.clone();
                    state.loaded.put(key, Loaded { cached_at, value });
                }
                Err(e) => {
                    warn!("failed to load {key:?}: {e}");
                    state.loaded.pop(&key);
                }
            }

            result
        });

        let state = self.state.clone();
        let key = key.clone();

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    // the task died before clearing its slot
                    state.lock().await.loading.remove(&key);
                    Err(LoadError::from(format_err!("load of {key:?} failed: {e}")))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// number of loaded entries, expired ones included
    pub async fn len(&self) -> usize {
        self.state.lock().await.loaded.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.loaded.is_empty()
    }
}

/// A failed load, handed to every caller that waited on it.
#[derive(Clone)]
pub struct LoadError(Arc<eyre::Report>);

impl From<eyre::Report> for LoadError {
    fn from(e: eyre::Report) -> Self {
        Self(Arc::new(e))
    }
}
impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{:#}", self.0)
    }
}
impl std::fmt::Debug for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{:?}", self.0)
    }
}
impl std::error::Error for LoadError {}
