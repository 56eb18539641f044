//! Per-view request execution with TTL caching and last-call-wins supersession.
//!
//! Each [`RequestExecutor`] is owned by exactly one view. Starting a new
//! fetch cancels whatever the same executor started before, and a cancelled
//! fetch never touches the cache or the caller's callbacks.

use std::{collections::HashMap, future::Future, time::Duration};

use tokio::{sync::Mutex, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_millis(300_000);

type SuccessCallback<T> = Box<dyn FnOnce(&T) + Send>;
type ErrorCallback = Box<dyn FnOnce(&CoreError) + Send>;

pub struct ExecuteOptions<T> {
    pub cache_key: Option<String>,
    pub ttl: Duration,
    pub skip_cache: bool,
    on_success: Option<SuccessCallback<T>>,
    on_error: Option<ErrorCallback>,
}

impl<T> Default for ExecuteOptions<T> {
    fn default() -> Self {
        Self {
            cache_key: None,
            ttl: DEFAULT_CACHE_TTL,
            skip_cache: false,
            on_success: None,
            on_error: None,
        }
    }
}

impl<T> ExecuteOptions<T> {
    pub fn cached(cache_key: impl Into<String>) -> Self {
        Self {
            cache_key: Some(cache_key.into()),
            ..Self::default()
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn skip_cache(mut self, skip_cache: bool) -> Self {
        self.skip_cache = skip_cache;
        self
    }

    pub fn on_success(mut self, callback: impl FnOnce(&T) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl FnOnce(&CoreError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }
}

struct CacheEntry<T> {
    value: T,
    stored_at: Instant,
}

struct ExecutorState<T> {
    cache: HashMap<String, CacheEntry<T>>,
    inflight: Option<CancellationToken>,
}

impl<T: Clone> ExecutorState<T> {
    fn fresh(&mut self, key: &str, ttl: Duration) -> Option<T> {
        let expired = match self.cache.get(key) {
            Some(entry) if entry.stored_at.elapsed() < ttl => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.cache.remove(key);
        }
        None
    }
}

pub struct RequestExecutor<T> {
    label: String,
    state: Mutex<ExecutorState<T>>,
}

impl<T> RequestExecutor<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            state: Mutex::new(ExecutorState {
                cache: HashMap::new(),
                inflight: None,
            }),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Runs `fetch` unless a fresh cached value answers the call.
    ///
    /// Returns `Ok(None)` when this call was superseded by a newer one or
    /// cancelled through [`RequestExecutor::cancel`].
    pub async fn execute<F, Fut>(&self, fetch: F, options: ExecuteOptions<T>) -> CoreResult<Option<T>>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = CoreResult<T>>,
    {
        let ExecuteOptions {
            cache_key,
            ttl,
            skip_cache,
            on_success,
            on_error,
        } = options;

        let token = {
            let mut state = self.state.lock().await;
            if let Some(key) = cache_key.as_deref().filter(|_| !skip_cache) {
                if let Some(value) = state.fresh(key, ttl) {
                    debug!(executor = %self.label, key, "cache hit");
                    return Ok(Some(value));
                }
            }
            if let Some(previous) = state.inflight.take() {
                debug!(executor = %self.label, "superseding in-flight request");
                previous.cancel();
            }
            let token = CancellationToken::new();
            state.inflight = Some(token.clone());
            token
        };

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(executor = %self.label, "request cancelled before completion");
                return Ok(None);
            }
            result = fetch(token.clone()) => result,
        };

        let mut state = self.state.lock().await;
        // A newer call may have started between the fetch resolving and this lock.
        if token.is_cancelled() {
            debug!(executor = %self.label, "discarding superseded result");
            return Ok(None);
        }
        state.inflight = None;

        match result {
            Ok(value) => {
                if let Some(key) = cache_key {
                    state.cache.insert(
                        key,
                        CacheEntry {
                            value: value.clone(),
                            stored_at: Instant::now(),
                        },
                    );
                }
                drop(state);
                if let Some(callback) = on_success {
                    callback(&value);
                }
                Ok(Some(value))
            }
            Err(err) => {
                drop(state);
                warn!(executor = %self.label, error = %err, "request failed");
                if let Some(callback) = on_error {
                    callback(&err);
                }
                Err(err)
            }
        }
    }

    /// Fresh cached value for `key`, if any, without fetching.
    pub async fn cached(&self, key: &str, ttl: Duration) -> Option<T> {
        self.state.lock().await.fresh(key, ttl)
    }

    pub async fn clear_cache(&self, key: Option<&str>) {
        let mut state = self.state.lock().await;
        match key {
            Some(key) => {
                state.cache.remove(key);
            }
            None => state.cache.clear(),
        }
    }

    pub async fn cancel(&self) {
        if let Some(token) = self.state.lock().await.inflight.take() {
            debug!(executor = %self.label, "cancelling in-flight request");
            token.cancel();
        }
    }
}

#[cfg(test)]
#[path = "tests/executor_tests.rs"]
mod tests;
