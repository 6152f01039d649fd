//! PHI Cache Registry.
//!
//! Holds every in-memory cache that may contain PHI and clears them together,
//! either on demand (logout) or when the app has stayed in the background for
//! the configured dwell time.
//!
//! The background timer is a single owned task. Every arm and disarm bumps a
//! generation number; a firing task clears only if its generation is still
//! current once it holds the clearing lock. `on_foreground` waits on that
//! lock before returning, so a clear can never land after it has returned.
//! The clearing lock is re-entrant and the timer lock is not held while
//! caches run, so `ClearableCache::clear` may call back into the registry.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::Result;

/// A cache that can drop everything it holds.
pub trait ClearableCache: Send + Sync {
    fn clear(&self) -> Result<()>;

    /// Number of items currently held.
    fn size(&self) -> usize;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSize {
    pub name: String,
    pub size: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// In registration order.
    pub caches: Vec<CacheSize>,
    pub total_items: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheClearFailure {
    pub name: String,
    pub error: String,
}

/// Outcome of one clear-all pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheClearReport {
    pub cleared: Vec<String>,
    pub failed: Vec<CacheClearFailure>,
}

impl CacheClearReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Default)]
struct TimerState {
    generation: u64,
    handle: Option<JoinHandle<()>>,
    backgrounded_at: Option<Instant>,
}

struct Inner {
    caches: RwLock<Vec<(String, Arc<dyn ClearableCache>)>>,
    timer: Mutex<TimerState>,
    /// Held for the whole of a timer-driven clear.
    clearing: ReentrantMutex<()>,
    dwell: Duration,
}

impl Inner {
    fn clear_all(&self) -> CacheClearReport {
        // Snapshot so a cache may touch the registry from inside `clear`.
        let caches = self.caches.read().clone();

        let mut report = CacheClearReport::default();
        for (name, cache) in caches {
            match cache.clear() {
                Ok(()) => report.cleared.push(name),
                Err(e) => {
                    warn!("Failed to clear PHI cache {}: {}", name, e);
                    report.failed.push(CacheClearFailure {
                        name,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Cleared {} PHI caches ({} failed)",
            report.cleared.len(),
            report.failed.len()
        );
        report
    }

    fn is_current(&self, generation: u64) -> bool {
        self.timer.lock().generation == generation
    }

    fn fire(&self, generation: u64) {
        {
            let mut timer = self.timer.lock();
            if timer.generation != generation || timer.handle.is_none() {
                debug!("Stale background timer ignored");
                return;
            }
            timer.handle = None;
            timer.backgrounded_at = None;
        }

        let _clearing = self.clearing.lock();
        // A foreground may have slipped in before the clearing lock was taken.
        if !self.is_current(generation) {
            debug!("Background timer cancelled before clearing");
            return;
        }

        info!("Background dwell elapsed, clearing PHI caches");
        self.clear_all();
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.get_mut().handle.take() {
            handle.abort();
        }
    }
}

pub struct PhiCacheRegistry {
    inner: Arc<Inner>,
}

impl PhiCacheRegistry {
    pub fn new(dwell: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                caches: RwLock::new(Vec::new()),
                timer: Mutex::new(TimerState::default()),
                clearing: ReentrantMutex::new(()),
                dwell,
            }),
        }
    }

    /// Register `cache` under `name`. A cache already registered under the
    /// same name is replaced and keeps its position.
    pub fn register(&self, name: impl Into<String>, cache: Arc<dyn ClearableCache>) {
        let name = name.into();
        let mut caches = self.inner.caches.write();
        match caches.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => {
                debug!("Replacing PHI cache {}", name);
                slot.1 = cache;
            }
            None => {
                debug!("Registered PHI cache {}", name);
                caches.push((name, cache));
            }
        }
    }

    /// Returns whether a cache was registered under `name`.
    pub fn unregister(&self, name: &str) -> bool {
        let mut caches = self.inner.caches.write();
        let before = caches.len();
        caches.retain(|(existing, _)| existing != name);
        before != caches.len()
    }

    /// Clear every registered cache in registration order. One failing cache
    /// does not stop the others.
    pub fn clear_all_caches(&self) -> CacheClearReport {
        self.inner.clear_all()
    }

    /// Arm the background timer, replacing any armed one. Must be called
    /// from within a tokio runtime.
    pub fn on_background(&self) {
        let mut timer = self.inner.timer.lock();
        if let Some(previous) = timer.handle.take() {
            previous.abort();
        }

        timer.generation += 1;
        let generation = timer.generation;
        timer.backgrounded_at = Some(Instant::now());

        // Deadline is fixed here, not when the task is first polled.
        let dwell = tokio::time::sleep(self.inner.dwell);
        let registry: Weak<Inner> = Arc::downgrade(&self.inner);
        timer.handle = Some(tokio::spawn(async move {
            dwell.await;
            if let Some(inner) = registry.upgrade() {
                inner.fire(generation);
            }
        }));

        debug!("Background timer armed for {:?}", self.inner.dwell);
    }

    /// Disarm the background timer and wait out a clear already in progress.
    pub fn on_foreground(&self) {
        {
            let mut timer = self.inner.timer.lock();
            timer.generation += 1;
            timer.backgrounded_at = None;
            if let Some(handle) = timer.handle.take() {
                handle.abort();
                debug!("Background timer cancelled");
            }
        }
        drop(self.inner.clearing.lock());
    }

    pub fn is_armed(&self) -> bool {
        self.inner.timer.lock().handle.is_some()
    }

    /// When the armed timer was started.
    pub fn backgrounded_at(&self) -> Option<Instant> {
        self.inner.timer.lock().backgrounded_at
    }

    pub fn stats(&self) -> CacheStats {
        let caches: Vec<CacheSize> = self
            .inner
            .caches
            .read()
            .iter()
            .map(|(name, cache)| CacheSize {
                name: name.clone(),
                size: cache.size(),
            })
            .collect();
        let total_items = caches.iter().map(|c| c.size).sum();

        CacheStats {
            caches,
            total_items,
        }
    }

    pub fn has_data(&self) -> bool {
        self.inner.caches.read().iter().any(|(_, cache)| cache.size() > 0)
    }

    pub fn len(&self) -> usize {
        self.inner.caches.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
