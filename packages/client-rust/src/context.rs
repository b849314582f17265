//! Shared dispatch state.
//!
//! One [`TubeContext`] owns the request id allocator, the completion bus and
//! the request cache. Dispatchers and notifiers hold it (or handles into it)
//! explicitly; there is no process-wide instance.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use optube_core::RequestIdAllocator;
use tracing::info;

use crate::config::TubeConfig;
use crate::dispatch::{CompletionBus, CompletionNotifier, RequestCache};

/// What [`TubeContext::shutdown`] discarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub dropped_listeners: usize,
    pub dropped_cache_entries: usize,
}

/// Allocator, bus and cache shared by every dispatch in one process scope.
#[derive(Debug)]
pub struct TubeContext {
    config: Arc<TubeConfig>,
    allocator: RequestIdAllocator,
    bus: Arc<CompletionBus>,
    cache: Arc<RequestCache>,
    closed: AtomicBool,
}

impl TubeContext {
    /// Builds a context from a validated `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails [`TubeConfig::validate`].
    pub fn new(config: TubeConfig) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: TubeConfig) -> Self {
        let allocator = RequestIdAllocator::starting_at(config.first_request_id);
        Self {
            config: Arc::new(config),
            allocator,
            bus: Arc::new(CompletionBus::new()),
            cache: Arc::new(RequestCache::new()),
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn config(&self) -> &TubeConfig {
        &self.config
    }

    #[must_use]
    pub const fn allocator(&self) -> &RequestIdAllocator {
        &self.allocator
    }

    #[must_use]
    pub const fn bus(&self) -> &Arc<CompletionBus> {
        &self.bus
    }

    #[must_use]
    pub const fn cache(&self) -> &Arc<RequestCache> {
        &self.cache
    }

    /// Handle for workers and sessions to report completions through.
    #[must_use]
    pub fn notifier(&self) -> CompletionNotifier {
        CompletionNotifier::new(Arc::clone(&self.bus), Arc::clone(&self.cache))
    }

    /// Registrations and cache entries still waiting for a completion.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.bus.len() + self.cache.len()
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Refuses further dispatches and drops every pending registration and
    /// cache entry without invoking it. Awaiting callers observe
    /// `WaitError::Abandoned`. Calling it again only sweeps what raced in.
    pub fn shutdown(&self) -> TeardownReport {
        self.closed.store(true, Ordering::Release);
        let report = TeardownReport {
            dropped_listeners: self.bus.clear(),
            dropped_cache_entries: self.cache.clear(),
        };
        info!(
            dropped_listeners = report.dropped_listeners,
            dropped_cache_entries = report.dropped_cache_entries,
            "dispatch context shut down"
        );
        report
    }
}

impl Default for TubeContext {
    fn default() -> Self {
        Self::build(TubeConfig::default())
    }
}
