//! Shared application state for Axum handlers.
//!
//! This module provides thread-safe, clonable state that is shared across
//! all request handlers. It includes:
//!
//! - **Mediator**: Opens one mediation pipeline per request
//! - **Log Store**: Persistence for request log records (optional)
//! - **Handler Cache**: Discovery snapshot of the exposed resources
//! - **Services**: The demo widget repository
//! - **Configuration**: Runtime configuration access
//!
//! # Structured Concurrency
//!
//! Background tasks are managed using `tokio_util::task::TaskTracker` and
//! `CancellationToken` for proper lifecycle management. Call `shutdown()`
//! to gracefully stop all background tasks before application exit.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::json;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::discovery::{HandlerCache, HandlerDescriptor};
use crate::metrics;
use crate::middleware::ip::TrustedProxyConfig;
use crate::pipeline::RestMediator;
use crate::restlog::{FieldFileStore, LogStore, MemoryLogStore};
use crate::services::WidgetService;

/// How often expired log records are pruned.
pub const LOG_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Shared application state for Axum handlers.
///
/// This struct is cloned for each request handler. All internal data
/// is wrapped in `Arc` for efficient sharing.
///
/// # Lifecycle
///
/// Background tasks are spawned when the state is created. Call `shutdown()`
/// before dropping to ensure clean task termination:
///
/// ```rust,ignore
/// let state = AppState::new(config);
/// // ... use state ...
/// state.shutdown().await;  // Wait for background tasks to complete
/// ```
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Opens mediation pipelines
    pub mediator: RestMediator,
    /// Request log persistence, `None` when logging is disabled
    pub log_store: Option<Arc<dyn LogStore>>,
    /// Demo resource repository
    pub widgets: WidgetService,
    /// Handlers that expose the mediation layer
    pub registry: Arc<Vec<HandlerDescriptor>>,
    /// Cached discovery over `registry`
    pub handler_cache: Arc<HandlerCache>,
    /// Proxies whose forwarding headers are believed
    pub trusted_proxies: TrustedProxyConfig,
    /// Timestamp when the application started
    pub started_at: Instant,
    /// Tracks spawned background tasks for graceful shutdown
    task_tracker: TaskTracker,
    /// Cancellation token for signaling background tasks to stop
    cancellation_token: CancellationToken,
}

impl AppState {
    /// Create application state with an in-memory log store.
    ///
    /// # Background Tasks
    ///
    /// When logging is enabled this spawns the log retention task. Call
    /// `shutdown()` to gracefully terminate it.
    pub fn new(config: Config) -> Self {
        let log_store = config
            .log_enabled
            .then(|| build_log_store(&config, MemoryLogStore::new()));
        Self::with_log_store(config, log_store)
    }

    /// Create application state around an existing log store.
    pub fn with_log_store(config: Config, log_store: Option<Arc<dyn LogStore>>) -> Self {
        let config = Arc::new(config);
        let mediator = RestMediator::new(Arc::clone(&config), log_store.clone());
        let trusted_proxies = TrustedProxyConfig::new(&config.trusted_proxies);
        if config.proxy_validation_enabled() {
            info!(
                proxies = config.trusted_proxies.len(),
                "Forwarding headers trusted only from configured proxies"
            );
        } else {
            debug!("TRUSTED_PROXIES unset, forwarding headers trusted from any peer");
        }

        let state = Self {
            mediator,
            log_store,
            widgets: WidgetService::new(),
            registry: Arc::new(default_registry()),
            handler_cache: Arc::new(HandlerCache::new()),
            trusted_proxies,
            started_at: Instant::now(),
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
            config,
        };

        state.spawn_log_retention_task();
        state
    }

    /// Spawn the background task that prunes expired log records.
    ///
    /// The task is tracked by `task_tracker` and respects `cancellation_token`
    /// for graceful shutdown.
    fn spawn_log_retention_task(&self) {
        let Some(store) = self.log_store.clone() else {
            debug!("Request logging disabled, no retention task");
            return;
        };
        let Ok(retention) = chrono::Duration::from_std(self.config.log_retention) else {
            warn!("Log retention window out of range, not pruning");
            return;
        };
        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn(async move {
            let mut ticker = interval(LOG_PRUNE_INTERVAL);
            ticker.tick().await; // Skip the first immediate tick

            loop {
                tokio::select! {
                    biased; // Check cancellation first

                    _ = cancel.cancelled() => {
                        debug!("Log retention task received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        prune_expired(store.as_ref(), retention);
                    }
                }
            }

            debug!("Log retention task shutting down");
        });
    }

    /// Gracefully shutdown all background tasks.
    ///
    /// This method:
    /// 1. Signals all tasks to stop via cancellation token
    /// 2. Closes the task tracker (prevents new tasks)
    /// 3. Waits for all tasks to complete
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");

        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("All background tasks have completed");
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Wrap a store with field-to-file diversion when fields are configured.
pub fn build_log_store<S: LogStore + 'static>(config: &Config, store: S) -> Arc<dyn LogStore> {
    if config.log_fields.is_empty() {
        return Arc::new(store);
    }
    info!(
        fields = config.log_fields.len(),
        dir = %config.log_dir.display(),
        "Diverting log fields to files"
    );
    Arc::new(FieldFileStore::new(
        store,
        config.log_fields.clone(),
        config.log_dir.clone(),
        config.log_pretty,
    ))
}

/// Drop records older than the retention window.
fn prune_expired(store: &dyn LogStore, retention: chrono::Duration) {
    let Some(cutoff) = Utc::now().checked_sub_signed(retention) else {
        return;
    };
    match store.prune_before(cutoff) {
        Ok(0) => trace!("No expired log records"),
        Ok(removed) => debug!(removed, "Pruned expired log records"),
        Err(e) => warn!(error = %e, "Failed to prune log records"),
    }
    if let Some(count) = store.record_count() {
        metrics::set_log_records(count);
    }
}

/// Resources served by this application.
fn default_registry() -> Vec<HandlerDescriptor> {
    vec![
        HandlerDescriptor::new("Widgets")
            .action("index", json!({"scopeVar": "color"}))
            .action("view", json!({}))
            .action("add", json!({"method": "post"}))
            .action("edit", json!({}))
            .action("delete", json!({})),
        HandlerDescriptor::new("Resources").action("index", json!({})),
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::restlog::LogRecord;
    use crate::restlog::format_log_time;

    #[test]
    fn test_prune_expired_drops_old_records() {
        let store = MemoryLogStore::new();
        let mut old = LogRecord::new();
        old.insert(
            "requested",
            format_log_time(Utc::now() - chrono::Duration::hours(3)),
        );
        let mut fresh = LogRecord::new();
        fresh.insert("requested", format_log_time(Utc::now()));
        store.save(old).unwrap();
        store.save(fresh).unwrap();

        prune_expired(&store, chrono::Duration::hours(1));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_build_log_store_plain_without_fields() {
        let config = Config::default();
        let store = build_log_store(&config, MemoryLogStore::new());
        assert_eq!(store.record_count(), Some(0));
    }

    #[tokio::test]
    async fn test_state_without_logging() {
        let config = Config {
            log_enabled: false,
            ..Config::default()
        };
        let state = AppState::new(config);
        assert!(state.log_store.is_none());
        assert!(state.mediator.store().is_none());
        state.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_retention_task() {
        let state = AppState::new(Config::default());
        assert!(state.log_store.is_some());
        state.shutdown().await;
    }
}
