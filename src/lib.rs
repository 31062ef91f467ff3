pub mod api;
pub mod config;
pub mod db;
pub mod engine;
pub mod llm;

pub use db::DbPool;

use config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::api::rate_limit::RateLimiter;
use crate::db::Store;
use crate::engine::{
    AnalyticsAggregator, ChatRelay, ConnectionSelector, SessionOrchestrator, SubscriptionFlow,
};
use crate::llm::CompletionClient;

pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub sessions: SessionOrchestrator,
    pub selector: ConnectionSelector,
    pub chat: ChatRelay,
    pub analytics: AnalyticsAggregator,
    pub billing: SubscriptionFlow,
    pub rate_limiter: Arc<RateLimiter>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: Config, store: Store, completion: Arc<dyn CompletionClient>) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        Self {
            sessions: SessionOrchestrator::new(store.clone()),
            selector: ConnectionSelector::new(store.clone()),
            chat: ChatRelay::new(store.clone(), completion),
            analytics: AnalyticsAggregator::new(store.clone()),
            billing: SubscriptionFlow::new(store.clone(), config.billing.clone()),
            config,
            store,
            rate_limiter,
            metrics_handle: None,
        }
    }

    /// Set the Prometheus metrics handle
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}

/// State over `store` with default config and no completion service
#[cfg(test)]
pub(crate) fn test_state(store: Store) -> Arc<AppState> {
    Arc::new(AppState::new(
        Config::default(),
        store,
        Arc::new(llm::DisabledClient),
    ))
}
