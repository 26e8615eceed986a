//! Application state.

use std::sync::Arc;
use std::time::Duration;

use coin_recharge_store::Store;

use crate::config::ServiceConfig;
use crate::gateways::GatewayRegistry;
use crate::ledger::Ledger;
use crate::orchestrator::Orchestrator;
use crate::reaper::TimeoutReaper;
use crate::reconciler::Reconciler;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Configured gateway adapters.
    pub gateways: GatewayRegistry,

    /// Credit ledger.
    pub ledger: Ledger,

    /// Order creation.
    pub orchestrator: Orchestrator,

    /// Callback handling.
    pub reconciler: Reconciler,
}

impl AppState {
    /// Create application state with gateways built from the configuration.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        let gateways = GatewayRegistry::from_config(&config);
        Self::with_gateways(store, config, gateways)
    }

    /// Create application state with an explicit set of gateways.
    #[must_use]
    pub fn with_gateways(
        store: Arc<dyn Store>,
        config: ServiceConfig,
        gateways: GatewayRegistry,
    ) -> Self {
        let ledger = Ledger::new(store.clone());
        let orchestrator = Orchestrator::new(store.clone(), gateways.clone(), config.pricing);
        let reconciler = Reconciler::new(store.clone(), gateways.clone(), ledger.clone());

        Self {
            store,
            config,
            gateways,
            ledger,
            orchestrator,
            reconciler,
        }
    }

    /// A reaper over the same store, with the configured timings.
    #[must_use]
    pub fn reaper(&self) -> TimeoutReaper {
        TimeoutReaper::new(
            self.store.clone(),
            self.ledger.clone(),
            Duration::from_secs(self.config.order_timeout_seconds),
            Duration::from_secs(self.config.reaper_interval_seconds),
        )
    }
}
