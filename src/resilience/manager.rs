//! Registry of breakers keyed by dependency name.
//!
//! Breakers are created lazily on first lookup with the per-component
//! override from [`CircuitBreakersConfig`] or its default.

use crate::config::CircuitBreakersConfig;
use crate::resilience::{CircuitBreaker, CircuitBreakerMetrics, DependencyHealthReport};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug)]
pub struct CircuitBreakerManager {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    config: CircuitBreakersConfig,
}

impl CircuitBreakerManager {
    pub fn from_config(config: &CircuitBreakersConfig) -> Self {
        debug!(
            enabled = config.enabled,
            overrides = config.component_configs.len(),
            "Circuit breaker registry ready"
        );
        Self {
            breakers: DashMap::new(),
            config: config.clone(),
        }
    }

    /// Whether dependencies should be wrapped in breakers at all
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Shared breaker for `component`, created on first use
    pub fn get_circuit_breaker(&self, component: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(component) {
            return Arc::clone(existing.value());
        }

        let entry = self.breakers.entry(component.to_string()).or_insert_with(|| {
            let settings = self.config.config_for_component(component);
            debug!(
                component = component,
                failure_threshold = settings.failure_threshold,
                reset_timeout_ms = settings.reset_timeout_ms,
                "Registering circuit breaker"
            );
            Arc::new(CircuitBreaker::new(component, settings.to_resilience_config()))
        });
        Arc::clone(entry.value())
    }

    pub fn list_components(&self) -> Vec<String> {
        self.breakers.iter().map(|e| e.key().clone()).collect()
    }

    pub fn get_component_metrics(&self, component: &str) -> Option<CircuitBreakerMetrics> {
        self.breakers.get(component).map(|b| b.metrics())
    }

    pub fn get_system_metrics(&self) -> DependencyHealthReport {
        self.breakers
            .iter()
            .map(|e| (e.key().clone(), e.value().metrics()))
            .collect()
    }

    /// Trip every registered breaker
    pub fn force_open_all(&self) {
        warn!(count = self.breakers.len(), "Tripping all circuit breakers");
        self.breakers.iter().for_each(|e| e.value().force_open());
    }

    pub fn force_close_all(&self) {
        warn!(count = self.breakers.len(), "Closing all circuit breakers");
        self.breakers.iter().for_each(|e| e.value().force_closed());
    }

    /// Drop a breaker; the next lookup starts it fresh and closed
    pub fn remove_circuit_breaker(&self, component: &str) -> bool {
        self.breakers.remove(component).is_some()
    }
}
