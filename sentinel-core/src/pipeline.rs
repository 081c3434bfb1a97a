//! Wires the filter manager, correlation engine, security detector, and
//! storage layer into the dispatcher's handler seam (§4.10, data flow
//! in §1). Each component is optional: a deployment with no filters
//! configured simply skips that step.

use std::sync::Arc;

use sentinel_contracts::{EventHandler, HandlerContext, HandlerError};
use sentinel_model::Event;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::correlation::{CorrelationEngine, SecurityDetector};
use crate::filter::FilterManager;
use crate::storage::StorageLayer;

/// Registered as the dispatcher's primary handler. Runs the filter
/// registry, the correlation/pattern/anomaly engine, and the security
/// detector over every event, then stores it with the security flag
/// the detector produced.
///
/// `store` on [`StorageLayer`] is async (it drives `sqlx`), but
/// [`EventHandler::handle`] is sync — thread pool workers are plain OS
/// threads, not tokio tasks. `runtime` bridges the two with
/// `Handle::block_on`, which is valid off the runtime's own worker
/// threads.
pub struct EventPipeline {
    filters: Option<Arc<FilterManager>>,
    correlation: Option<Arc<CorrelationEngine>>,
    security: Option<Arc<SecurityDetector>>,
    storage: Arc<StorageLayer>,
    runtime: Handle,
}

impl EventPipeline {
    pub fn new(storage: Arc<StorageLayer>, runtime: Handle) -> Self {
        Self {
            filters: None,
            correlation: None,
            security: None,
            storage,
            runtime,
        }
    }

    pub fn with_filters(mut self, filters: Arc<FilterManager>) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn with_correlation(mut self, correlation: Arc<CorrelationEngine>) -> Self {
        self.correlation = Some(correlation);
        self
    }

    pub fn with_security(mut self, security: Arc<SecurityDetector>) -> Self {
        self.security = Some(security);
        self
    }
}

impl EventHandler for EventPipeline {
    fn name(&self) -> &str {
        "event-pipeline"
    }

    fn handle(&self, event: &Event, _ctx: &HandlerContext) -> Result<(), HandlerError> {
        if let Some(filters) = &self.filters {
            let mut matched = Vec::new();
            filters.eval_all(event, &mut matched, 16);
            if !matched.is_empty() {
                debug!(filters = ?matched, sequence = event.sequence, "filter match");
            }
        }

        if let Some(correlation) = &self.correlation {
            let outcome = correlation.process(event);
            for result in &outcome.correlations {
                info!(
                    rule = %result.rule_name,
                    correlation_id = result.correlation_id,
                    event_count = result.event_count,
                    "correlation rule fired"
                );
            }
            for pattern in &outcome.patterns {
                debug!(?pattern, "pattern detected");
            }
            for anomaly in &outcome.anomalies {
                info!(?anomaly, "anomaly detected");
            }
        }

        let is_security = match &self.security {
            Some(security) => {
                let alerts = security.process(event);
                for alert in &alerts {
                    warn!(
                        kind = ?alert.kind,
                        severity = ?alert.severity,
                        interface = %alert.interface,
                        "{}",
                        alert.message
                    );
                }
                !alerts.is_empty()
            }
            None => false,
        };

        let stored = self.runtime.block_on(self.storage.store(event, is_security));
        if !stored {
            return Err(HandlerError::Failed(
                "one or more storage sinks failed".to_string(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for EventPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPipeline")
            .field("filters", &self.filters.is_some())
            .field("correlation", &self.correlation.is_some())
            .field("security", &self.security.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::{CorrelationConfig, SecurityConfig};
    use crate::storage::StorageLayerBuilder;
    use sentinel_model::{EventType, Payload};

    fn sample_event() -> Event {
        Event::new(EventType::Link, 16, 1, Payload::Empty)
    }

    #[tokio::test]
    async fn runs_end_to_end_with_every_component_wired() {
        let storage = Arc::new(StorageLayerBuilder::new().with_buffer(8).build(None));
        let pipeline = EventPipeline::new(storage, Handle::current())
            .with_filters(Arc::new(FilterManager::new()))
            .with_correlation(Arc::new(CorrelationEngine::new(CorrelationConfig::default())))
            .with_security(Arc::new(SecurityDetector::new(SecurityConfig::default())));

        let event = sample_event();
        let ctx = HandlerContext::default();
        pipeline.handle(&event, &ctx).unwrap();
    }

    #[tokio::test]
    async fn works_with_no_optional_components_registered() {
        let storage = Arc::new(StorageLayerBuilder::new().with_buffer(8).build(None));
        let pipeline = EventPipeline::new(storage, Handle::current());

        let event = sample_event();
        let ctx = HandlerContext::default();
        pipeline.handle(&event, &ctx).unwrap();
    }
}
