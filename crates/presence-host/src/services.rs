//! Service registry with async handlers.

use dashmap::DashMap;
use presence_core::events::CallServiceData;
use presence_core::{Context, ServiceCall};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::bus::EventBus;

/// Result type for service calls.
pub type ServiceResult = Result<(), ServiceError>;

/// Future type for async service handlers.
pub type ServiceFuture = Pin<Box<dyn Future<Output = ServiceResult> + Send>>;

/// Service handler function type.
pub type ServiceHandler = Arc<dyn Fn(ServiceCall) -> ServiceFuture + Send + Sync>;

/// Errors that can occur when working with services.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("service not found: {domain}.{service}")]
    NotFound { domain: String, service: String },

    #[error("service call failed: {0}")]
    CallFailed(String),

    #[error("invalid service data: {0}")]
    InvalidData(String),
}

/// Manages registered services and routes calls to their handlers.
///
/// Every accepted call fires a CALL_SERVICE event on the bus before the
/// handler runs, so observers see commands even when the resulting state
/// does not change.
pub struct ServiceRegistry {
    /// Services indexed by "domain.service" key.
    services: DashMap<String, ServiceHandler>,
    /// Event bus for call_service notifications.
    event_bus: Arc<EventBus>,
}

impl ServiceRegistry {
    /// Create a new registry backed by the given event bus.
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            services: DashMap::new(),
            event_bus,
        }
    }

    /// Register a service handler for `domain.service`.
    pub fn register<F, Fut>(&self, domain: impl Into<String>, service: impl Into<String>, handler: F)
    where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        let domain = domain.into();
        let service = service.into();
        let key = format!("{}.{}", domain, service);

        debug!(domain = %domain, service = %service, "Registering service");

        let handler: ServiceHandler =
            Arc::new(move |call| Box::pin(handler(call)) as ServiceFuture);
        self.services.insert(key, handler);
    }

    /// Call a service, blocking until the handler completes.
    #[instrument(skip(self, service_data, context))]
    pub async fn call(
        &self,
        domain: &str,
        service: &str,
        service_data: serde_json::Value,
        context: Context,
    ) -> ServiceResult {
        let key = format!("{}.{}", domain, service);

        let handler = self
            .services
            .get(&key)
            .map(|h| h.clone())
            .ok_or_else(|| {
                warn!(domain = %domain, service = %service, "Service not found");
                ServiceError::NotFound {
                    domain: domain.to_string(),
                    service: service.to_string(),
                }
            })?;

        self.event_bus.fire_typed(
            CallServiceData {
                domain: domain.to_string(),
                service: service.to_string(),
                service_data: service_data.clone(),
            },
            context.clone(),
        );

        debug!(domain = %domain, service = %service, "Calling service");

        let call = ServiceCall::new(domain, service, service_data, context);
        handler(call).await
    }

    /// Check if a service exists.
    pub fn has_service(&self, domain: &str, service: &str) -> bool {
        self.services.contains_key(&format!("{}.{}", domain, service))
    }

    /// Unregister a service.
    pub fn unregister(&self, domain: &str, service: &str) -> bool {
        let removed = self
            .services
            .remove(&format!("{}.{}", domain, service))
            .is_some();

        if removed {
            debug!(domain = %domain, service = %service, "Unregistered service");
        }

        removed
    }
}

/// Thread-safe wrapper for ServiceRegistry.
pub type SharedServiceRegistry = Arc<ServiceRegistry>;
