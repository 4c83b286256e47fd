//! Service call type for invoking host services.

use crate::Context;
use serde::{Deserialize, Serialize};

/// A call to a host service, the primary way devices are commanded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCall {
    /// The domain the service belongs to (e.g., "light", "switch").
    pub domain: String,

    /// The service name (e.g., "turn_on", "turn_off").
    pub service: String,

    /// Data passed to the service (e.g., entity_id, brightness).
    pub service_data: serde_json::Value,

    /// Context tracking who initiated this call.
    pub context: Context,
}

impl ServiceCall {
    /// Create a new service call.
    pub fn new(
        domain: impl Into<String>,
        service: impl Into<String>,
        service_data: serde_json::Value,
        context: Context,
    ) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            service_data,
            context,
        }
    }

    /// The full service identifier (domain.service).
    pub fn service_id(&self) -> String {
        format!("{}.{}", self.domain, self.service)
    }

    /// Get a value from the service data.
    pub fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.service_data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Target entity ids, handling both single-string and array forms.
    pub fn entity_ids(&self) -> Vec<String> {
        match self.service_data.get("entity_id") {
            Some(serde_json::Value::String(s)) => vec![s.clone()],
            Some(serde_json::Value::Array(arr)) => arr
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_service_id() {
        let call = ServiceCall::new("light", "turn_on", json!({}), Context::new());
        assert_eq!(call.service_id(), "light.turn_on");
    }

    #[test]
    fn test_entity_ids_single_and_array() {
        let single = ServiceCall::new(
            "light",
            "turn_on",
            json!({"entity_id": "light.hall"}),
            Context::new(),
        );
        assert_eq!(single.entity_ids(), vec!["light.hall"]);

        let many = ServiceCall::new(
            "light",
            "turn_off",
            json!({"entity_id": ["light.hall", "light.porch"]}),
            Context::new(),
        );
        assert_eq!(many.entity_ids(), vec!["light.hall", "light.porch"]);

        let none = ServiceCall::new("light", "turn_off", json!({}), Context::new());
        assert!(none.entity_ids().is_empty());
    }
}
