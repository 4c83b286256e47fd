//! Core host-platform types shared across the presence-rules workspace.
//!
//! These are the types the automation engine exchanges with the host
//! platform: validated entity identifiers, entity states with attribute
//! maps, causality-tracking contexts, typed events and service calls.

mod context;
mod entity_id;
mod event;
mod service_call;
mod state;

pub use context::Context;
pub use entity_id::{EntityId, EntityIdError};
pub use event::{Event, EventData, EventType};
pub use service_call::ServiceCall;
pub use state::State;

/// Canonical "on" state literal.
pub const STATE_ON: &str = "on";

/// Canonical "off" state literal.
pub const STATE_OFF: &str = "off";

/// State literal reported when an entity cannot be reached.
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// State literal reported when an entity's state is not known.
pub const STATE_UNKNOWN: &str = "unknown";

/// Standard event types fired by the host platform.
pub mod events {
    use super::*;

    /// Event type for state changes.
    pub const STATE_CHANGED: &str = "state_changed";

    /// Event type fired before a service handler is dispatched.
    pub const CALL_SERVICE: &str = "call_service";

    /// Data for STATE_CHANGED events.
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct StateChangedData {
        pub entity_id: EntityId,
        pub old_state: Option<State>,
        pub new_state: Option<State>,
    }

    impl EventData for StateChangedData {
        fn event_type() -> &'static str {
            STATE_CHANGED
        }
    }

    /// Data for CALL_SERVICE events.
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct CallServiceData {
        pub domain: String,
        pub service: String,
        pub service_data: serde_json::Value,
    }

    impl EventData for CallServiceData {
        fn event_type() -> &'static str {
            CALL_SERVICE
        }
    }

    impl CallServiceData {
        /// Target entity ids carried in the service data, handling both the
        /// single-string and array forms.
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
}
