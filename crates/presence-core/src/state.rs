//! State type representing an entity's current state.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Context, EntityId, STATE_UNAVAILABLE, STATE_UNKNOWN};

/// The state of an entity at a point in time.
///
/// Carries the state value (always a string), an attribute map, timestamps,
/// and the context of the change that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    /// The entity this state belongs to.
    pub entity_id: EntityId,

    /// The state value (e.g., "on", "off", "unavailable").
    pub state: String,

    /// Additional attributes associated with the state.
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,

    /// When the state value last changed.
    pub last_changed: DateTime<Utc>,

    /// When the state was last written, even if the value was unchanged.
    pub last_updated: DateTime<Utc>,

    /// Context of the change that created this state.
    pub context: Context,
}

impl State {
    /// Create a new state with the current timestamp.
    pub fn new(
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> Self {
        let now = Utc::now();
        Self {
            entity_id,
            state: state.into(),
            attributes,
            last_changed: now,
            last_updated: now,
            context,
        }
    }

    /// Create an updated state, preserving last_changed when the value is
    /// unchanged.
    pub fn with_update(
        &self,
        new_state: impl Into<String>,
        new_attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> Self {
        let now = Utc::now();
        let new_state = new_state.into();
        let changed = self.state != new_state;

        Self {
            entity_id: self.entity_id.clone(),
            state: new_state,
            attributes: new_attributes,
            last_changed: if changed { now } else { self.last_changed },
            last_updated: now,
            context,
        }
    }

    /// Whether the entity is unreachable.
    pub fn is_unavailable(&self) -> bool {
        self.state == STATE_UNAVAILABLE
    }

    /// Whether the state value is unknown.
    pub fn is_unknown(&self) -> bool {
        self.state == STATE_UNKNOWN
    }

    /// Get an attribute value by key, deserialized into the requested type.
    pub fn attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        // Timestamps and context are not compared.
        self.entity_id == other.entity_id
            && self.state == other.state
            && self.attributes == other.attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light() -> EntityId {
        EntityId::new("light", "office").unwrap()
    }

    #[test]
    fn test_update_preserves_last_changed_on_same_value() {
        let first = State::new(light(), "on", HashMap::new(), Context::new());
        let second = first.with_update("on", HashMap::new(), Context::new());

        assert_eq!(second.last_changed, first.last_changed);
        assert!(second.last_updated >= first.last_updated);
    }

    #[test]
    fn test_update_moves_last_changed_on_new_value() {
        let first = State::new(light(), "on", HashMap::new(), Context::new());
        let second = first.with_update("off", HashMap::new(), Context::new());

        assert!(second.last_changed >= first.last_changed);
        assert_eq!(second.state, "off");
    }

    #[test]
    fn test_attribute_lookup() {
        let mut attrs = HashMap::new();
        attrs.insert("previous_valid_state".to_string(), serde_json::json!("off"));
        let state = State::new(light(), "2024-01-01T00:00:00", attrs, Context::new());

        assert_eq!(
            state.attribute::<String>("previous_valid_state").as_deref(),
            Some("off")
        );
        assert_eq!(state.attribute::<String>("missing"), None);
    }
}
