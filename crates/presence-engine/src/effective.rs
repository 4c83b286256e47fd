//! Effective-state resolution.
//!
//! Most sensors report a semantic state ("on"/"off") directly. Real-last-
//! changed sensors instead report a volatile timestamp and carry the last
//! known real state of their source entity in an attribute, persisting it
//! across host restarts. The resolver hides that indirection: callers ask
//! for a sensor's effective state and never see the timestamp.

use presence_core::{State, STATE_OFF, STATE_ON};
use presence_host::StateStore;
use std::sync::Arc;

/// Attribute carrying the last known real state on an indirection sensor.
pub const ATTR_PREVIOUS_VALID_STATE: &str = "previous_valid_state";

/// Naming-convention suffix identifying real-last-changed sensors.
pub const REAL_LAST_CHANGED_SUFFIX: &str = "_real_last_changed";

/// Whether an entity id names a real-last-changed sensor by convention.
///
/// Pattern: `sensor.{name}_real_last_changed`.
pub fn is_real_last_changed_entity(entity_id: &str) -> bool {
    entity_id.starts_with("sensor.") && entity_id.ends_with(REAL_LAST_CHANGED_SUFFIX)
}

/// Resolve the effective state of a `State` value.
///
/// For indirection sensors (identified by naming convention or by the
/// presence of the previous-valid-state attribute) the attribute value is
/// the effective state; the raw value is a timestamp and must never be
/// compared. Unavailable and unknown states resolve to `None`.
pub fn effective_of(state: &State) -> Option<String> {
    if state.is_unavailable() || state.is_unknown() {
        return None;
    }

    let indirect = is_real_last_changed_entity(&state.entity_id.to_string())
        || state.attributes.contains_key(ATTR_PREVIOUS_VALID_STATE);

    if indirect {
        state.attribute::<String>(ATTR_PREVIOUS_VALID_STATE)
    } else {
        Some(state.state.clone())
    }
}

/// Resolves sensor readings to canonical effective states.
#[derive(Clone)]
pub struct EffectiveStates {
    store: Arc<StateStore>,
}

impl EffectiveStates {
    /// Create a resolver over the given state store.
    pub fn new(store: Arc<StateStore>) -> Self {
        Self { store }
    }

    /// The effective state of a sensor, or `None` when it cannot be
    /// determined. Callers must treat `None` as "unknown", never as a
    /// default.
    pub fn effective_state(&self, sensor_id: &str) -> Option<String> {
        self.store.get(sensor_id).as_ref().and_then(effective_of)
    }

    /// Whether the sensor's effective state is "on".
    pub fn is_on(&self, sensor_id: &str) -> bool {
        self.effective_state(sensor_id).as_deref() == Some(STATE_ON)
    }

    /// Whether the sensor's effective state is "off".
    pub fn is_off(&self, sensor_id: &str) -> bool {
        self.effective_state(sensor_id).as_deref() == Some(STATE_OFF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_core::{Context, EntityId};
    use presence_host::EventBus;
    use std::collections::HashMap;

    fn resolver() -> (Arc<StateStore>, EffectiveStates) {
        let bus = Arc::new(EventBus::new());
        let store = Arc::new(StateStore::new(bus));
        (store.clone(), EffectiveStates::new(store))
    }

    fn set(store: &StateStore, id: &str, state: &str) {
        set_with_attrs(store, id, state, HashMap::new());
    }

    fn set_with_attrs(
        store: &StateStore,
        id: &str,
        state: &str,
        attrs: HashMap<String, serde_json::Value>,
    ) {
        store.set(id.parse::<EntityId>().unwrap(), state, attrs, Context::new());
    }

    #[test]
    fn test_naming_convention() {
        assert!(is_real_last_changed_entity(
            "sensor.hall_motion_real_last_changed"
        ));
        assert!(!is_real_last_changed_entity("sensor.hall_motion"));
        assert!(!is_real_last_changed_entity(
            "binary_sensor.hall_real_last_changed"
        ));
    }

    #[tokio::test]
    async fn test_ordinary_sensor_reports_raw_state() {
        let (store, resolver) = resolver();
        set(&store, "binary_sensor.motion", "on");

        assert_eq!(
            resolver.effective_state("binary_sensor.motion").as_deref(),
            Some("on")
        );
        assert!(resolver.is_on("binary_sensor.motion"));
    }

    #[tokio::test]
    async fn test_rlc_sensor_reports_attribute_not_timestamp() {
        let (store, resolver) = resolver();
        let mut attrs = HashMap::new();
        attrs.insert(
            ATTR_PREVIOUS_VALID_STATE.to_string(),
            serde_json::json!("off"),
        );
        set_with_attrs(
            &store,
            "sensor.hall_motion_real_last_changed",
            "2024-06-01T10:00:00+00:00",
            attrs,
        );

        assert_eq!(
            resolver
                .effective_state("sensor.hall_motion_real_last_changed")
                .as_deref(),
            Some("off")
        );
        assert!(resolver.is_off("sensor.hall_motion_real_last_changed"));
    }

    #[tokio::test]
    async fn test_attribute_identifies_indirection_without_naming() {
        let (store, resolver) = resolver();
        let mut attrs = HashMap::new();
        attrs.insert(
            ATTR_PREVIOUS_VALID_STATE.to_string(),
            serde_json::json!("on"),
        );
        set_with_attrs(&store, "sensor.custom_tracker", "2024-06-01T10:00:00+00:00", attrs);

        assert_eq!(
            resolver.effective_state("sensor.custom_tracker").as_deref(),
            Some("on")
        );
    }

    #[tokio::test]
    async fn test_unknown_and_unavailable_resolve_to_none() {
        let (store, resolver) = resolver();
        set(&store, "binary_sensor.motion", "unavailable");

        assert_eq!(resolver.effective_state("binary_sensor.motion"), None);
        assert_eq!(resolver.effective_state("binary_sensor.missing"), None);
        assert!(!resolver.is_on("binary_sensor.motion"));
        assert!(!resolver.is_off("binary_sensor.motion"));
    }

    #[tokio::test]
    async fn test_rlc_sensor_without_attribute_resolves_to_none() {
        let (store, resolver) = resolver();
        set(
            &store,
            "sensor.hall_motion_real_last_changed",
            "2024-06-01T10:00:00+00:00",
        );

        assert_eq!(
            resolver.effective_state("sensor.hall_motion_real_last_changed"),
            None
        );
    }
}
