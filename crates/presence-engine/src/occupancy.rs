//! Room occupancy aggregation over sensor sets.

use presence_core::STATE_OFF;

use crate::effective::EffectiveStates;

/// Answers occupancy questions for sets of sensors.
///
/// Unresolvable sensors count as not-on for occupancy and as not-clear for
/// clearing: when in doubt the room is treated as neither freshly occupied
/// nor safe to clear.
#[derive(Clone)]
pub struct PresenceAggregator {
    resolver: EffectiveStates,
}

impl PresenceAggregator {
    /// Create an aggregator over the given resolver.
    pub fn new(resolver: EffectiveStates) -> Self {
        Self { resolver }
    }

    /// True iff at least one sensor resolves effectively "on".
    pub fn any_occupied<S: AsRef<str>>(&self, sensor_ids: &[S]) -> bool {
        sensor_ids.iter().any(|id| self.resolver.is_on(id.as_ref()))
    }

    /// True iff every sensor resolves effectively "off". Any unresolved
    /// sensor makes the set not-clear.
    pub fn all_clear<S: AsRef<str>>(&self, sensor_ids: &[S]) -> bool {
        sensor_ids.iter().all(|id| {
            self.resolver.effective_state(id.as_ref()).as_deref() == Some(STATE_OFF)
        })
    }

    /// True iff every condition sensor resolves effectively "on". An empty
    /// set is trivially satisfied.
    pub fn all_on<S: AsRef<str>>(&self, sensor_ids: &[S]) -> bool {
        sensor_ids.iter().all(|id| self.resolver.is_on(id.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_core::{Context, EntityId};
    use presence_host::{EventBus, StateStore};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn aggregator() -> (Arc<StateStore>, PresenceAggregator) {
        let bus = Arc::new(EventBus::new());
        let store = Arc::new(StateStore::new(bus));
        let aggregator = PresenceAggregator::new(EffectiveStates::new(store.clone()));
        (store, aggregator)
    }

    fn set(store: &StateStore, id: &str, state: &str) {
        store.set(
            id.parse::<EntityId>().unwrap(),
            state,
            HashMap::new(),
            Context::new(),
        );
    }

    #[tokio::test]
    async fn test_any_occupied() {
        let (store, aggregator) = aggregator();
        let sensors = vec!["binary_sensor.a".to_string(), "binary_sensor.b".to_string()];

        set(&store, "binary_sensor.a", "off");
        set(&store, "binary_sensor.b", "off");
        assert!(!aggregator.any_occupied(&sensors));

        set(&store, "binary_sensor.b", "on");
        assert!(aggregator.any_occupied(&sensors));
    }

    #[tokio::test]
    async fn test_unresolved_sensor_is_not_occupied() {
        let (store, aggregator) = aggregator();
        let sensors = vec!["binary_sensor.a".to_string(), "binary_sensor.ghost".to_string()];

        set(&store, "binary_sensor.a", "off");
        assert!(!aggregator.any_occupied(&sensors));
    }

    #[tokio::test]
    async fn test_all_clear_fails_safe_on_unresolved() {
        let (store, aggregator) = aggregator();
        let sensors = vec!["binary_sensor.a".to_string(), "binary_sensor.ghost".to_string()];

        set(&store, "binary_sensor.a", "off");
        // The ghost sensor cannot be determined, so the set is not clear.
        assert!(!aggregator.all_clear(&sensors));

        set(&store, "binary_sensor.ghost", "off");
        assert!(aggregator.all_clear(&sensors));

        set(&store, "binary_sensor.a", "unavailable");
        assert!(!aggregator.all_clear(&sensors));
    }

    #[tokio::test]
    async fn test_all_on_empty_set_is_satisfied() {
        let (_store, aggregator) = aggregator();
        assert!(aggregator.all_on::<String>(&[]));
    }

    #[tokio::test]
    async fn test_all_on_requires_every_sensor() {
        let (store, aggregator) = aggregator();
        let conditions = vec!["binary_sensor.dark".to_string(), "input_boolean.home".to_string()];

        set(&store, "binary_sensor.dark", "on");
        assert!(!aggregator.all_on(&conditions));

        set(&store, "input_boolean.home", "on");
        assert!(aggregator.all_on(&conditions));
    }
}
