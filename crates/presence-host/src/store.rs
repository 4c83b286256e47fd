//! Entity state storage.

use dashmap::DashMap;
use presence_core::events::StateChangedData;
use presence_core::{Context, EntityId, State};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::bus::EventBus;

/// Tracks the current state of every entity and fires `state_changed`
/// events on writes.
pub struct StateStore {
    /// All entity states keyed by entity_id string.
    states: DashMap<String, State>,
    /// Event bus for firing state change events.
    event_bus: Arc<EventBus>,
}

impl StateStore {
    /// Create a new state store backed by the given event bus.
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            states: DashMap::new(),
            event_bus,
        }
    }

    /// Set the state of an entity.
    ///
    /// `last_changed` is only advanced when the state value actually
    /// changed. Fires a STATE_CHANGED event carrying old and new state.
    #[instrument(skip(self, state, attributes, context), fields(entity_id = %entity_id))]
    pub fn set(
        &self,
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> State {
        let entity_id_str = entity_id.to_string();

        let old_state = self.states.get(&entity_id_str).map(|s| s.clone());

        let new_state = match &old_state {
            Some(existing) => existing.with_update(state, attributes, context.clone()),
            None => State::new(entity_id.clone(), state, attributes, context.clone()),
        };

        debug!(
            state = %new_state.state,
            changed = old_state.as_ref().map(|s| s.state != new_state.state).unwrap_or(true),
            "Setting entity state"
        );

        self.states.insert(entity_id_str, new_state.clone());

        self.event_bus.fire_typed(
            StateChangedData {
                entity_id,
                old_state,
                new_state: Some(new_state.clone()),
            },
            context,
        );

        new_state
    }

    /// Get the current state of an entity.
    pub fn get(&self, entity_id: &str) -> Option<State> {
        self.states.get(entity_id).map(|s| s.clone())
    }

    /// Get the state value as a string, or None if the entity is unknown.
    pub fn get_state(&self, entity_id: &str) -> Option<String> {
        self.states.get(entity_id).map(|s| s.state.clone())
    }

    /// Check if an entity is in a specific state.
    pub fn is_state(&self, entity_id: &str, state: &str) -> bool {
        self.get_state(entity_id).as_deref() == Some(state)
    }

    /// Remove an entity's state.
    ///
    /// Fires a STATE_CHANGED event with None for the new state.
    pub fn remove(&self, entity_id: &EntityId, context: Context) -> Option<State> {
        let old_state = self.states.remove(&entity_id.to_string()).map(|(_, s)| s);

        if let Some(ref state) = old_state {
            self.event_bus.fire_typed(
                StateChangedData {
                    entity_id: entity_id.clone(),
                    old_state: Some(state.clone()),
                    new_state: None,
                },
                context,
            );
        }

        old_state
    }

    /// Total number of tracked entities.
    pub fn entity_count(&self) -> usize {
        self.states.len()
    }
}

/// Thread-safe wrapper for StateStore.
pub type SharedStateStore = Arc<StateStore>;

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (Arc<EventBus>, StateStore) {
        let bus = Arc::new(EventBus::new());
        let store = StateStore::new(bus.clone());
        (bus, store)
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (_bus, store) = store();
        let id = EntityId::new("light", "hall").unwrap();

        store.set(id.clone(), "on", HashMap::new(), Context::new());

        assert_eq!(store.get_state("light.hall").as_deref(), Some("on"));
        assert!(store.is_state("light.hall", "on"));
        assert!(!store.is_state("light.hall", "off"));
        assert!(store.get_state("light.missing").is_none());
    }

    #[tokio::test]
    async fn test_set_fires_state_changed() {
        let (bus, store) = store();
        let mut rx = bus.subscribe_typed::<StateChangedData>();
        let id = EntityId::new("binary_sensor", "motion").unwrap();

        store.set(id.clone(), "off", HashMap::new(), Context::new());
        store.set(id, "on", HashMap::new(), Context::new());

        let first = rx.recv().await.unwrap();
        assert!(first.data.old_state.is_none());

        let second = rx.recv().await.unwrap();
        assert_eq!(second.data.old_state.unwrap().state, "off");
        assert_eq!(second.data.new_state.unwrap().state, "on");
    }

    #[tokio::test]
    async fn test_event_carries_write_context() {
        let (bus, store) = store();
        let mut rx = bus.subscribe_typed::<StateChangedData>();
        let id = EntityId::new("light", "hall").unwrap();

        let ctx = Context::new();
        store.set(id, "on", HashMap::new(), ctx.clone());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.context.id, ctx.id);
        assert_eq!(event.data.new_state.unwrap().context.id, ctx.id);
    }
}
