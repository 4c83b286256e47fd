//! Operator services and the multi-room registry.
//!
//! The engine owns one coordinator per room; the registry indexes them by
//! room name and backs the operator-facing pause/resume services. The
//! services pause or resume the transient automation flag across every
//! matching entity; they never touch the persisted user-enable flag.

use std::sync::Arc;

use dashmap::DashMap;
use presence_core::ServiceCall;
use presence_host::{ServiceError, ServiceRegistry, ServiceResult};
use tracing::{info, warn};

use crate::coordinator::Coordinator;

/// Service domain for operator services.
pub const DOMAIN: &str = "presence_rules";

/// Pause automation for the targeted entities.
pub const SERVICE_PAUSE: &str = "pause_automation";

/// Resume automation for the targeted entities.
pub const SERVICE_RESUME: &str = "resume_automation";

/// All live coordinators, indexed by room name.
#[derive(Default)]
pub struct CoordinatorRegistry {
    rooms: DashMap<String, Coordinator>,
}

impl CoordinatorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Insert a coordinator under its room name, returning any coordinator
    /// previously registered for that room.
    pub fn insert(&self, coordinator: Coordinator) -> Option<Coordinator> {
        self.rooms
            .insert(coordinator.room_name().to_string(), coordinator)
    }

    /// Look up a room's coordinator.
    pub fn get(&self, room_name: &str) -> Option<Coordinator> {
        self.rooms.get(room_name).map(|entry| entry.value().clone())
    }

    /// Remove and return a room's coordinator. The caller stops it.
    pub fn remove(&self, room_name: &str) -> Option<Coordinator> {
        self.rooms.remove(room_name).map(|(_, coordinator)| coordinator)
    }

    /// Whether a room is registered.
    pub fn contains(&self, room_name: &str) -> bool {
        self.rooms.contains_key(room_name)
    }

    /// Names of all registered rooms.
    pub fn room_names(&self) -> Vec<String> {
        self.rooms.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of registered rooms.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Whether no rooms are registered.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Set the pause flag across matching entities.
    ///
    /// An optional `room` filter restricts the change to one room; an
    /// unknown room is an error. Optional `entity_id` targets restrict it
    /// to specific entities; targets no coordinator manages are logged and
    /// skipped.
    fn set_paused(&self, call: &ServiceCall, value: bool) -> ServiceResult {
        let room_filter: Option<String> = call.get("room");
        let targets = call.entity_ids();

        if let Some(room) = &room_filter {
            if !self.contains(room) {
                return Err(ServiceError::InvalidData(format!("unknown room: {room}")));
            }
        }

        let mut touched = 0usize;
        for entry in self.rooms.iter() {
            let coordinator = entry.value();
            if let Some(room) = &room_filter {
                if coordinator.room_name() != room {
                    continue;
                }
            }
            for entity_id in coordinator.entity_ids() {
                if !targets.is_empty() && !targets.contains(&entity_id) {
                    continue;
                }
                if coordinator.set_automation_paused(&entity_id, value).is_ok() {
                    touched += 1;
                }
            }
        }

        if !targets.is_empty() && touched == 0 {
            warn!(
                targets = ?targets,
                "Pause/resume request matched no managed entities"
            );
        } else {
            info!(paused = value, entities = touched, "Operator pause/resume applied");
        }

        Ok(())
    }
}

/// Register the operator services against the host's service registry.
pub fn register_services(services: &ServiceRegistry, rooms: Arc<CoordinatorRegistry>) {
    let registry = rooms.clone();
    services.register(DOMAIN, SERVICE_PAUSE, move |call: ServiceCall| {
        let registry = registry.clone();
        async move { registry.set_paused(&call, true) }
    });

    let registry = rooms;
    services.register(DOMAIN, SERVICE_RESUME, move |call: ServiceCall| {
        let registry = registry.clone();
        async move { registry.set_paused(&call, false) }
    });
}
