//! Presence-based automation rules engine.
//!
//! Each room gets a [`Coordinator`] driving its controlled entities from
//! occupancy: trigger sensors switch entities to their detected state,
//! clearing sensors gate the delayed return to the cleared state, and
//! externally-caused transitions pause automation per entity until the
//! occupant signals otherwise. Sensors published through real-last-changed
//! indirection are resolved to their semantic state transparently.
//!
//! The engine consumes the host surface from `presence-host` (event bus,
//! state store, service registry) and never talks to devices directly.

pub mod config;
pub mod coordinator;
pub mod effective;
pub mod entity_state;
pub mod guard;
pub mod manual;
pub mod occupancy;
pub mod presence_lock;
pub mod services;
pub mod timer;

pub use config::{
    AutomationMode, ConfigError, ControlledEntityConfig, ManualControlPolicy, RoomConfig,
    DEFAULT_OFF_DELAY_SECS, NO_ACTION,
};
pub use coordinator::{Coordinator, EngineError};
pub use effective::{EffectiveStates, ATTR_PREVIOUS_VALID_STATE, REAL_LAST_CHANGED_SUFFIX};
pub use entity_state::{EntityRuntime, ObserverHandle, RECENT_CONTEXT_CAPACITY};
pub use guard::{NoGuard, ProactiveGuard};
pub use manual::ManualAssessment;
pub use occupancy::PresenceAggregator;
pub use presence_lock::LockViolation;
pub use services::{
    register_services, CoordinatorRegistry, DOMAIN, SERVICE_PAUSE, SERVICE_RESUME,
};
pub use timer::OffTimer;
