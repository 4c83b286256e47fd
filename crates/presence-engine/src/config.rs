//! Room and controlled-entity configuration.
//!
//! A `RoomConfig` describes one coordinated room: its trigger and clearing
//! sensors, optional activation conditions, the room-wide off delay, and
//! the set of controlled entities with their per-entity policies.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sentinel service name meaning "take no action".
pub const NO_ACTION: &str = "none";

/// Default room-wide delay before the cleared action fires, in seconds.
pub const DEFAULT_OFF_DELAY_SECS: f64 = 30.0;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),
}

/// How a controlled entity is automated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationMode {
    /// React to occupancy edges and the off-delay timer.
    #[default]
    Automatic,

    /// Additionally enforce that the entity's state never contradicts the
    /// room's occupancy (see the presence-lock arbiter).
    PresenceLock,
}

/// How manually-set states affect the transient pause flag.
///
/// `Legacy` is the behavior when `manual_disable_states` is absent from the
/// config: the configured cleared-state literal pauses and the detected-state
/// literal resumes. `Explicit` is any present list, where membership pauses
/// and non-membership resumes; an empty list means nothing ever pauses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManualControlPolicy {
    Legacy,
    Explicit(BTreeSet<String>),
}

/// Immutable per-entity configuration, supplied at setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlledEntityConfig {
    /// The controlled entity id, e.g. `light.living_room`.
    pub entity_id: String,

    /// Service invoked when presence is detected. `"none"` disables the
    /// detected action.
    #[serde(default = "default_detected_service")]
    pub detected_service: String,

    /// Service invoked when the room has cleared. `"none"` disables the
    /// cleared action.
    #[serde(default = "default_cleared_service")]
    pub cleared_service: String,

    /// State literal the detected service puts the entity into.
    #[serde(default = "default_detected_state")]
    pub detected_state: String,

    /// State literal the cleared service puts the entity into.
    #[serde(default = "default_cleared_state")]
    pub cleared_state: String,

    /// Automation mode for this entity.
    #[serde(default)]
    pub mode: AutomationMode,

    /// Whether externally-caused transitions may pause automation.
    #[serde(default = "default_true")]
    pub disable_on_external_control: bool,

    /// Presence-lock: the detected state may not be set while the room is
    /// empty.
    #[serde(default)]
    pub require_occupancy_for_detected: bool,

    /// Presence-lock: the cleared state may not be set while the room is
    /// occupied.
    #[serde(default)]
    pub require_vacancy_for_cleared: bool,

    /// States that pause automation when set manually. Absent means legacy
    /// behavior; an empty list means no state ever pauses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_disable_states: Option<Vec<String>>,

    /// Per-entity off-delay override in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub off_delay: Option<f64>,

    /// Indirection sensor whose `previous_valid_state` attribute carries
    /// this entity's real last state across host restarts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rlc_tracking_entity: Option<String>,

    /// Whether the user-enable flag applies to this entity.
    #[serde(default = "default_true")]
    pub respects_presence_allowed: bool,

    /// Seed value for the user-enable flag.
    #[serde(default = "default_true")]
    pub initial_presence_allowed: bool,

    /// Whether an installed proactive guard may cover this entity.
    #[serde(default = "default_true")]
    pub use_interceptor: bool,
}

fn default_detected_service() -> String {
    "turn_on".to_string()
}

fn default_cleared_service() -> String {
    "turn_off".to_string()
}

fn default_detected_state() -> String {
    "on".to_string()
}

fn default_cleared_state() -> String {
    "off".to_string()
}

fn default_true() -> bool {
    true
}

fn default_off_delay() -> f64 {
    DEFAULT_OFF_DELAY_SECS
}

impl ControlledEntityConfig {
    /// The entity's domain, derived from the id's namespace prefix.
    pub fn domain(&self) -> Option<&str> {
        let (domain, rest) = self.entity_id.split_once('.')?;
        if domain.is_empty() || rest.is_empty() {
            return None;
        }
        Some(domain)
    }

    /// The manual-control policy derived from `manual_disable_states`.
    pub fn manual_policy(&self) -> ManualControlPolicy {
        match &self.manual_disable_states {
            None => ManualControlPolicy::Legacy,
            Some(states) => ManualControlPolicy::Explicit(states.iter().cloned().collect()),
        }
    }

    /// Whether presence-lock enforcement is configured at all.
    pub fn presence_lock_enabled(&self) -> bool {
        self.mode == AutomationMode::PresenceLock
            && (self.require_occupancy_for_detected || self.require_vacancy_for_cleared)
    }
}

/// One room's configuration: sensors, conditions, delay, controlled entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Human-readable room name, used for operator service targeting.
    pub room_name: String,

    /// Trigger sensors: any of these reporting effectively "on" means the
    /// room is occupied.
    #[serde(default)]
    pub presence_sensors: Vec<String>,

    /// Clearing sensors checked before the cleared action fires. Empty
    /// means the presence sensors double as the clearing set.
    #[serde(default)]
    pub clearing_sensors: Vec<String>,

    /// Condition entities that must all be effectively "on" for the
    /// detected action to fire. Clearing is never gated on these.
    #[serde(default)]
    pub activation_conditions: Vec<String>,

    /// Room-wide delay before the cleared action fires, in seconds.
    #[serde(default = "default_off_delay")]
    pub off_delay: f64,

    /// The entities this room automates.
    #[serde(default)]
    pub controlled_entities: Vec<ControlledEntityConfig>,
}

impl RoomConfig {
    /// Parse a room config from YAML.
    pub fn from_yaml(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(s)?)
    }

    /// Parse a room config from a JSON value.
    pub fn from_json(value: serde_json::Value) -> Result<Self, ConfigError> {
        Ok(serde_json::from_value(value)?)
    }

    /// The sensor set used to confirm the room has cleared.
    pub fn clearing_set(&self) -> &[String] {
        if self.clearing_sensors.is_empty() {
            &self.presence_sensors
        } else {
            &self.clearing_sensors
        }
    }
}
