//! Presence-lock arbitration.
//!
//! For entities in presence-lock mode, a transition that contradicts the
//! room's occupancy is a violation and gets corrected by force-issuing the
//! opposite action. This reactive path is a fallback: when a proactive
//! guard already covers the entity the conflicting command never reached
//! the device and no correction is needed.

use crate::config::ControlledEntityConfig;

/// The corrective action for a presence-lock violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockViolation {
    /// Detected state was set in an empty room: force the cleared action.
    ForceCleared,

    /// Cleared state was set in an occupied room: force the detected action.
    ForceDetected,
}

/// Check a transition to `target_state` against the presence-lock rules.
///
/// Returns the corrective action to force-issue, or `None` when the
/// transition is permitted (or when `guard_active` indicates the proactive
/// mechanism already enforces this entity).
pub fn check(
    config: &ControlledEntityConfig,
    target_state: &str,
    occupied: bool,
    guard_active: bool,
) -> Option<LockViolation> {
    if !config.presence_lock_enabled() || guard_active {
        return None;
    }

    if target_state == config.detected_state && config.require_occupancy_for_detected && !occupied {
        return Some(LockViolation::ForceCleared);
    }

    if target_state == config.cleared_state && config.require_vacancy_for_cleared && occupied {
        return Some(LockViolation::ForceDetected);
    }

    None
}
