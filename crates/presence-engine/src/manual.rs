//! Manual-control classification.
//!
//! Given the canonical target state of an externally-caused transition,
//! decide what happens to the entity's transient pause flag. Evidence
//! filtering (self-attribution, indirection-sensor resolution, presence-
//! lock precedence) happens in the coordinator before this runs.

use crate::config::{ControlledEntityConfig, ManualControlPolicy};

/// Outcome of classifying a manual transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualAssessment {
    /// Pause automation for this entity.
    Pause,

    /// Resume automation for this entity.
    Resume,

    /// The transition carries no pause/resume meaning.
    NoEffect,
}

/// Classify a manual transition to `target_state`.
///
/// With an explicit disable-state list, membership pauses and everything
/// else resumes (an empty list therefore never pauses and always resumes).
/// In legacy mode only the configured cleared-state literal pauses and only
/// the detected-state literal resumes; other literals have no effect.
pub fn classify(config: &ControlledEntityConfig, target_state: &str) -> ManualAssessment {
    match config.manual_policy() {
        ManualControlPolicy::Explicit(states) => {
            if states.contains(target_state) {
                ManualAssessment::Pause
            } else {
                ManualAssessment::Resume
            }
        }
        ManualControlPolicy::Legacy => {
            if target_state == config.cleared_state {
                ManualAssessment::Pause
            } else if target_state == config.detected_state {
                ManualAssessment::Resume
            } else {
                ManualAssessment::NoEffect
            }
        }
    }
}
