//! Seam for an optional proactive command-blocking subsystem.
//!
//! When a guard is installed and covers an entity, conflicting commands
//! are blocked before they reach the device, and the reactive presence-
//! lock arbiter steps aside for that entity.

/// A proactive mechanism that blocks conflicting commands before dispatch.
pub trait ProactiveGuard: Send + Sync {
    /// Whether the guard actively enforces presence-lock for this entity.
    fn covers(&self, entity_id: &str) -> bool;
}

/// Guard that covers nothing; the reactive arbiter handles everything.
#[derive(Debug, Default)]
pub struct NoGuard;

impl ProactiveGuard for NoGuard {
    fn covers(&self, _entity_id: &str) -> bool {
        false
    }
}
