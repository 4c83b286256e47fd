//! Per-entity automation state.
//!
//! One `EntityRuntime` exists per controlled entity, owned by the
//! coordinator. It holds the two independent boolean flags, the last known
//! effective state, the ring of recent outbound correlation ids, the
//! delayed-off timer, and registered observers.
//!
//! The two flags are deliberately disjoint: user toggling affects only
//! `presence_allowed`, manual-control detection affects only
//! `automation_paused`. `presence_allowed` is intended to be persisted by
//! the host platform (via observers); `automation_paused` is process-
//! lifetime only and starts false on every coordinator construction.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use presence_core::Context;
use tracing::warn;

use crate::config::ControlledEntityConfig;
use crate::timer::OffTimer;

/// Capacity of the recent-correlation-id ring.
pub const RECENT_CONTEXT_CAPACITY: usize = 20;

/// Fixed-capacity ring of recent correlation ids, oldest evicted first.
#[derive(Debug)]
pub struct ContextRing {
    buf: Vec<String>,
    head: usize,
    capacity: usize,
}

impl ContextRing {
    /// Create a ring with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            head: 0,
            capacity,
        }
    }

    /// Record an id, evicting the oldest when full.
    pub fn push(&mut self, id: String) {
        if self.buf.len() < self.capacity {
            self.buf.push(id);
        } else {
            self.buf[self.head] = id;
            self.head = (self.head + 1) % self.capacity;
        }
    }

    /// Whether the ring currently holds the id.
    pub fn contains(&self, id: &str) -> bool {
        self.buf.iter().any(|held| held == id)
    }

    /// Number of ids currently held.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether the ring is empty.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Handle returned from observer registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverHandle(u64);

type ObserverFn = Arc<dyn Fn() + Send + Sync>;

/// Mutable automation state for one controlled entity.
pub struct EntityRuntime {
    /// Immutable per-entity configuration.
    pub config: ControlledEntityConfig,

    /// Domain derived from the entity id's namespace prefix.
    pub domain: String,

    presence_allowed: AtomicBool,
    automation_paused: AtomicBool,
    last_effective_state: Mutex<Option<String>>,
    recent_contexts: Mutex<ContextRing>,
    off_timer: OffTimer,
    observers: Mutex<Vec<(u64, ObserverFn)>>,
    next_observer_id: AtomicU64,
}

impl EntityRuntime {
    /// Build runtime state for one entity. `automation_paused` always
    /// starts false; `presence_allowed` starts from config.
    pub fn new(config: ControlledEntityConfig, domain: String) -> Self {
        let presence_allowed = config.initial_presence_allowed;
        Self {
            config,
            domain,
            presence_allowed: AtomicBool::new(presence_allowed),
            automation_paused: AtomicBool::new(false),
            last_effective_state: Mutex::new(None),
            recent_contexts: Mutex::new(ContextRing::new(RECENT_CONTEXT_CAPACITY)),
            off_timer: OffTimer::new(),
            observers: Mutex::new(Vec::new()),
            next_observer_id: AtomicU64::new(1),
        }
    }

    /// The user-enable flag.
    pub fn presence_allowed(&self) -> bool {
        self.presence_allowed.load(Ordering::SeqCst)
    }

    /// Set the user-enable flag. Returns true when the value changed.
    pub fn set_presence_allowed(&self, value: bool) -> bool {
        self.presence_allowed.swap(value, Ordering::SeqCst) != value
    }

    /// The transient pause flag.
    pub fn automation_paused(&self) -> bool {
        self.automation_paused.load(Ordering::SeqCst)
    }

    /// Set the transient pause flag. Returns true when the value changed.
    pub fn set_automation_paused(&self, value: bool) -> bool {
        self.automation_paused.swap(value, Ordering::SeqCst) != value
    }

    /// Whether automation may act on this entity right now. Entities that
    /// do not respect the user-enable flag only honor the pause flag.
    pub fn should_automate(&self) -> bool {
        let allowed = !self.config.respects_presence_allowed || self.presence_allowed();
        allowed && !self.automation_paused()
    }

    /// The last observed canonical state, used to detect real transitions
    /// for indirection-tracked entities.
    pub fn last_effective_state(&self) -> Option<String> {
        self.last_effective_state.lock().unwrap().clone()
    }

    /// Record the last observed canonical state.
    pub fn set_last_effective_state(&self, state: Option<String>) {
        *self.last_effective_state.lock().unwrap() = state;
    }

    /// Record an outbound command's correlation id for self-attribution.
    pub fn note_command_context(&self, context_id: String) {
        self.recent_contexts.lock().unwrap().push(context_id);
    }

    /// Whether a context traces back to a command this coordinator issued,
    /// by exact id or by parent link.
    pub fn is_own_context(&self, context: &Context) -> bool {
        let ring = self.recent_contexts.lock().unwrap();
        if ring.contains(&context.id) {
            return true;
        }
        context
            .parent_id
            .as_deref()
            .map(|parent| ring.contains(parent))
            .unwrap_or(false)
    }

    /// The entity's delayed-off timer.
    pub fn off_timer(&self) -> &OffTimer {
        &self.off_timer
    }

    /// Register an update observer, notified on flag changes.
    pub fn add_observer(&self, callback: Box<dyn Fn() + Send + Sync>) -> ObserverHandle {
        let id = self.next_observer_id.fetch_add(1, Ordering::SeqCst);
        self.observers.lock().unwrap().push((id, Arc::from(callback)));
        ObserverHandle(id)
    }

    /// Remove a previously registered observer. Returns true if it existed.
    pub fn remove_observer(&self, handle: ObserverHandle) -> bool {
        let mut observers = self.observers.lock().unwrap();
        let before = observers.len();
        observers.retain(|(id, _)| *id != handle.0);
        observers.len() != before
    }

    /// Notify all registered observers.
    ///
    /// The callback list is snapshotted and the lock released before any
    /// callback runs, so observers may re-enter the runtime (toggle a
    /// flag, register or remove observers) without deadlocking.
    pub fn notify_observers(&self) {
        let callbacks: Vec<ObserverFn> = match self.observers.lock() {
            Ok(observers) => observers.iter().map(|(_, cb)| cb.clone()).collect(),
            Err(_) => {
                warn!(entity_id = %self.config.entity_id, "Observer list poisoned");
                return;
            }
        };
        for callback in callbacks {
            callback();
        }
    }
}

impl std::fmt::Debug for EntityRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityRuntime")
            .field("entity_id", &self.config.entity_id)
            .field("presence_allowed", &self.presence_allowed())
            .field("automation_paused", &self.automation_paused())
            .field("last_effective_state", &self.last_effective_state())
            .finish()
    }
}
