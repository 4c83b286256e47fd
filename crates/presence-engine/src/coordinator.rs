//! Coordinator orchestration.
//!
//! One coordinator manages one room: it subscribes to the host's
//! state-change and service-call events, evaluates occupancy over the
//! room's sensor sets, detects manual control on the entities it manages,
//! enforces presence-lock, and drives the per-entity delayed-off timers.
//!
//! All per-entity state lives in the coordinator's entity map and is only
//! mutated through coordinator methods. Handlers never cache the two
//! automation flags across an await; they are re-read wherever a decision
//! is made after a suspension point. Failures commanding one entity are
//! logged and absorbed so they can never stall event dispatch or affect
//! other entities.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use indexmap::IndexMap;
use presence_core::events::{CallServiceData, StateChangedData};
use presence_core::{Context, Event, STATE_OFF, STATE_ON};
use presence_host::{EventBus, ServiceRegistry, StateStore};
use serde_json::json;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::{RoomConfig, DEFAULT_OFF_DELAY_SECS, NO_ACTION};
use crate::effective::{effective_of, EffectiveStates};
use crate::entity_state::{EntityRuntime, ObserverHandle};
use crate::guard::ProactiveGuard;
use crate::manual::{self, ManualAssessment};
use crate::occupancy::PresenceAggregator;
use crate::presence_lock::{self, LockViolation};

/// Engine errors surfaced through the coordinator API.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("unknown controlled entity: {0}")]
    UnknownEntity(String),
}

/// Which of an entity's two configured actions to issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Detected,
    Cleared,
}

/// Coordinates presence automation for one room.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    /// Self-reference handed to spawned tasks so they never keep the
    /// coordinator alive.
    weak: Weak<CoordinatorInner>,
    room_name: String,
    presence_sensors: Vec<String>,
    clearing_sensors: Vec<String>,
    activation_conditions: Vec<String>,
    off_delay: Duration,
    entities: IndexMap<String, Arc<EntityRuntime>>,
    resolver: EffectiveStates,
    aggregator: PresenceAggregator,
    store: Arc<StateStore>,
    bus: Arc<EventBus>,
    services: Arc<ServiceRegistry>,
    guard: Option<Arc<dyn ProactiveGuard>>,
    listeners: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl Coordinator {
    /// Build a coordinator from a room config. Entities with a missing or
    /// malformed id, or duplicating an earlier entity, are logged and
    /// skipped; construction itself never fails.
    pub fn new(
        config: RoomConfig,
        store: Arc<StateStore>,
        bus: Arc<EventBus>,
        services: Arc<ServiceRegistry>,
    ) -> Self {
        Self::with_guard(config, store, bus, services, None)
    }

    /// Build a coordinator with an optional proactive guard installed.
    pub fn with_guard(
        config: RoomConfig,
        store: Arc<StateStore>,
        bus: Arc<EventBus>,
        services: Arc<ServiceRegistry>,
        guard: Option<Arc<dyn ProactiveGuard>>,
    ) -> Self {
        let mut entities: IndexMap<String, Arc<EntityRuntime>> = IndexMap::new();

        for entity_config in &config.controlled_entities {
            let entity_id = entity_config.entity_id.clone();
            let Some(domain) = entity_config.domain() else {
                warn!(
                    room = %config.room_name,
                    entity_id = %entity_id,
                    "Skipping controlled entity with missing or malformed id"
                );
                continue;
            };
            if entities.contains_key(&entity_id) {
                warn!(
                    room = %config.room_name,
                    entity_id = %entity_id,
                    "Skipping duplicate controlled entity"
                );
                continue;
            }
            if let Some(secs) = entity_config.off_delay {
                if Duration::try_from_secs_f64(secs).is_err() {
                    warn!(
                        room = %config.room_name,
                        entity_id = %entity_id,
                        off_delay = secs,
                        "Ignoring invalid off-delay override, using the room delay"
                    );
                }
            }
            let domain = domain.to_string();
            entities.insert(
                entity_id,
                Arc::new(EntityRuntime::new(entity_config.clone(), domain)),
            );
        }

        let off_delay = Duration::try_from_secs_f64(config.off_delay).unwrap_or_else(|_| {
            warn!(
                room = %config.room_name,
                off_delay = config.off_delay,
                "Invalid room off delay, using the default"
            );
            Duration::from_secs_f64(DEFAULT_OFF_DELAY_SECS)
        });

        let resolver = EffectiveStates::new(store.clone());
        let inner = Arc::new_cyclic(|weak| CoordinatorInner {
            weak: weak.clone(),
            room_name: config.room_name.clone(),
            presence_sensors: config.presence_sensors.clone(),
            clearing_sensors: config.clearing_set().to_vec(),
            activation_conditions: config.activation_conditions.clone(),
            off_delay,
            entities,
            aggregator: PresenceAggregator::new(resolver.clone()),
            resolver,
            store,
            bus,
            services,
            guard,
            listeners: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        });

        Self { inner }
    }

    /// The room this coordinator manages.
    pub fn room_name(&self) -> &str {
        &self.inner.room_name
    }

    /// Ids of the entities this coordinator manages, in config order.
    pub fn entity_ids(&self) -> Vec<String> {
        self.inner.entities.keys().cloned().collect()
    }

    /// Whether the coordinator is currently listening.
    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    /// Begin listening to host events and seed indirection baselines.
    /// Idempotent.
    #[instrument(skip(self), fields(room = %self.inner.room_name))]
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }

        self.inner.seed_rlc_baselines();

        let mut state_rx = self.inner.bus.subscribe_typed::<StateChangedData>();
        let weak = Arc::downgrade(&self.inner);
        let state_loop = tokio::spawn(async move {
            loop {
                let Ok(event) = state_rx.recv().await else { break };
                let Some(inner) = weak.upgrade() else { break };
                inner.handle_state_changed(event).await;
            }
        });

        let mut call_rx = self.inner.bus.subscribe_typed::<CallServiceData>();
        let weak = Arc::downgrade(&self.inner);
        let call_loop = tokio::spawn(async move {
            loop {
                let Ok(event) = call_rx.recv().await else { break };
                let Some(inner) = weak.upgrade() else { break };
                inner.handle_call_service(event).await;
            }
        });

        self.inner
            .listeners
            .lock()
            .unwrap()
            .extend([state_loop, call_loop]);

        info!(entities = self.inner.entities.len(), "Coordinator started");
    }

    /// Stop listening and cancel all timers. Idempotent; safe without a
    /// prior start.
    pub fn stop(&self) {
        for handle in self.inner.listeners.lock().unwrap().drain(..) {
            handle.abort();
        }
        for runtime in self.inner.entities.values() {
            runtime.off_timer().cancel();
        }
        if self.inner.started.swap(false, Ordering::SeqCst) {
            info!(room = %self.inner.room_name, "Coordinator stopped");
        }
    }

    /// The user-enable flag for an entity.
    pub fn get_presence_allowed(&self, entity_id: &str) -> Result<bool, EngineError> {
        Ok(self.inner.runtime(entity_id)?.presence_allowed())
    }

    /// Set the user-enable flag and reconcile: when enabling into an
    /// occupied room the detected action fires, and the entity's off
    /// timer is rescheduled either way.
    pub async fn set_presence_allowed(
        &self,
        entity_id: &str,
        value: bool,
    ) -> Result<(), EngineError> {
        self.inner.set_presence_allowed(entity_id, value).await
    }

    /// The transient pause flag for an entity.
    pub fn get_automation_paused(&self, entity_id: &str) -> Result<bool, EngineError> {
        Ok(self.inner.runtime(entity_id)?.automation_paused())
    }

    /// Set the transient pause flag. No reconciliation beyond observer
    /// notification: resuming only matters for the next qualifying event.
    pub fn set_automation_paused(&self, entity_id: &str, value: bool) -> Result<(), EngineError> {
        let runtime = self.inner.runtime(entity_id)?;
        if runtime.set_automation_paused(value) {
            debug!(entity_id = %entity_id, paused = value, "Automation pause flag changed");
            runtime.notify_observers();
        }
        Ok(())
    }

    /// Register an observer notified when either flag changes.
    pub fn register_observer(
        &self,
        entity_id: &str,
        callback: Box<dyn Fn() + Send + Sync>,
    ) -> Result<ObserverHandle, EngineError> {
        Ok(self.inner.runtime(entity_id)?.add_observer(callback))
    }

    /// Unregister a previously registered observer.
    pub fn unregister_observer(
        &self,
        entity_id: &str,
        handle: ObserverHandle,
    ) -> Result<bool, EngineError> {
        Ok(self.inner.runtime(entity_id)?.remove_observer(handle))
    }
}

impl CoordinatorInner {
    fn runtime(&self, entity_id: &str) -> Result<&Arc<EntityRuntime>, EngineError> {
        self.entities
            .get(entity_id)
            .ok_or_else(|| EngineError::UnknownEntity(entity_id.to_string()))
    }

    fn any_occupied(&self) -> bool {
        self.aggregator.any_occupied(&self.presence_sensors)
    }

    fn all_clear(&self) -> bool {
        self.aggregator.all_clear(&self.clearing_sensors)
    }

    fn conditions_met(&self) -> bool {
        self.aggregator.all_on(&self.activation_conditions)
    }

    fn guard_active(&self, runtime: &EntityRuntime) -> bool {
        runtime.config.use_interceptor
            && self
                .guard
                .as_ref()
                .map(|guard| guard.covers(&runtime.config.entity_id))
                .unwrap_or(false)
    }

    /// Record the current effective state of each entity's indirection
    /// sensor so the first live event is not mistaken for a real change.
    fn seed_rlc_baselines(&self) {
        for runtime in self.entities.values() {
            let Some(rlc) = &runtime.config.rlc_tracking_entity else {
                continue;
            };
            if runtime.last_effective_state().is_some() {
                continue;
            }
            if let Some(effective) = self.resolver.effective_state(rlc) {
                debug!(
                    entity_id = %runtime.config.entity_id,
                    sensor = %rlc,
                    state = %effective,
                    "Seeded indirection baseline"
                );
                runtime.set_last_effective_state(Some(effective));
            }
        }
    }

    async fn handle_state_changed(&self, event: Event<StateChangedData>) {
        let entity_id = event.data.entity_id.to_string();

        if self.entities.contains_key(&entity_id) {
            self.handle_controlled_change(&entity_id, &event).await;
        }
        if self.presence_sensors.contains(&entity_id) || self.clearing_sensors.contains(&entity_id)
        {
            self.handle_sensor_change(&entity_id, &event).await;
        }
        if self.activation_conditions.contains(&entity_id) {
            self.handle_condition_change(&event).await;
        }
    }

    /// A transition observed on a controlled entity: attribute it, resolve
    /// the real target state, then classify.
    async fn handle_controlled_change(
        &self,
        entity_id: &str,
        event: &Event<StateChangedData>,
    ) {
        let Ok(runtime) = self.runtime(entity_id) else {
            return;
        };
        let runtime = runtime.clone();
        let Some(new_state) = &event.data.new_state else {
            return;
        };

        // Self-caused transitions carry one of our recent command contexts.
        if runtime.is_own_context(&new_state.context) || runtime.is_own_context(&event.context) {
            return;
        }

        let target_state = if let Some(rlc) = &runtime.config.rlc_tracking_entity {
            match self.resolver.effective_state(rlc) {
                None => {
                    debug!(
                        entity_id = %entity_id,
                        sensor = %rlc,
                        "Indirection sensor unresolvable, ignoring transition"
                    );
                    return;
                }
                Some(effective) => match runtime.last_effective_state() {
                    None => {
                        // Startup snapshot, not a real change.
                        debug!(
                            entity_id = %entity_id,
                            state = %effective,
                            "Seeded indirection baseline from first event"
                        );
                        runtime.set_last_effective_state(Some(effective));
                        return;
                    }
                    Some(previous) if previous == effective => return,
                    Some(_) => {
                        runtime.set_last_effective_state(Some(effective.clone()));
                        effective
                    }
                },
            }
        } else {
            let Some(old_state) = &event.data.old_state else {
                return;
            };
            if old_state.state == new_state.state {
                return;
            }
            new_state.state.clone()
        };

        self.assess_external_transition(&runtime, &target_state)
            .await;
    }

    /// A service call targeting a controlled entity: external intent even
    /// when the device state will not change.
    async fn handle_call_service(&self, event: Event<CallServiceData>) {
        for target in event.data.entity_ids() {
            let Some(runtime) = self.entities.get(&target) else {
                continue;
            };
            let runtime = runtime.clone();
            if event.data.domain != runtime.domain {
                continue;
            }
            if runtime.is_own_context(&event.context) {
                continue;
            }

            let target_state = if event.data.service == runtime.config.detected_service {
                runtime.config.detected_state.clone()
            } else if event.data.service == runtime.config.cleared_service {
                runtime.config.cleared_state.clone()
            } else {
                continue;
            };

            self.assess_external_transition(&runtime, &target_state)
                .await;
        }
    }

    /// Steps shared by both evidence paths: presence-lock first, then the
    /// manual-control policy.
    async fn assess_external_transition(
        &self,
        runtime: &Arc<EntityRuntime>,
        target_state: &str,
    ) {
        let occupied = self.any_occupied();
        let guard_active = self.guard_active(runtime);

        if let Some(violation) =
            presence_lock::check(&runtime.config, target_state, occupied, guard_active)
        {
            info!(
                entity_id = %runtime.config.entity_id,
                target_state = %target_state,
                ?violation,
                "Presence-lock violation, issuing corrective action"
            );
            match violation {
                LockViolation::ForceCleared => self.apply_forced(runtime, Action::Cleared).await,
                LockViolation::ForceDetected => self.apply_forced(runtime, Action::Detected).await,
            }
            return;
        }

        if !runtime.config.disable_on_external_control {
            return;
        }

        match manual::classify(&runtime.config, target_state) {
            ManualAssessment::Pause => {
                if runtime.set_automation_paused(true) {
                    debug!(
                        entity_id = %runtime.config.entity_id,
                        target_state = %target_state,
                        "Manual control detected, pausing automation"
                    );
                    runtime.notify_observers();
                }
            }
            ManualAssessment::Resume => {
                if runtime.set_automation_paused(false) {
                    debug!(
                        entity_id = %runtime.config.entity_id,
                        target_state = %target_state,
                        "Manual control resumed automation"
                    );
                    runtime.notify_observers();
                }
                // Ceding control back to the expiry logic, which
                // re-evaluates clearing sensors on its own.
                if !self.any_occupied() {
                    self.restart_all_timers();
                }
            }
            ManualAssessment::NoEffect => {}
        }
    }

    /// A trigger or clearing sensor changed state.
    async fn handle_sensor_change(
        &self,
        sensor_id: &str,
        event: &Event<StateChangedData>,
    ) {
        let new_effective = event.data.new_state.as_ref().and_then(effective_of);
        let old_effective = event.data.old_state.as_ref().and_then(effective_of);
        if new_effective == old_effective {
            return;
        }

        let is_trigger = self.presence_sensors.iter().any(|id| id == sensor_id);

        match new_effective.as_deref() {
            Some(STATE_ON) if is_trigger => {
                self.on_occupied_edge().await;
            }
            Some(STATE_OFF) => {
                if !self.any_occupied() {
                    debug!(room = %self.room_name, sensor = %sensor_id, "Presence lost, scheduling off timers");
                    self.restart_all_timers();
                }
            }
            _ => {}
        }
    }

    /// An activation condition changed state. A condition becoming
    /// satisfied while the room is occupied behaves like a fresh
    /// occupied edge.
    async fn handle_condition_change(&self, event: &Event<StateChangedData>) {
        let new_effective = event.data.new_state.as_ref().and_then(effective_of);
        let old_effective = event.data.old_state.as_ref().and_then(effective_of);
        if new_effective == old_effective {
            return;
        }

        if new_effective.as_deref() == Some(STATE_ON)
            && self.conditions_met()
            && self.any_occupied()
        {
            self.on_occupied_edge().await;
        }
    }

    /// Occupancy detected: cancel timers, apply the detected action to
    /// every qualifying entity, then reschedule all timers. The
    /// unconditional reschedule keeps primer sensors working: if
    /// occupancy is never confirmed, expiry finds the clearing set clear
    /// and turns the room back off.
    async fn on_occupied_edge(&self) {
        debug!(room = %self.room_name, "Occupancy detected");

        for runtime in self.entities.values() {
            runtime.off_timer().cancel();
        }

        let conditions_met = self.conditions_met();
        for runtime in self.entities.values() {
            if conditions_met && runtime.should_automate() {
                self.apply(runtime, Action::Detected).await;
            }
        }

        self.restart_all_timers();
    }

    fn restart_all_timers(&self) {
        for runtime in self.entities.values() {
            self.start_or_restart_timer(runtime);
        }
    }

    /// The single entry point for scheduling an entity's off timer:
    /// cancel-and-replace, so two live timers cannot exist.
    fn start_or_restart_timer(&self, runtime: &Arc<EntityRuntime>) {
        runtime.off_timer().cancel();

        if !runtime.should_automate() {
            return;
        }

        // An override that cannot form a Duration was already warned about
        // at construction; it falls back to the room-wide delay here.
        let delay = runtime
            .config
            .off_delay
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .unwrap_or(self.off_delay);

        debug!(
            entity_id = %runtime.config.entity_id,
            delay_ms = delay.as_millis() as u64,
            "Scheduling off timer"
        );

        let weak = self.weak.clone();
        let target = runtime.clone();
        runtime.off_timer().schedule(delay, async move {
            if let Some(inner) = weak.upgrade() {
                inner.on_off_timer_fired(&target).await;
            }
        });
    }

    /// Timer expiry: conditions may have changed during the sleep, so the
    /// flags and the clearing sensors are both re-validated before acting.
    async fn on_off_timer_fired(&self, runtime: &Arc<EntityRuntime>) {
        if !runtime.should_automate() {
            return;
        }
        if !self.all_clear() {
            debug!(
                entity_id = %runtime.config.entity_id,
                "Clearing sensors not clear at expiry, leaving entity alone"
            );
            return;
        }

        debug!(entity_id = %runtime.config.entity_id, "Off delay elapsed");
        self.apply(runtime, Action::Cleared).await;
    }

    async fn set_presence_allowed(
        &self,
        entity_id: &str,
        value: bool,
    ) -> Result<(), EngineError> {
        let runtime = self.runtime(entity_id)?.clone();

        if runtime.set_presence_allowed(value) {
            debug!(entity_id = %entity_id, allowed = value, "Presence-allowed flag changed");
            runtime.notify_observers();
        }

        if value && self.any_occupied() && self.conditions_met() && runtime.should_automate() {
            self.apply(&runtime, Action::Detected).await;
        }
        self.start_or_restart_timer(&runtime);

        Ok(())
    }

    async fn apply(&self, runtime: &Arc<EntityRuntime>, action: Action) {
        self.apply_inner(runtime, action, false).await;
    }

    /// Forced dispatch bypasses the cleared-action short-circuit; used for
    /// presence-lock corrections where the violating command may still be
    /// in flight.
    async fn apply_forced(&self, runtime: &Arc<EntityRuntime>, action: Action) {
        self.apply_inner(runtime, action, true).await;
    }

    async fn apply_inner(
        &self,
        runtime: &Arc<EntityRuntime>,
        action: Action,
        force: bool,
    ) {
        let config = &runtime.config;
        let (service, target_state) = match action {
            Action::Detected => (config.detected_service.as_str(), config.detected_state.as_str()),
            Action::Cleared => (config.cleared_service.as_str(), config.cleared_state.as_str()),
        };

        if service == NO_ACTION {
            return;
        }

        // Detected commands always go out: a device mid-transition (e.g.
        // fading off) must be interrupted. Cleared commands skip when the
        // entity already reports the target state.
        if action == Action::Cleared
            && !force
            && self.store.is_state(&config.entity_id, target_state)
        {
            debug!(entity_id = %config.entity_id, "Already cleared, skipping command");
            return;
        }

        let context = Context::new();
        runtime.note_command_context(context.id.clone());
        runtime.set_last_effective_state(Some(target_state.to_string()));

        if let Err(err) = self
            .services
            .call(
                &runtime.domain,
                service,
                json!({ "entity_id": config.entity_id }),
                context,
            )
            .await
        {
            warn!(
                entity_id = %config.entity_id,
                service = %service,
                error = %err,
                "Device command failed"
            );
        }
    }
}
