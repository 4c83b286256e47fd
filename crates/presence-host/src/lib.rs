//! Host-platform surface consumed by the presence-rules engine.
//!
//! The engine treats the host as given: an event bus delivering
//! `state_changed` and `call_service` notifications, a state store holding
//! the current state of every entity, and a service registry through which
//! devices are commanded. This crate provides all three.

mod bus;
mod services;
mod store;

pub use bus::{EventBus, SharedEventBus, TypedEventReceiver};
pub use services::{
    ServiceError, ServiceFuture, ServiceHandler, ServiceRegistry, ServiceResult,
    SharedServiceRegistry,
};
pub use store::{SharedStateStore, StateStore};
