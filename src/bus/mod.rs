// src/bus/mod.rs
//! Event fan-out
//!
//! Components publish captured records on named topics; the panel and the
//! other components subscribe. Dispatch is synchronous and isolates
//! failing listeners from each other.

pub mod event_bus;

pub use event_bus::{
    BusStats, EventBus, EventBusConfig, ListenerError, ListenerFailure, ListenerId,
    ListenerResult, Subscription, ERROR_TOPIC,
};
