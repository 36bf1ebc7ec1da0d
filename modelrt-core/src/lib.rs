//! # modelrt-core
//!
//! Runtime for executable object models.
//!
//! This crate provides:
//! - Instance and relationship registries
//! - Transition tables and per-instance state machines
//! - Dispatch turns with breadth-first event cascades
//! - Delayed, cancellable timer events
//! - External bridges and notification capabilities

pub mod bridge;
pub mod config;
pub mod definition;
pub mod engine;
pub mod error;
pub mod event;
pub mod instance;
pub mod machine;
pub mod registry;
pub mod relationship;
pub mod timer;

pub use bridge::{bridge_args, instance_arg, BridgeArgs, Bridges, ExternalBridge, Notifiable};
pub use config::EngineConfig;
pub use definition::{State, TableBuilder, Transition, TransitionTable};
pub use engine::{Factory, Runtime, Spawned};
pub use error::{ActionError, ActionResult, BridgeError, CoreError};
pub use event::{Payload, PendingEvent};
pub use instance::{downcast, Attributes, Entity, InstanceId, InstanceRef, Kind};
pub use machine::{ActionContext, HistoryEntry, StateMachine, StateMachineOwner};
pub use registry::InstanceRegistry;
pub use relationship::RelationshipRegistry;
pub use timer::{EventSink, TimerId, TimerService};
