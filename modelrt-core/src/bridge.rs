//! Collaborator capabilities: external bridges and notification sinks.

use crate::error::BridgeError;
use crate::instance::InstanceRef;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Keyed arguments of a bridge operation.
pub type BridgeArgs = Map<String, Value>;

/// Builds [`BridgeArgs`] from `(name, value)` pairs.
pub fn bridge_args<const N: usize>(pairs: [(&str, Value); N]) -> BridgeArgs {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

/// Converts an instance handle to a bridge argument.
pub fn instance_arg(handle: &InstanceRef) -> Value {
    serde_json::to_value(handle).unwrap_or(Value::Null)
}

/// An external service reached from transition actions (inventory, payment,
/// dispensing, ...).
///
/// Operations are fire-and-forget: nothing a bridge returns is consulted
/// beyond success or failure.
pub trait ExternalBridge: Send + Sync {
    /// Name the bridge is registered under ("PS", "IS", ...).
    fn name(&self) -> &str;

    fn invoke(&self, operation: &str, args: &BridgeArgs) -> Result<(), BridgeError>;
}

/// Something that can show notifications to a user.
pub trait Notifiable: Send + Sync {
    fn show_message(&self, text: &str);

    fn show_error(&self, text: &str);

    fn show_qr(&self);
}

/// Registry of bridges wired at start-up.
#[derive(Default)]
pub struct Bridges {
    bridges: DashMap<String, Arc<dyn ExternalBridge>>,
}

impl Bridges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a bridge under its own name, replacing any previous one.
    pub fn register(&self, bridge: Arc<dyn ExternalBridge>) {
        tracing::debug!("bridge {} registered", bridge.name());
        self.bridges.insert(bridge.name().to_string(), bridge);
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.bridges.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ExternalBridge>> {
        self.bridges.get(name).map(|b| b.value().clone())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.bridges.contains_key(name)
    }

    /// Invokes `bridge::operation`. Never fails: a missing bridge or a
    /// bridge error is logged and ignored. Returns true if the call went
    /// through.
    pub fn call(&self, bridge: &str, operation: &str, args: BridgeArgs) -> bool {
        let Some(target) = self.get(bridge) else {
            tracing::warn!(
                "external entity {} not wired; {}::{} skipped",
                bridge,
                bridge,
                operation
            );
            return false;
        };

        tracing::debug!("bridge call {}::{}", bridge, operation);
        match target.invoke(operation, &args) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    "bridge call {}::{} failed [{}]: {}",
                    bridge,
                    operation,
                    e.error_code(),
                    e
                );
                false
            }
        }
    }
}
