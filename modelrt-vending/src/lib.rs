//! # modelrt-vending
//!
//! Vending-machine model for modelrt.
//!
//! This crate provides:
//! - Product, Transaction, Payment and UserInterface entities
//! - The vending machine state chart and its actions
//! - Logging inventory, payment and dispenser bridges
//! - Layered configuration and scripted scenarios

/// Implements `Entity` for a struct with `handle` and `attrs` fields.
macro_rules! impl_entity {
    ($ty:ty) => {
        impl modelrt_core::Entity for $ty {
            fn handle(&self) -> &modelrt_core::InstanceRef {
                &self.handle
            }

            fn get(&self, name: &str) -> serde_json::Value {
                self.attrs.get(name)
            }

            fn set(
                &self,
                name: &str,
                value: serde_json::Value,
            ) -> Result<(), modelrt_core::CoreError> {
                self.attrs.set(&self.handle.kind, name, value)
            }

            fn into_any(
                self: std::sync::Arc<Self>,
            ) -> std::sync::Arc<dyn std::any::Any + Send + Sync> {
                self
            }
        }
    };
}

pub mod bridges;
pub mod config;
pub mod machine;
pub mod model;
pub mod payment;
pub mod product;
pub mod scenario;
pub mod schema;
pub mod transaction;
pub mod ui;

pub use config::{Config, ConfigError, MachineConfig, ProductSpec};
pub use machine::VendingMachine;
pub use model::{install, seed_catalog};
pub use payment::{Payment, PaymentStatus};
pub use product::Product;
pub use scenario::{Scenario, ScenarioStep, StepOutcome};
pub use transaction::{Transaction, TransactionStatus};
pub use ui::{TracingDisplay, UserInterface};
