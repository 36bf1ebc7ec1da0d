//! Logging implementations of the inventory, payment and dispenser services.

use crate::schema::bridges;
use modelrt_core::{BridgeArgs, BridgeError, ExternalBridge};
use serde_json::Value;

fn require<'a>(
    operation: &str,
    args: &'a BridgeArgs,
    name: &str,
) -> Result<&'a Value, BridgeError> {
    args.get(name).ok_or_else(|| BridgeError::MissingArgument {
        operation: operation.to_string(),
        name: name.to_string(),
    })
}

fn unsupported(bridge: &str, operation: &str) -> BridgeError {
    BridgeError::UnsupportedOperation {
        bridge: bridge.to_string(),
        operation: operation.to_string(),
    }
}

/// Inventory service (IS).
#[derive(Debug, Default)]
pub struct InventoryService;

impl ExternalBridge for InventoryService {
    fn name(&self) -> &str {
        bridges::INVENTORY
    }

    fn invoke(&self, operation: &str, args: &BridgeArgs) -> Result<(), BridgeError> {
        match operation {
            "updateStock" => {
                let code = require(operation, args, "productCode")?;
                let stock = require(operation, args, "newStock")?;
                tracing::info!("[IS] stock of {} is now {}", code, stock);
                Ok(())
            }
            "getStockStatus" => {
                tracing::info!("[IS] stock status requested");
                Ok(())
            }
            _ => Err(unsupported(self.name(), operation)),
        }
    }
}

/// Payment service (PS).
#[derive(Debug, Default)]
pub struct PaymentService;

impl ExternalBridge for PaymentService {
    fn name(&self) -> &str {
        bridges::PAYMENT_SERVICE
    }

    fn invoke(&self, operation: &str, args: &BridgeArgs) -> Result<(), BridgeError> {
        match operation {
            "createQR" => {
                let transaction = require(operation, args, "t_instance")?;
                let qris = args.get("qrisCode").and_then(Value::as_str).unwrap_or("-");
                tracing::info!("[PS] QR created for {} ({})", transaction, qris);
                Ok(())
            }
            "validatePayment" => {
                tracing::info!("[PS] payment validation requested");
                Ok(())
            }
            _ => Err(unsupported(self.name(), operation)),
        }
    }
}

/// Dispenser (DSP).
#[derive(Debug, Default)]
pub struct Dispenser;

impl ExternalBridge for Dispenser {
    fn name(&self) -> &str {
        bridges::DISPENSER
    }

    fn invoke(&self, operation: &str, _args: &BridgeArgs) -> Result<(), BridgeError> {
        match operation {
            "activateMotor" => {
                tracing::info!("[DSP] motor activated");
                Ok(())
            }
            _ => Err(unsupported(self.name(), operation)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelrt_core::bridge_args;
    use serde_json::json;

    #[test]
    fn test_inventory_update_stock() {
        let inventory = InventoryService;
        let args = bridge_args([("productCode", json!("A1")), ("newStock", json!(4))]);
        assert!(inventory.invoke("updateStock", &args).is_ok());

        let result = inventory.invoke("updateStock", &BridgeArgs::new());
        assert!(matches!(result, Err(BridgeError::MissingArgument { .. })));
    }

    #[test]
    fn test_unsupported_operations() {
        let result = Dispenser.invoke("refund", &BridgeArgs::new());
        assert!(matches!(
            result,
            Err(BridgeError::UnsupportedOperation { .. })
        ));
        assert!(PaymentService.invoke("createQR", &BridgeArgs::new()).is_err());
    }

    #[test]
    fn test_payment_create_qr() {
        let args = bridge_args([
            ("t_instance", json!({"kind": "TXN", "id": "t-1"})),
            ("amount", json!(5000.0)),
            ("qrisCode", json!("QRIS-t-1-5000")),
        ]);
        assert!(PaymentService.invoke("createQR", &args).is_ok());

        let without_code = bridge_args([("t_instance", json!({"kind": "TXN", "id": "t-1"}))]);
        assert!(PaymentService.invoke("createQR", &without_code).is_ok());
        assert!(PaymentService.invoke("validatePayment", &BridgeArgs::new()).is_ok());
    }
}
