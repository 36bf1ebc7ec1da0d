//! Payment (PAY).

use crate::schema::kinds;
use modelrt_core::{Attributes, InstanceId, InstanceRef};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    #[default]
    Waiting,
    Verified,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentAttrs {
    pub payment_id: String,
    pub qris_code: String,
    pub amount: f64,
    pub status: PaymentStatus,
}

/// A QRIS payment request backing a transaction.
pub struct Payment {
    handle: InstanceRef,
    attrs: Attributes<PaymentAttrs>,
}

impl_entity!(Payment);

impl Payment {
    pub fn new(id: InstanceId) -> Self {
        let attrs = PaymentAttrs {
            payment_id: id.to_string(),
            ..Default::default()
        };
        Self {
            handle: InstanceRef::new(kinds::PAYMENT, id),
            attrs: Attributes::new(attrs),
        }
    }

    pub fn attrs(&self) -> &Attributes<PaymentAttrs> {
        &self.attrs
    }

    /// Prepares the QRIS request for `amount` on behalf of `transaction`.
    pub fn request(&self, transaction: &InstanceRef, amount: f64) -> String {
        let mut attrs = self.attrs.write();
        attrs.amount = amount;
        attrs.status = PaymentStatus::Waiting;
        attrs.qris_code = qris_code(transaction, amount);
        attrs.qris_code.clone()
    }

    pub fn qris_code(&self) -> String {
        self.attrs.read().qris_code.clone()
    }

    pub fn status(&self) -> PaymentStatus {
        self.attrs.read().status
    }

    pub fn set_status(&self, status: PaymentStatus) {
        self.attrs.write().status = status;
    }
}

fn qris_code(transaction: &InstanceRef, amount: f64) -> String {
    format!("QRIS-{}-{:.0}", transaction.id, amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelrt_core::Entity;
    use serde_json::json;

    #[test]
    fn test_payment_request() {
        let payment = Payment::new(InstanceId::from("pay-1"));
        let txn = InstanceRef::new(kinds::TRANSACTION, "t-1");

        let code = payment.request(&txn, 5000.0);
        assert_eq!(code, "QRIS-t-1-5000");
        assert_eq!(payment.qris_code(), code);
        assert_eq!(payment.status(), PaymentStatus::Waiting);
        assert_eq!(payment.get("paymentId"), json!("pay-1"));
        assert_eq!(payment.get("amount"), json!(5000.0));

        payment.set_status(PaymentStatus::Verified);
        assert_eq!(payment.get("status"), json!("Verified"));
    }
}
