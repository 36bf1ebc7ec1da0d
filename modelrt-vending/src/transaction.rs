//! Transaction (TXN).

use crate::schema::kinds;
use chrono::{DateTime, Utc};
use modelrt_core::{Attributes, InstanceId, InstanceRef};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    #[default]
    Pending,
    Completed,
    Canceled,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "Pending"),
            TransactionStatus::Completed => write!(f, "Completed"),
            TransactionStatus::Canceled => write!(f, "Canceled"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionAttrs {
    pub transaction_id: String,
    pub amount: f64,
    pub status: TransactionStatus,
    pub timestamp: Option<DateTime<Utc>>,
}

/// One purchase attempt.
pub struct Transaction {
    handle: InstanceRef,
    attrs: Attributes<TransactionAttrs>,
}

impl_entity!(Transaction);

impl Transaction {
    pub fn new(id: InstanceId) -> Self {
        let attrs = TransactionAttrs {
            transaction_id: id.to_string(),
            ..Default::default()
        };
        Self {
            handle: InstanceRef::new(kinds::TRANSACTION, id),
            attrs: Attributes::new(attrs),
        }
    }

    pub fn attrs(&self) -> &Attributes<TransactionAttrs> {
        &self.attrs
    }

    /// Starts the transaction for `amount`, stamped with the current time.
    pub fn open(&self, amount: f64) {
        let mut attrs = self.attrs.write();
        attrs.amount = amount;
        attrs.status = TransactionStatus::Pending;
        attrs.timestamp = Some(Utc::now());
    }

    pub fn amount(&self) -> f64 {
        self.attrs.read().amount
    }

    pub fn status(&self) -> TransactionStatus {
        self.attrs.read().status
    }

    pub fn set_status(&self, status: TransactionStatus) {
        self.attrs.write().status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelrt_core::Entity;
    use serde_json::json;

    #[test]
    fn test_open_transaction() {
        let txn = Transaction::new(InstanceId::from("t-1"));
        assert!(txn.attrs().read().timestamp.is_none());

        txn.open(7500.0);
        assert_eq!(txn.amount(), 7500.0);
        assert_eq!(txn.status(), TransactionStatus::Pending);
        assert!(txn.attrs().read().timestamp.is_some());
        assert_eq!(txn.get("transactionId"), json!("t-1"));
        assert_eq!(txn.get("status"), json!("Pending"));
    }

    #[test]
    fn test_status_by_name() {
        let txn = Transaction::new(InstanceId::from("t-2"));
        txn.set("status", json!("Completed")).unwrap();
        assert_eq!(txn.status(), TransactionStatus::Completed);
        assert!(txn.set("status", json!("Lost")).is_err());
    }
}
