//! Names shared across the model: kinds, relationships, events, states and
//! user-facing messages.

/// Entity kind tags.
pub mod kinds {
    pub const PRODUCT: &str = "PRD";
    pub const VENDING_MACHINE: &str = "VM";
    pub const USER_INTERFACE: &str = "UI";
    pub const TRANSACTION: &str = "TXN";
    pub const PAYMENT: &str = "PAY";
}

/// Relationship identifiers.
pub mod rel {
    /// VendingMachine - Product (current selection).
    pub const R1: &str = "R1";
    /// VendingMachine - UserInterface.
    pub const R2: &str = "R2";
    /// VendingMachine - Transaction.
    pub const R3: &str = "R3";
    /// Transaction - Payment.
    pub const R4: &str = "R4";
}

/// Bridge names.
pub mod bridges {
    pub const INVENTORY: &str = "IS";
    pub const PAYMENT_SERVICE: &str = "PS";
    pub const DISPENSER: &str = "DSP";
}

pub mod events {
    pub const PRODUCT_SELECTED: &str = "ProductSelected";
    pub const PAYMENT_INITIATED: &str = "PaymentInitiated";
    pub const STOCK_EMPTY: &str = "StockEmpty";
    pub const PRODUCT_NOT_FOUND: &str = "ProductNotFound";
    pub const PAYMENT_SUCCESS: &str = "PaymentSuccess";
    pub const PAYMENT_FAILED: &str = "PaymentFailed";
    pub const PAYMENT_TIMEOUT: &str = "PaymentTimeout";
    pub const CANCEL_ORDER: &str = "CancelOrder";
    pub const ITEM_DISPENSED: &str = "ItemDispensed";
    pub const RESET: &str = "Reset";

    /// Payload key carrying the selected product code.
    pub const PRODUCT_CODE_PARAM: &str = "p_productCode";
}

pub mod states {
    pub const IDLE: &str = "Idle";
    pub const CHECK_STOCK: &str = "CheckStock";
    pub const PAYMENT_INITIATED: &str = "PaymentInitiated";
    pub const OUT_OF_STOCK: &str = "OutOfStock";
    pub const DISPENSING: &str = "Dispensing";
    pub const ERROR: &str = "Error";
}

pub mod messages {
    pub const OUT_OF_STOCK: &str = "Out of stock. Please select another item.";
    pub const PRODUCT_NOT_FOUND: &str = "Product not found";
    pub const PAYMENT_FAILED: &str = "Payment failed. Transaction canceled.";
    pub const PAYMENT_TIMEOUT: &str = "Payment timed out. Transaction canceled.";
    pub const ORDER_CANCELED: &str = "Order canceled.";
    pub const ITEM_DISPENSED: &str = "Item dispensed. Thank you!";
    pub const READY_AFTER_OUT_OF_STOCK: &str = "System ready for next order.";
    pub const READY_AFTER_ERROR: &str = "Initializing system. Ready.";
}
