//! Wiring the vending model into a runtime.

use crate::bridges::{Dispenser, InventoryService, PaymentService};
use crate::config::{Config, ProductSpec};
use crate::machine::{transition_table, VendingMachine};
use crate::payment::Payment;
use crate::product::Product;
use crate::schema::kinds;
use crate::transaction::Transaction;
use crate::ui::{TracingDisplay, UserInterface};
use modelrt_core::{CoreError, Runtime, Spawned};
use std::sync::Arc;

/// Registers the model's kinds and the logging bridges.
pub fn install(runtime: &Runtime, config: &Config) -> Result<(), CoreError> {
    let table = Arc::new(transition_table()?);
    let settings = config.machine.clone();

    runtime.register_factory(kinds::PRODUCT, |_, id| {
        Spawned::plain(Arc::new(Product::new(id)))
    });
    runtime.register_factory(kinds::TRANSACTION, |_, id| {
        Spawned::plain(Arc::new(Transaction::new(id)))
    });
    runtime.register_factory(kinds::PAYMENT, |_, id| {
        Spawned::plain(Arc::new(Payment::new(id)))
    });
    runtime.register_factory(kinds::USER_INTERFACE, |_, id| {
        Spawned::plain(Arc::new(UserInterface::new(id, Arc::new(TracingDisplay))))
    });
    runtime.register_factory(kinds::VENDING_MACHINE, move |rt, id| {
        Spawned::stateful(Arc::new(VendingMachine::new(
            rt,
            id,
            table.clone(),
            settings.clone(),
        )))
    });

    runtime.bridges().register(Arc::new(InventoryService));
    runtime.bridges().register(Arc::new(PaymentService));
    runtime.bridges().register(Arc::new(Dispenser));

    tracing::info!(
        "vending model installed (payment timeout {}s)",
        config.machine.payment_timeout_secs
    );
    Ok(())
}

/// Creates one product per catalog entry.
pub fn seed_catalog(
    runtime: &Runtime,
    catalog: &[ProductSpec],
) -> Result<Vec<Arc<Product>>, CoreError> {
    let mut products = Vec::with_capacity(catalog.len());
    for entry in catalog {
        let product = runtime.create_as::<Product>(kinds::PRODUCT)?;
        {
            let mut attrs = product.attrs().write();
            attrs.product_code = entry.code.clone();
            attrs.name = entry.name.clone();
            attrs.price = entry.price;
            attrs.stock = entry.stock;
        }
        tracing::debug!(
            "seeded {} '{}' at {} ({} in stock)",
            entry.code,
            entry.name,
            entry.price,
            entry.stock
        );
        products.push(product);
    }
    Ok(products)
}
