//! Product (PRD).

use crate::schema::kinds;
use modelrt_core::{Attributes, InstanceId, InstanceRef, Kind, Runtime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductAttrs {
    pub product_code: String,
    pub name: String,
    pub price: f64,
    pub stock: i64,
}

/// A product on sale.
pub struct Product {
    handle: InstanceRef,
    attrs: Attributes<ProductAttrs>,
}

impl_entity!(Product);

impl Product {
    pub fn new(id: InstanceId) -> Self {
        Self {
            handle: InstanceRef::new(kinds::PRODUCT, id),
            attrs: Attributes::new(ProductAttrs::default()),
        }
    }

    pub fn attrs(&self) -> &Attributes<ProductAttrs> {
        &self.attrs
    }

    pub fn product_code(&self) -> String {
        self.attrs.read().product_code.clone()
    }

    pub fn price(&self) -> f64 {
        self.attrs.read().price
    }

    pub fn stock(&self) -> i64 {
        self.attrs.read().stock
    }

    pub fn in_stock(&self) -> bool {
        self.stock() > 0
    }

    /// Takes one unit out of stock and returns the new level.
    pub fn take_one(&self) -> i64 {
        let mut attrs = self.attrs.write();
        attrs.stock -= 1;
        attrs.stock
    }

    /// First stored product with the given code.
    pub fn find_by_code(runtime: &Runtime, code: &str) -> Option<Arc<Product>> {
        runtime
            .instances()
            .select_all_as::<Product>(&Kind::from(kinds::PRODUCT))
            .into_iter()
            .find(|product| product.attrs.read().product_code == code)
    }
}
