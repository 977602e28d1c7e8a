//! Product-service payloads.

use serde::{Deserialize, Serialize};

pub use common::model::{Product, StockUpdated};

/// Payload returned by a successful purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    pub name: String,
    pub quantity: u32,
    pub remaining_stock: u32,
}
