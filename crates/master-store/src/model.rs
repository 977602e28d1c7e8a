//! Wire types of the master store.

use serde::{Deserialize, Serialize};

pub use common::model::{Product, StockUpdated};

/// Payload returned by a completed sale.
///
/// `synced` is false when the central inventory could not be updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleReceipt {
    pub name: String,
    pub quantity: u32,
    pub remaining_stock: u32,
    pub synced: bool,
}
