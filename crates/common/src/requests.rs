//! Request payloads shared by both services.
//!
//! Fields are optional on the wire so that a missing field is reported by
//! the validator as `required` instead of failing body parsing.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::AppError;

/// Body of `POST /products/details`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct GetByNameRequest {
    #[serde(default)]
    #[validate(required, length(min = 1))]
    pub name: Option<String>,
}

impl GetByNameRequest {
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }
}

/// Body of `PATCH /products/stock`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateStockRequest {
    #[serde(default)]
    #[validate(required, length(min = 1))]
    pub name: Option<String>,
    #[serde(default)]
    #[validate(required, range(min = 0))]
    pub stock: Option<i64>,
}

impl UpdateStockRequest {
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    /// The requested stock, rejected when it does not fit a `u32`.
    pub fn stock(&self) -> Result<u32, AppError> {
        as_u32("stock", self.stock)
    }
}

/// Body of `POST /products/buy`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct BuyProductRequest {
    #[serde(default)]
    #[validate(required, length(min = 1))]
    pub name: Option<String>,
    #[serde(default)]
    #[validate(required, range(min = 1))]
    pub quantity: Option<i64>,
}

impl BuyProductRequest {
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    /// The requested quantity, rejected when it does not fit a `u32`.
    pub fn quantity(&self) -> Result<u32, AppError> {
        as_u32("quantity", self.quantity)
    }
}

/// Query of `GET /products/category`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryQuery {
    pub category: Option<String>,
}

fn as_u32(field: &str, value: Option<i64>) -> Result<u32, AppError> {
    value
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| AppError::validation(format!("Field '{field}' is out of range")))
}
