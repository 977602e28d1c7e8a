//! Wire types shared by both services.

use serde::{Deserialize, Serialize};

/// A catalog entry, keyed by its unique `name`.
///
/// The same shape is stored in the data file, listed by both services and
/// returned by the product service's details endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    pub stock: u32,
    pub category: String,
}

/// Payload returned by a successful stock update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockUpdated {
    pub name: String,
    pub stock: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn description_is_optional() {
        let product: Product = serde_json::from_str(
            r#"{"name":"Mug","price":12.0,"stock":3,"category":"Kitchen"}"#,
        )
        .unwrap();
        assert_eq!(product.description, "");
        assert_eq!(product.stock, 3);
    }

    #[test]
    fn negative_stock_is_rejected() {
        let result: Result<Product, _> = serde_json::from_str(
            r#"{"name":"Mug","price":12.0,"stock":-1,"category":"Kitchen"}"#,
        );
        assert!(result.is_err());
    }
}
