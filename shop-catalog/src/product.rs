use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Product snapshot as served by the catalog/inventory service.
///
/// Prices are integer minor units. `balance` is the live stock count the
/// inventory service reports at the moment of the lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
    pub price: i64,
    #[serde(default)]
    pub discount_price: Option<i64>,
    pub balance: i32,
    pub enabled: bool,
}

impl Product {
    /// A product can be ordered only while it is enabled and in stock.
    pub fn is_available(&self) -> bool {
        self.enabled && self.balance > 0
    }

    /// True when a discount is set and actually undercuts the list price.
    pub fn has_effective_discount(&self) -> bool {
        matches!(self.discount_price, Some(discount) if discount < self.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(balance: i32, enabled: bool) -> Product {
        Product {
            id: Uuid::new_v4(),
            name: "Desk lamp".to_string(),
            price: 10,
            discount_price: None,
            balance,
            enabled,
        }
    }

    #[test]
    fn test_availability_needs_stock_and_enabled_flag() {
        assert!(product(3, true).is_available());
        assert!(!product(0, true).is_available());
        assert!(!product(3, false).is_available());
        assert!(!product(-1, true).is_available());
    }

    #[test]
    fn test_deserializes_remote_shape() {
        let json = serde_json::json!({
            "id": Uuid::nil(),
            "name": "Mug",
            "price": 10,
            "discountPrice": 8,
            "balance": 4,
            "enabled": true
        });

        let product: Product = serde_json::from_value(json).unwrap();
        assert_eq!(product.discount_price, Some(8));
        assert!(product.has_effective_discount());
    }
}
