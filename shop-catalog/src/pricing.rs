use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::product::Product;

/// Unit price a customer actually pays: the discount price when one is set
/// and strictly lower than the list price, otherwise the list price.
pub fn effective_unit_price(product: &Product) -> i64 {
    match product.discount_price {
        Some(discount) if product.has_effective_discount() => discount,
        _ => product.price,
    }
}

/// One priced line of an order in the making.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: i64,
}

impl PricedLine {
    pub fn line_total(&self) -> i64 {
        i64::from(self.quantity) * self.unit_price
    }
}

/// Prices captured from the live catalog at creation time. The total is
/// frozen into the payment and never recomputed afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceSnapshot {
    pub lines: Vec<PricedLine>,
}

impl PriceSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, product: &Product, quantity: i32) {
        self.lines.push(PricedLine {
            product_id: product.id,
            quantity,
            unit_price: effective_unit_price(product),
        });
    }

    pub fn total(&self) -> i64 {
        self.lines.iter().map(PricedLine::line_total).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(price: i64, discount_price: Option<i64>) -> Product {
        Product {
            id: Uuid::new_v4(),
            name: String::new(),
            price,
            discount_price,
            balance: 10,
            enabled: true,
        }
    }

    #[test]
    fn test_effective_price_rules() {
        assert_eq!(effective_unit_price(&product(10, Some(8))), 8);
        assert_eq!(effective_unit_price(&product(10, None)), 10);
        // A "discount" that is not lower is ignored
        assert_eq!(effective_unit_price(&product(10, Some(10))), 10);
        assert_eq!(effective_unit_price(&product(10, Some(12))), 10);
    }

    #[test]
    fn test_snapshot_total() {
        let mut snapshot = PriceSnapshot::new();
        snapshot.add(&product(10, Some(8)), 2);
        snapshot.add(&product(5, None), 1);

        assert_eq!(snapshot.lines.len(), 2);
        assert_eq!(snapshot.total(), 21);
    }

    #[test]
    fn test_empty_snapshot_is_zero() {
        assert_eq!(PriceSnapshot::new().total(), 0);
    }
}
