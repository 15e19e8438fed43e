use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::product::Product;

/// Quantity of a product requested by one basket line.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// New absolute balance for one product.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalanceUpdate {
    pub balance: i32,
}

/// Units taken from each product by one order, several lines for the same
/// product summed into one entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct StockDemand(pub BTreeMap<Uuid, i32>);

impl StockDemand {
    /// Rejects non-positive quantities; a sum that does not fit an `i32`
    /// can never be covered by a balance and is reported as such.
    pub fn new(
        requests: &[StockRequest],
        products: &HashMap<Uuid, Product>,
    ) -> Result<Self, StockError> {
        let mut demand = BTreeMap::new();
        for request in requests {
            if request.quantity <= 0 {
                return Err(StockError::NonPositiveQuantity {
                    product_id: request.product_id,
                    quantity: request.quantity,
                });
            }
            let total: &mut i32 = demand.entry(request.product_id).or_insert(0);
            *total = total.checked_add(request.quantity).ok_or_else(|| {
                StockError::InsufficientBalance {
                    product_id: request.product_id,
                    requested: i32::MAX,
                    available: products.get(&request.product_id).map_or(0, |p| p.balance),
                }
            })?;
        }
        Ok(Self(demand))
    }

    /// Patch handing the units back on top of the balances the inventory
    /// reports now, so sales made in between are kept. Products missing
    /// from `current` are left out.
    pub fn restoring(&self, current: &HashMap<Uuid, Product>) -> BalancePatch {
        BalancePatch(
            self.0
                .iter()
                .filter_map(|(id, quantity)| {
                    current.get(id).map(|p| {
                        (
                            *id,
                            BalanceUpdate {
                                balance: p.balance.saturating_add(*quantity),
                            },
                        )
                    })
                })
                .collect(),
        )
    }

    pub fn product_ids(&self) -> Vec<Uuid> {
        self.0.keys().copied().collect()
    }
}

/// Batched balance patch, serialized as `{ "<productId>": { "balance": n } }`
/// which is the shape the inventory service accepts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct BalancePatch(pub BTreeMap<Uuid, BalanceUpdate>);

impl BalancePatch {
    /// Decrement plan: `productId -> currentBalance - requested`.
    pub fn decrement(
        demand: &StockDemand,
        products: &HashMap<Uuid, Product>,
    ) -> Result<Self, StockError> {
        let mut patch = BTreeMap::new();
        for (product_id, quantity) in &demand.0 {
            let product = products
                .get(product_id)
                .ok_or(StockError::NotAvailable(*product_id))?;
            patch.insert(
                *product_id,
                BalanceUpdate {
                    balance: product.balance - quantity,
                },
            );
        }
        Ok(Self(patch))
    }

    pub fn product_ids(&self) -> Vec<Uuid> {
        self.0.keys().copied().collect()
    }
}

/// Validates every request against the product snapshot before anything
/// is committed. Quantities and availability are checked for all lines
/// first, then balances. Returns the per-product demand.
pub fn check_stock(
    requests: &[StockRequest],
    products: &HashMap<Uuid, Product>,
) -> Result<StockDemand, StockError> {
    for request in requests {
        match products.get(&request.product_id) {
            Some(product) if product.is_available() => {}
            _ => return Err(StockError::NotAvailable(request.product_id)),
        }
    }

    let demand = StockDemand::new(requests, products)?;
    for (product_id, requested) in &demand.0 {
        let available = products[product_id].balance;
        if *requested > available {
            return Err(StockError::InsufficientBalance {
                product_id: *product_id,
                requested: *requested,
                available,
            });
        }
    }

    Ok(demand)
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StockError {
    #[error("Product not available: {0}")]
    NotAvailable(Uuid),

    #[error("Quantity for {product_id} must be positive, got {quantity}")]
    NonPositiveQuantity { product_id: Uuid, quantity: i32 },

    #[error("Not enough balance for {product_id}: requested {requested}, available {available}")]
    InsufficientBalance {
        product_id: Uuid,
        requested: i32,
        available: i32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(entries: &[(Uuid, i32, bool)]) -> HashMap<Uuid, Product> {
        entries
            .iter()
            .map(|(id, balance, enabled)| {
                (
                    *id,
                    Product {
                        id: *id,
                        name: String::new(),
                        price: 10,
                        discount_price: None,
                        balance: *balance,
                        enabled: *enabled,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_check_stock_accepts_valid_lines() {
        let (x, y) = (Uuid::new_v4(), Uuid::new_v4());
        let products = catalog(&[(x, 5, true), (y, 1, true)]);
        let requests = [
            StockRequest { product_id: x, quantity: 5 },
            StockRequest { product_id: y, quantity: 1 },
        ];

        let demand = check_stock(&requests, &products).unwrap();
        assert_eq!(demand.0[&x], 5);
        assert_eq!(demand.0[&y], 1);
    }

    #[test]
    fn test_one_unavailable_line_rejects_everything() {
        let (x, y) = (Uuid::new_v4(), Uuid::new_v4());
        let products = catalog(&[(x, 5, true), (y, 3, false)]);
        let requests = [
            StockRequest { product_id: x, quantity: 1 },
            StockRequest { product_id: y, quantity: 1 },
        ];

        assert_eq!(check_stock(&requests, &products), Err(StockError::NotAvailable(y)));
    }

    #[test]
    fn test_unknown_product_is_not_available() {
        let x = Uuid::new_v4();
        let requests = [StockRequest { product_id: x, quantity: 1 }];

        assert_eq!(check_stock(&requests, &HashMap::new()), Err(StockError::NotAvailable(x)));
    }

    #[test]
    fn test_over_quantity_rejected() {
        let x = Uuid::new_v4();
        let products = catalog(&[(x, 2, true)]);
        let requests = [StockRequest { product_id: x, quantity: 3 }];

        assert!(matches!(
            check_stock(&requests, &products),
            Err(StockError::InsufficientBalance { requested: 3, available: 2, .. })
        ));
    }

    #[test]
    fn test_duplicate_lines_are_summed() {
        let x = Uuid::new_v4();
        let products = catalog(&[(x, 3, true)]);
        let requests = [
            StockRequest { product_id: x, quantity: 2 },
            StockRequest { product_id: x, quantity: 2 },
        ];

        assert!(check_stock(&requests, &products).is_err());

        let ok = [
            StockRequest { product_id: x, quantity: 1 },
            StockRequest { product_id: x, quantity: 2 },
        ];
        let demand = check_stock(&ok, &products).unwrap();
        let patch = BalancePatch::decrement(&demand, &products).unwrap();
        assert_eq!(patch.0.len(), 1);
        assert_eq!(patch.0[&x].balance, 0);
    }

    #[test]
    fn test_non_positive_quantities_rejected() {
        let x = Uuid::new_v4();
        let products = catalog(&[(x, 5, true)]);

        for quantity in [0, -3] {
            let requests = [StockRequest { product_id: x, quantity }];
            assert_eq!(
                check_stock(&requests, &products),
                Err(StockError::NonPositiveQuantity { product_id: x, quantity })
            );
        }

        // a negative line cannot offset a positive one
        let mixed = [
            StockRequest { product_id: x, quantity: 7 },
            StockRequest { product_id: x, quantity: -3 },
        ];
        assert!(matches!(
            check_stock(&mixed, &products),
            Err(StockError::NonPositiveQuantity { quantity: -3, .. })
        ));
    }

    #[test]
    fn test_overflowing_demand_is_insufficient_balance() {
        let x = Uuid::new_v4();
        let products = catalog(&[(x, 5, true)]);
        let requests = [
            StockRequest { product_id: x, quantity: i32::MAX },
            StockRequest { product_id: x, quantity: 1 },
        ];

        assert_eq!(
            check_stock(&requests, &products),
            Err(StockError::InsufficientBalance {
                product_id: x,
                requested: i32::MAX,
                available: 5,
            })
        );
    }

    #[test]
    fn test_restoring_patch_adds_back_onto_current_balances() {
        let (x, y) = (Uuid::new_v4(), Uuid::new_v4());
        let products = catalog(&[(x, 7, true), (y, 4, true)]);
        let requests = [
            StockRequest { product_id: x, quantity: 2 },
            StockRequest { product_id: y, quantity: 1 },
        ];

        let demand = check_stock(&requests, &products).unwrap();
        let patch = BalancePatch::decrement(&demand, &products).unwrap();
        assert_eq!(patch.0[&x].balance, 5);
        assert_eq!(patch.0[&y].balance, 3);

        // x sold one more unit elsewhere meanwhile, y vanished
        let current = catalog(&[(x, 4, true)]);
        let restore = demand.restoring(&current);
        assert_eq!(restore.0.len(), 1);
        assert_eq!(restore.0[&x].balance, 6);
    }

    #[test]
    fn test_patch_wire_shape() {
        let x = Uuid::nil();
        let mut map = BTreeMap::new();
        map.insert(x, BalanceUpdate { balance: 3 });

        let json = serde_json::to_value(BalancePatch(map)).unwrap();
        assert_eq!(json[x.to_string()]["balance"], 3);
        assert_eq!(json.as_object().unwrap().len(), 1);
    }
}
