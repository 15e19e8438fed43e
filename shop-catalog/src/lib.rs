pub mod product;
pub mod pricing;
pub mod inventory;

pub use product::Product;
pub use pricing::{effective_unit_price, PricedLine, PriceSnapshot};
pub use inventory::{check_stock, BalancePatch, BalanceUpdate, StockDemand, StockError, StockRequest};
