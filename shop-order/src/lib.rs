pub mod aggregator;
pub mod compensation;
pub mod error;
pub mod memory;
pub mod models;
pub mod notifications;
pub mod orchestrator;
pub mod patch;
pub mod query;
pub mod repository;
pub mod rules;
pub mod settlement;
pub mod status;

pub use aggregator::{LineView, OrderAggregator, OrderView, PaymentView};
pub use compensation::{CompensationOutcome, CompensationRecord};
pub use error::{OrderError, OrderResult};
pub use memory::{InMemoryCollaborators, InMemoryOrderRepository};
pub use models::{Order, OrderLine, OrderStatus, Payment, PaymentStatus};
pub use notifications::{NotificationError, NotificationReceiver, NotificationSink};
pub use orchestrator::{CreateOrderCommand, OrderOrchestrator};
pub use patch::{OrderPatch, OrderPatcher};
pub use query::{CreatedSince, ListOrdersQuery, ListPaymentsQuery, OrderCounters, OrderQueries, PageLimits};
pub use repository::{
    CounterKind, OrderFilter, OrderRepository, Page, PageRequest, PaymentFilter, PaymentStatusStats,
};
pub use rules::OrderRules;
pub use settlement::PaymentSettlement;
pub use status::TransitionPolicy;
