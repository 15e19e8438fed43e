use shop_core::Collaborators;
use shop_order::{
    NotificationSink, OrderAggregator, OrderOrchestrator, OrderPatcher, OrderQueries, OrderRepository,
    OrderRules, PageLimits, PaymentSettlement,
};
use shop_shared::Notification;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<OrderOrchestrator>,
    pub settlement: Arc<PaymentSettlement>,
    pub patcher: Arc<OrderPatcher>,
    pub queries: Arc<OrderQueries>,
    pub live: broadcast::Sender<Notification>,
    pub metrics: Arc<Metrics>,
    pub auth: AuthConfig,
}

/// Everything the order services are built from.
pub struct Wiring {
    pub collaborators: Collaborators,
    pub repo: Arc<dyn OrderRepository>,
    pub sink: NotificationSink,
    pub live: broadcast::Sender<Notification>,
    pub rules: OrderRules,
    pub limits: PageLimits,
    pub auth: AuthConfig,
}

impl AppState {
    pub fn new(wiring: Wiring) -> Result<Self, prometheus::Error> {
        let aggregator = OrderAggregator::new(wiring.collaborators.clone());

        Ok(Self {
            orchestrator: Arc::new(OrderOrchestrator::new(
                wiring.collaborators,
                wiring.repo.clone(),
                wiring.sink.clone(),
                wiring.rules,
            )),
            settlement: Arc::new(PaymentSettlement::new(
                wiring.repo.clone(),
                aggregator.clone(),
                wiring.sink.clone(),
            )),
            patcher: Arc::new(OrderPatcher::new(
                wiring.repo.clone(),
                aggregator.clone(),
                wiring.sink,
                wiring.rules.transition_policy,
            )),
            queries: Arc::new(OrderQueries::new(wiring.repo, aggregator, wiring.limits)),
            live: wiring.live,
            metrics: Arc::new(Metrics::new()?),
            auth: wiring.auth,
        })
    }
}
