use axum::{extract::State, http::header, response::IntoResponse};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::AppError;
use crate::state::AppState;

pub struct Metrics {
    registry: Registry,
    pub orders_created: IntCounter,
    pub orders_creation_failed: IntCounterVec,
    pub payments_settled: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let orders_created = IntCounter::new("orders_created_total", "Orders created")?;
        let orders_creation_failed = IntCounterVec::new(
            Opts::new("orders_creation_failed_total", "Order creation attempts that failed"),
            &["kind"],
        )?;
        let payments_settled = IntCounter::new("payments_settled_total", "Payments approved")?;

        registry.register(Box::new(orders_created.clone()))?;
        registry.register(Box::new(orders_creation_failed.clone()))?;
        registry.register(Box::new(payments_settled.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            orders_creation_failed,
            payments_settled,
        })
    }

    pub fn render(&self) -> Result<String, AppError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| AppError::Anyhow(e.into()))?;
        String::from_utf8(buffer).map_err(|e| AppError::Anyhow(e.into()))
    }
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = state.metrics.render()?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}
