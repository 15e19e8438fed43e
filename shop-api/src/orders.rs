use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use shop_core::Caller;
use shop_order::{CreateOrderCommand, ListOrdersQuery, OrderCounters, OrderPatch, OrderView, Page};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/orders
/// Turn basket lines into an order
pub async fn create_order(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<CreateOrderCommand>,
) -> Result<(StatusCode, Json<OrderView>), AppError> {
    match state.orchestrator.create_order(&caller, req).await {
        Ok(view) => {
            state.metrics.orders_created.inc();
            Ok((StatusCode::CREATED, Json(view)))
        }
        Err(e) => {
            let err = AppError::from(e);
            state
                .metrics
                .orders_creation_failed
                .with_label_values(&[err.kind()])
                .inc();
            Err(err)
        }
    }
}

/// GET /v1/orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderView>, AppError> {
    Ok(Json(state.queries.get_order(&caller, order_id).await?))
}

/// GET /v1/orders
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Page<OrderView>>, AppError> {
    Ok(Json(state.queries.list_orders(&caller, query).await?))
}

/// GET /v1/orders/counters
pub async fn order_counters(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<OrderCounters>, AppError> {
    Ok(Json(state.queries.counters(&caller, query).await?))
}

/// PATCH /v1/orders/{id}
/// Privileged status assignment
pub async fn patch_order(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(order_id): Path<Uuid>,
    Json(patch): Json<OrderPatch>,
) -> Result<Json<OrderView>, AppError> {
    Ok(Json(state.patcher.patch_order(&caller, order_id, patch).await?))
}
