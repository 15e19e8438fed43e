use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use shop_core::Caller;
use shop_order::{CreatedSince, ListPaymentsQuery, OrderView, Page, PaymentStatusStats, PaymentView};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub user_id: Option<Uuid>,
}

/// POST /v1/payments/{id}/paid
/// Approve the payment and move its order to PAID
pub async fn set_as_paid(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<OrderView>, AppError> {
    let view = state.settlement.set_as_paid(&caller, payment_id).await?;
    state.metrics.payments_settled.inc();
    Ok(Json(view))
}

/// GET /v1/payments
pub async fn list_payments(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<ListPaymentsQuery>,
) -> Result<Json<Page<PaymentView>>, AppError> {
    Ok(Json(state.queries.list_payments(&caller, query).await?))
}

/// GET /v1/payments/stats
pub async fn payment_user_stats(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<Vec<PaymentStatusStats>>, AppError> {
    Ok(Json(state.queries.payment_user_stats(&caller, query.user_id).await?))
}

/// GET /v1/stats/orders
/// Orders created since local midnight (ADMIN/SERVICE)
pub async fn order_stats(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<CreatedSince>, AppError> {
    Ok(Json(state.queries.collect_order_stats(&caller).await?))
}

/// GET /v1/stats/payments
pub async fn payment_stats(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<CreatedSince>, AppError> {
    Ok(Json(state.queries.collect_payment_stats(&caller).await?))
}
