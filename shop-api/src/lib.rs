use axum::{
    http::Method,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod error;
pub mod metrics;
pub mod middleware;
pub mod notifications;
pub mod orders;
pub mod payments;
pub mod state;

pub use state::{AppState, AuthConfig, Wiring};

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let v1 = Router::new()
        .route("/orders", post(orders::create_order).get(orders::list_orders))
        .route("/orders/counters", get(orders::order_counters))
        .route("/orders/{id}", get(orders::get_order).patch(orders::patch_order))
        .route("/payments", get(payments::list_payments))
        .route("/payments/stats", get(payments::payment_user_stats))
        .route("/payments/{id}/paid", post(payments::set_as_paid))
        .route("/stats/orders", get(payments::order_stats))
        .route("/stats/payments", get(payments::payment_stats))
        .route("/notifications/stream", get(notifications::stream))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics::metrics_handler))
        .nest("/v1", v1)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
