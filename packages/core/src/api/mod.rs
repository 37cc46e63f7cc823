//! Operator HTTP surface.

pub mod circulation;
pub mod health;
pub mod loans;

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::alerts::ReminderService;
use crate::directory::{InMemoryCatalog, InMemoryMembers};
use crate::loans::LoanService;
use crate::metrics::AppMetrics;

/// Shared state for every route.
#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<LoanService>,
    pub members: Arc<InMemoryMembers>,
    pub catalog: Arc<InMemoryCatalog>,
    pub reminders: Arc<ReminderService>,
    pub metrics: Arc<AppMetrics>,
}

/// Assemble the full router. `main.rs` and the integration tests both use this.
pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(metrics))
        .route("/loans", get(loans::active_loans).post(circulation::borrow))
        .route("/loans/overdue", get(loans::overdue_loans))
        .route("/loans/testing", post(circulation::borrow_for_testing))
        .route("/loans/:id/return", post(circulation::return_loan))
        .route("/members", post(circulation::upsert_member))
        .route("/members/:id/fines", get(loans::member_fines))
        .route("/members/:id/reminder", post(circulation::send_member_reminder))
        .route("/media", post(circulation::upsert_media))
        .route("/reminders", post(circulation::send_reminders))
        .layer(cors)
        .with_state(state)
}

/// `GET /metrics`: Prometheus text exposition.
pub async fn metrics(State(state): State<ApiState>) -> Response {
    match state.metrics.render() {
        Ok(body) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
            .body(Body::from(body))
            .expect("metrics response should be valid"),
        Err(err) => {
            tracing::error!("Failed to render metrics: {}", err);
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::from("metrics error"))
                .expect("metrics error response should be valid")
        }
    }
}
