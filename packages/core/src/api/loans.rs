//! Loan queries for operators.
//!
//! Routes:
//! - `GET /loans`                     active loans
//! - `GET /loans/overdue?as_of=`      overdue loans with fines as of a date
//! - `GET /members/:id/fines?as_of=`  accruing fines for one member
//!
//! `as_of` is `YYYY-MM-DD` and defaults to today. Fines here are previews:
//! nothing is written back to the store.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::loans::{preview_fine, Loan, MediaKind};
use super::ApiState;

pub(super) type ApiError = (StatusCode, Json<serde_json::Value>);

// ---- Request / response shapes ----

#[derive(Debug, Deserialize)]
pub struct AsOfQuery {
    pub as_of: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoanView {
    pub id: u64,
    pub media_id: String,
    pub member_id: String,
    pub media_kind: Option<MediaKind>,
    pub borrow_date: NaiveDate,
    pub due_date: NaiveDate,
    pub days_overdue: i64,
    pub fine_amount: f64,
    pub overdue_notification_sent: bool,
    pub testing_mode: bool,
}

impl LoanView {
    pub(super) fn new(loan: &Loan, as_of: NaiveDate) -> Self {
        Self {
            id: loan.id().0,
            media_id: loan.media_id().to_string(),
            member_id: loan.member_id().to_string(),
            media_kind: loan.media_kind(),
            borrow_date: loan.borrow_date(),
            due_date: loan.due_date(),
            days_overdue: loan.days_overdue(as_of),
            // returned loans carry the fine settled at return
            fine_amount: if loan.is_returned() {
                loan.fine_amount()
            } else {
                preview_fine(loan, as_of)
            },
            overdue_notification_sent: loan.overdue_notification_sent(),
            testing_mode: loan.is_testing_mode(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MemberFinesResponse {
    pub member_id: String,
    pub as_of: NaiveDate,
    pub total_fine: f64,
    pub overdue: Vec<LoanView>,
}

// ---- Helpers ----

pub(super) fn resolve_as_of(query: &AsOfQuery) -> Result<NaiveDate, ApiError> {
    match query.as_of.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(Local::now().date_naive()),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": format!("Invalid as_of '{}'. Expected YYYY-MM-DD", raw)
                })),
            )
        }),
    }
}

// ---- Handlers ----

/// `GET /loans`: every active loan, fines previewed as of today.
pub async fn active_loans(State(state): State<ApiState>) -> Json<Vec<LoanView>> {
    let today = Local::now().date_naive();
    let loans = state.service.active_loans().await;
    Json(loans.iter().map(|l| LoanView::new(l, today)).collect())
}

/// `GET /loans/overdue`: active loans past due as of `as_of`.
pub async fn overdue_loans(
    State(state): State<ApiState>,
    Query(query): Query<AsOfQuery>,
) -> Result<Json<Vec<LoanView>>, ApiError> {
    let as_of = resolve_as_of(&query)?;
    let loans = state.service.overdue_loans(as_of).await;
    Ok(Json(loans.iter().map(|l| LoanView::new(l, as_of)).collect()))
}

/// `GET /members/:id/fines`: fines accruing on the member's active loans.
pub async fn member_fines(
    State(state): State<ApiState>,
    Path(member_id): Path<String>,
    Query(query): Query<AsOfQuery>,
) -> Result<Json<MemberFinesResponse>, ApiError> {
    let as_of = resolve_as_of(&query)?;
    let overdue: Vec<LoanView> = state
        .service
        .overdue_loans_for_member(&member_id, as_of)
        .await
        .iter()
        .map(|l| LoanView::new(l, as_of))
        .collect();
    let total_fine = overdue.iter().map(|l| l.fine_amount).sum();

    Ok(Json(MemberFinesResponse {
        member_id,
        as_of,
        total_fine,
        overdue,
    }))
}
