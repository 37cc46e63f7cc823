//! Desk operations: registering members and items, borrowing, returning
//! and sending reminders.
//!
//! Routes:
//! - `POST /members`                    register or rename a member
//! - `POST /media`                      add or replace a catalog item
//! - `POST /loans`                      standard or custom-days borrow
//! - `POST /loans/testing`              testing-mode borrow
//! - `POST /loans/:id/return?as_of=`    return a loan, charging any fine
//! - `POST /reminders?as_of=`           remind every member with overdue loans
//! - `POST /members/:id/reminder?as_of=`
//!
//! Borrow requests take an optional `borrow_date` (`YYYY-MM-DD`) that
//! defaults to today.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::loans::{resolve_as_of, ApiError, AsOfQuery, LoanView};
use super::ApiState;
use crate::directory::{MediaCatalog, MemberDirectory};
use crate::loans::{LoanError, LoanId, Media, MediaKind, Member, TestingDuration};

// ---- Request / response shapes ----

#[derive(Debug, Deserialize)]
pub struct MemberRequest {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct MemberView {
    pub id: String,
    pub name: String,
    pub fine_balance: f64,
}

impl From<&Member> for MemberView {
    fn from(member: &Member) -> Self {
        Self {
            id: member.id.clone(),
            name: member.name.clone(),
            fine_balance: member.fine_balance(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MediaRequest {
    pub id: String,
    pub title: String,
    pub kind: MediaKind,
}

#[derive(Debug, Deserialize)]
pub struct BorrowRequest {
    pub member_id: String,
    pub media_id: String,
    pub borrow_date: Option<NaiveDate>,
    /// `0` or absent means the media's standard period.
    #[serde(default)]
    pub days: u32,
}

#[derive(Debug, Deserialize)]
pub struct TestingBorrowRequest {
    pub member_id: String,
    pub media_id: String,
    pub borrow_date: Option<NaiveDate>,
    #[serde(default)]
    pub days: i64,
    #[serde(default)]
    pub hours: i64,
    #[serde(default)]
    pub minutes: i64,
    #[serde(default)]
    pub seconds: i64,
}

// ---- Helpers ----

fn error_body(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

fn loan_error(err: LoanError) -> ApiError {
    let status = match &err {
        LoanError::InvalidArgument { .. } | LoanError::InvalidDuration { .. } => StatusCode::BAD_REQUEST,
        LoanError::MemberNotFound { .. } | LoanError::MediaNotFound { .. } => StatusCode::NOT_FOUND,
        LoanError::AlreadyBorrowed { .. } | LoanError::NotEligible { .. } => StatusCode::CONFLICT,
    };
    error_body(status, err.to_string())
}

fn require_field(value: &str, what: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(error_body(StatusCode::BAD_REQUEST, format!("{} must not be blank", what)));
    }
    Ok(())
}

// ---- Handlers ----

/// `POST /members`: 201 for a new member, 200 when renaming. A rename keeps
/// the member's fine balance.
pub async fn upsert_member(
    State(state): State<ApiState>,
    Json(req): Json<MemberRequest>,
) -> Result<(StatusCode, Json<MemberView>), ApiError> {
    require_field(&req.id, "member id")?;

    let (status, member) = match state.members.find_member(&req.id).await {
        Some(mut existing) => {
            existing.name = req.name;
            (StatusCode::OK, existing)
        }
        None => (StatusCode::CREATED, Member::new(req.id, req.name)),
    };
    state.members.upsert(member.clone()).await;
    tracing::info!("Member {} registered", member.id);

    Ok((status, Json(MemberView::from(&member))))
}

/// `POST /media`: 409 while the item is out on loan.
pub async fn upsert_media(
    State(state): State<ApiState>,
    Json(req): Json<MediaRequest>,
) -> Result<(StatusCode, Json<Media>), ApiError> {
    require_field(&req.id, "media id")?;

    if state.service.store().find_active_by_media(&req.id).await.is_some() {
        return Err(error_body(
            StatusCode::CONFLICT,
            format!("media {} is on loan and cannot be replaced", req.id),
        ));
    }

    let status = match state.catalog.find_media(&req.id).await {
        Some(_) => StatusCode::OK,
        None => StatusCode::CREATED,
    };
    let media = Media::new(req.id, req.title, req.kind);
    state.catalog.upsert(media.clone()).await;
    tracing::info!("Media {} ({}) catalogued", media.id, media.kind);

    Ok((status, Json(media)))
}

/// `POST /loans`
pub async fn borrow(
    State(state): State<ApiState>,
    Json(req): Json<BorrowRequest>,
) -> Result<(StatusCode, Json<LoanView>), ApiError> {
    let borrow_date = req.borrow_date.unwrap_or_else(|| Local::now().date_naive());
    let loan = state
        .service
        .borrow_for_days(&req.member_id, &req.media_id, borrow_date, req.days)
        .await
        .map_err(loan_error)?;

    Ok((StatusCode::CREATED, Json(LoanView::new(&loan, borrow_date))))
}

/// `POST /loans/testing`: the wall-clock window starts now.
pub async fn borrow_for_testing(
    State(state): State<ApiState>,
    Json(req): Json<TestingBorrowRequest>,
) -> Result<(StatusCode, Json<LoanView>), ApiError> {
    let duration = TestingDuration::from_components(req.days, req.hours, req.minutes, req.seconds)
        .map_err(loan_error)?;
    let borrow_date = req.borrow_date.unwrap_or_else(|| Local::now().date_naive());
    let loan = state
        .service
        .borrow_for_testing(&req.member_id, &req.media_id, borrow_date, duration, Utc::now())
        .await
        .map_err(loan_error)?;

    Ok((StatusCode::CREATED, Json(LoanView::new(&loan, borrow_date))))
}

/// `POST /loans/:id/return`: 404 when the loan is unknown or already
/// returned.
pub async fn return_loan(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
    Query(query): Query<AsOfQuery>,
) -> Result<Json<LoanView>, ApiError> {
    let return_date = resolve_as_of(&query)?;
    match state.service.return_loan(LoanId(id), return_date).await {
        Some(loan) => Ok(Json(LoanView::new(&loan, return_date))),
        None => Err(error_body(StatusCode::NOT_FOUND, format!("no active loan {}", LoanId(id)))),
    }
}

/// `POST /reminders`
pub async fn send_reminders(
    State(state): State<ApiState>,
    Query(query): Query<AsOfQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let as_of = resolve_as_of(&query)?;
    let sent = state.reminders.send_overdue_reminders(as_of).await;
    Ok(Json(json!({ "as_of": as_of, "sent": sent })))
}

/// `POST /members/:id/reminder`
pub async fn send_member_reminder(
    State(state): State<ApiState>,
    Path(member_id): Path<String>,
    Query(query): Query<AsOfQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let as_of = resolve_as_of(&query)?;
    let sent = state
        .reminders
        .send_reminder_to(&member_id, as_of)
        .await
        .map_err(loan_error)?;
    Ok(Json(json!({ "member_id": member_id, "as_of": as_of, "sent": sent })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loan_errors_map_to_client_statuses() {
        let cases = [
            (LoanError::invalid_argument("x"), StatusCode::BAD_REQUEST),
            (LoanError::invalid_duration("x"), StatusCode::BAD_REQUEST),
            (LoanError::member_not_found("m"), StatusCode::NOT_FOUND),
            (LoanError::media_not_found("b"), StatusCode::NOT_FOUND),
            (LoanError::already_borrowed("b"), StatusCode::CONFLICT),
            (LoanError::not_eligible("fines"), StatusCode::CONFLICT),
        ];
        for (err, expected) in cases {
            let message = err.to_string();
            let (status, body) = loan_error(err);
            assert_eq!(status, expected);
            assert_eq!(body.0["error"], message);
        }
    }

    #[test]
    fn blank_ids_are_rejected() {
        let (status, _) = require_field("  ", "member id").unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(require_field("ada@example.com", "member id").is_ok());
    }
}
