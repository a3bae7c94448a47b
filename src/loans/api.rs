//! Loan API Endpoints
//! Mission: CRUD and scoring routes for loans. All require authentication.

use crate::{
    app::AppState,
    auth::{
        middleware::{authenticate, authorize, AllowedRoles, CurrentUser},
        models::Role,
    },
    error::ApiError,
    loans::models::{CreateLoan, LoanFilters, LoanUpdate, RiskAssessmentRequest, StatusUpdate},
    validation::{ApiJson, ApiQuery, Validate},
};
use axum::{
    extract::{Path, State},
    handler::Handler,
    http::StatusCode,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::info;

/// Loan routes, relative to the API root
pub fn routes(state: &AppState) -> Router<AppState> {
    let lenders = AllowedRoles::new([Role::Lender, Role::Admin]);
    let admins = AllowedRoles::new([Role::Admin]);

    Router::new()
        .route("/loans", post(create_loan).get(list_loans))
        .route("/loans/statistics", get(loan_statistics))
        .route(
            "/loans/:id",
            get(get_loan)
                .put(update_loan)
                .delete(delete_loan.layer(from_fn_with_state(admins, authorize))),
        )
        .route(
            "/loans/:id/status",
            patch(update_loan_status.layer(from_fn_with_state(lenders, authorize))),
        )
        .route("/loans/:id/esg-score", post(calculate_esg_score))
        .route("/loans/:id/risk-assessment", post(assess_risk))
        .route_layer(from_fn_with_state(state.auth.clone(), authenticate))
}

/// POST /loans
pub async fn create_loan(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ApiJson(req): ApiJson<CreateLoan>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;
    let loan = state.loans.create(req).await?;

    info!("Loan {} created by {}", loan.loan_number, caller.email);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Loan created successfully", "loan": loan })),
    ))
}

/// GET /loans
pub async fn list_loans(
    State(state): State<AppState>,
    ApiQuery(filters): ApiQuery<LoanFilters>,
) -> Result<Json<Value>, ApiError> {
    let loans = state.loans.list(filters).await?;
    Ok(Json(json!({ "count": loans.len(), "loans": loans })))
}

/// GET /loans/statistics
pub async fn loan_statistics(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let statistics = state.loans.statistics().await?;
    Ok(Json(json!({ "statistics": statistics })))
}

/// GET /loans/:id
pub async fn get_loan(
    State(state): State<AppState>,
    Path(loan_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let loan = state.loans.get(&loan_id).await?.ok_or(loan_not_found())?;
    Ok(Json(json!({ "loan": loan })))
}

/// PUT /loans/:id
pub async fn update_loan(
    State(state): State<AppState>,
    Path(loan_id): Path<String>,
    ApiJson(update): ApiJson<LoanUpdate>,
) -> Result<Json<Value>, ApiError> {
    if update.is_empty() {
        return Err(ApiError::BadRequest("No valid fields to update".to_string()));
    }
    update.validate()?;

    let loan = state
        .loans
        .update(&loan_id, update)
        .await?
        .ok_or(loan_not_found())?;
    Ok(Json(json!({ "message": "Loan updated successfully", "loan": loan })))
}

/// PATCH /loans/:id/status (lender, admin)
pub async fn update_loan_status(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(loan_id): Path<String>,
    ApiJson(req): ApiJson<StatusUpdate>,
) -> Result<Json<Value>, ApiError> {
    let loan = state
        .loans
        .update_status(&loan_id, req.status)
        .await?
        .ok_or(loan_not_found())?;

    info!(
        "Loan {} moved to {} by {}",
        loan.loan_number,
        loan.status.as_str(),
        caller.email
    );
    Ok(Json(json!({ "message": "Loan status updated successfully", "loan": loan })))
}

/// POST /loans/:id/esg-score
pub async fn calculate_esg_score(
    State(state): State<AppState>,
    Path(loan_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let score = state
        .loans
        .assess_esg(&loan_id)
        .await?
        .ok_or(loan_not_found())?;
    Ok(Json(json!({
        "message": "ESG score calculated successfully",
        "esg_score": score,
    })))
}

/// POST /loans/:id/risk-assessment
pub async fn assess_risk(
    State(state): State<AppState>,
    Path(loan_id): Path<String>,
    ApiJson(req): ApiJson<RiskAssessmentRequest>,
) -> Result<Json<Value>, ApiError> {
    req.validate()?;
    let rating = state
        .loans
        .assess_risk(&loan_id, req.credit_score)
        .await?
        .ok_or(loan_not_found())?;
    Ok(Json(json!({
        "message": "Risk assessment completed",
        "risk_rating": rating,
    })))
}

/// DELETE /loans/:id (admin)
pub async fn delete_loan(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(loan_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !state.loans.delete(&loan_id).await? {
        return Err(loan_not_found());
    }
    info!("Loan {} deleted by {}", loan_id, caller.email);
    Ok(Json(json!({ "message": "Loan deleted successfully" })))
}

fn loan_not_found() -> ApiError {
    ApiError::NotFound("Loan not found")
}
