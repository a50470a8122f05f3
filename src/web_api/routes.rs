//! API Routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::json;

use crate::allocation::CreateSetRequest;
use crate::models::{
    AddAccountRequest, ApiResponse, CapacityResponse, ChangeBidRequest, CloneAccountRequest,
    ModifyKeywordsRequest, ReportQuery,
};
use crate::state::AppState;

const DEFAULT_REPORT_DAYS: u32 = 7;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(super::health_check))
        // Schema
        .route("/api/schema/install", post(install_schema))
        // Accounts
        .route("/api/accounts", get(list_accounts))
        .route("/api/accounts", post(add_account))
        .route("/api/accounts/:email", delete(remove_account))
        .route("/api/accounts/:email/capacity", get(account_capacity))
        .route("/api/accounts/:email/clone", post(clone_account))
        // Keyword sets
        .route("/api/sets", post(create_set))
        .route("/api/sets/:label", delete(drop_set))
        .route("/api/sets/:label/capacity", get(set_capacity))
        .route("/api/sets/:label/keywords", get(get_keywords))
        .route("/api/sets/:label/keywords", put(modify_keywords))
        .route("/api/sets/:label/bid", put(change_default_bid))
        .route("/api/sets/:label/report", get(report_set_performance))
        .with_state(state)
}

// ========================================
// Schema
// ========================================

async fn install_schema(State(state): State<AppState>) -> Result<impl IntoResponse, crate::Error> {
    state.engine.lock().await.install_schema().await?;
    Ok(Json(ApiResponse::success(json!({"installed": true}))))
}

// ========================================
// Accounts
// ========================================

async fn list_accounts(State(state): State<AppState>) -> Result<impl IntoResponse, crate::Error> {
    let accounts = state.engine.lock().await.list_accounts().await?;
    Ok(Json(ApiResponse::success(accounts)))
}

async fn add_account(
    State(state): State<AppState>,
    Json(req): Json<AddAccountRequest>,
) -> Result<impl IntoResponse, crate::Error> {
    let account = state
        .engine
        .lock()
        .await
        .add_account(&req.email, &req.password)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(account))))
}

async fn remove_account(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<impl IntoResponse, crate::Error> {
    state.engine.lock().await.remove_account(&email).await?;
    Ok(Json(ApiResponse::success(json!({"deleted": email}))))
}

async fn account_capacity(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<impl IntoResponse, crate::Error> {
    let capacity = state.engine.lock().await.account_capacity(&email).await?;
    Ok(Json(ApiResponse::success(CapacityResponse { capacity })))
}

async fn clone_account(
    State(state): State<AppState>,
    Path(email): Path<String>,
    Json(req): Json<CloneAccountRequest>,
) -> Result<impl IntoResponse, crate::Error> {
    let summary = state
        .engine
        .lock()
        .await
        .clone_account(&email, &req.destination)
        .await?;
    Ok(Json(ApiResponse::success(summary)))
}

// ========================================
// Keyword sets
// ========================================

async fn create_set(
    State(state): State<AppState>,
    Json(req): Json<CreateSetRequest>,
) -> Result<impl IntoResponse, crate::Error> {
    let label = req.label.clone();
    let account = state.engine.lock().await.create_set(req).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(json!({
            "label": label,
            "account": account.email,
        }))),
    ))
}

async fn drop_set(
    State(state): State<AppState>,
    Path(label): Path<String>,
) -> Result<impl IntoResponse, crate::Error> {
    state.engine.lock().await.drop_set(&label).await?;
    Ok(Json(ApiResponse::success(json!({"deleted": label}))))
}

async fn set_capacity(
    State(state): State<AppState>,
    Path(label): Path<String>,
) -> Result<impl IntoResponse, crate::Error> {
    let capacity = state.engine.lock().await.set_capacity(&label).await?;
    Ok(Json(ApiResponse::success(CapacityResponse { capacity })))
}

async fn get_keywords(
    State(state): State<AppState>,
    Path(label): Path<String>,
) -> Result<impl IntoResponse, crate::Error> {
    let keywords = state.engine.lock().await.get_keywords(&label).await?;
    Ok(Json(ApiResponse::success(keywords)))
}

async fn modify_keywords(
    State(state): State<AppState>,
    Path(label): Path<String>,
    Json(req): Json<ModifyKeywordsRequest>,
) -> Result<impl IntoResponse, crate::Error> {
    let count = req.keywords.len();
    state
        .engine
        .lock()
        .await
        .modify_keywords(&label, req.keywords)
        .await?;
    Ok(Json(ApiResponse::success(json!({
        "label": label,
        "keywords": count,
    }))))
}

async fn change_default_bid(
    State(state): State<AppState>,
    Path(label): Path<String>,
    Json(req): Json<ChangeBidRequest>,
) -> Result<impl IntoResponse, crate::Error> {
    state
        .engine
        .lock()
        .await
        .change_default_bid(&label, req.bid)
        .await?;
    Ok(Json(ApiResponse::success(json!({
        "label": label,
        "bid": req.bid,
    }))))
}

async fn report_set_performance(
    State(state): State<AppState>,
    Path(label): Path<String>,
    Query(query): Query<ReportQuery>,
) -> Result<impl IntoResponse, crate::Error> {
    let days = query.days.unwrap_or(DEFAULT_REPORT_DAYS);
    let report = state
        .engine
        .lock()
        .await
        .report_set_performance(&label, days)
        .await?;
    Ok(Json(ApiResponse::success(report)))
}
