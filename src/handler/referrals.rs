// handler/referrals.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::referraldtos::*,
    error::HttpError,
    middleware::{auth, JWTAuthMiddeware},
    utils::currency::format_cents_as_brl,
    AppState,
};

const DEFAULT_HISTORY_LIMIT: i64 = 50;

pub fn referrals_handler() -> Router {
    let user_routes = Router::new()
        .route("/", get(list_my_referrals))
        .route("/code", get(get_my_referral_code))
        .route("/stats", get(get_my_stats))
        .route("/points/history", get(get_points_history))
        .route("/cashback", get(list_my_cashback_requests).post(request_cashback))
        .route("/apply", post(apply_referral_code))
        .route("/admin/cashback", get(admin_list_cashback_requests))
        .route("/admin/cashback/:request_id/process", post(admin_process_cashback_request))
        .route("/admin/reconcile", get(admin_reconcile_ledger))
        .layer(middleware::from_fn(auth));

    let public_routes = Router::new().route("/validate", get(validate_referral_code));

    Router::new().merge(user_routes).merge(public_routes)
}

pub async fn get_my_referral_code(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let code = app_state
        .referral_service
        .get_or_create_referral_code(auth.user.id)
        .await?;

    Ok(Json(ApiResponse::success("Referral code retrieved successfully", code)))
}

pub async fn get_my_stats(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let stats = app_state.referral_service.get_stats(auth.user.id).await?;

    Ok(Json(ApiResponse::success("Referral stats retrieved successfully", stats)))
}

pub async fn list_my_referrals(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let referrals = app_state.referral_service.list_referrals(auth.user.id).await?;

    Ok(Json(ApiResponse::success("Referrals retrieved successfully", referrals)))
}

pub async fn get_points_history(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Query(params): Query<PointsHistoryQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    params
        .validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let history = app_state
        .referral_service
        .points_history(
            auth.user.id,
            params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
            params.offset.unwrap_or(0),
        )
        .await?;

    Ok(Json(ApiResponse::success("Points history retrieved successfully", history)))
}

pub async fn request_cashback(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<CashbackRequestDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let request = app_state
        .cashback_service
        .request_cashback(auth.user.id, body.into())
        .await?;

    let created = CashbackRequestCreatedDto {
        request_id: request.id,
        points_amount: request.points_amount,
        cash_amount: request.cash_amount,
        cash_amount_display: format_cents_as_brl(request.cash_amount),
        status: request.status,
    };

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Cashback request submitted successfully", created)),
    ))
}

pub async fn list_my_cashback_requests(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let requests = app_state
        .cashback_service
        .list_my_cashback_requests(auth.user.id)
        .await?;

    Ok(Json(ApiResponse::success("Cashback requests retrieved successfully", requests)))
}

pub async fn apply_referral_code(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<ApplyReferralCodeDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let referral = app_state
        .referral_service
        .attach_referral_code(auth.user.id, &body.referral_code)
        .await?;

    Ok(Json(ApiResponse::success("Referral code applied successfully", referral)))
}

pub async fn validate_referral_code(
    Extension(app_state): Extension<Arc<AppState>>,
    Query(params): Query<ValidateReferralCodeQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    params
        .validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let result = app_state
        .referral_service
        .validate_referral_code(&params.code)
        .await?;

    Ok(Json(ApiResponse::success("Referral code checked", result)))
}

pub async fn admin_list_cashback_requests(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Query(params): Query<CashbackListQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    let requests = app_state
        .cashback_service
        .list_cashback_requests(&auth.user, params.status)
        .await?;

    Ok(Json(ApiResponse::success("Cashback requests retrieved successfully", requests)))
}

pub async fn admin_process_cashback_request(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(request_id): Path<Uuid>,
    Json(body): Json<ProcessCashbackDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let request = app_state
        .cashback_service
        .process_cashback_request(&auth.user, request_id, body.status, body.admin_notes)
        .await?;

    Ok(Json(ApiResponse::success("Cashback request processed successfully", request)))
}

pub async fn admin_reconcile_ledger(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let report = app_state.referral_service.reconcile_ledger(&auth.user).await?;

    Ok(Json(ApiResponse::success("Ledger reconciliation completed", report)))
}
