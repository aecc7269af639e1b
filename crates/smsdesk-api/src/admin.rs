use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::info;

use smsdesk_core::CoreError;
use smsdesk_core::ledger::parse_balance;
use smsdesk_types::api::{SmsResponse, UpdateBalanceRequest, UpdateStatusRequest};
use smsdesk_types::models::User;

use crate::auth::AppState;
use crate::error::ApiError;

pub async fn list_users(State(state): State<AppState>) -> impl IntoResponse {
    Json(SmsResponse::ok(state.portal.ledger.users()))
}

pub async fn update_balance(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<UpdateBalanceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let balance = parse_balance(&req.balance)?;
    let ledger = &state.portal.ledger;

    if !ledger.update_balance(&user_id, balance) {
        return Err(update_failure(&state, &user_id));
    }

    info!("Admin set balance of {} to {}", user_id, balance);
    Ok(Json(SmsResponse::ok_with_message(
        updated_user(&state, &user_id)?,
        "Balance updated",
    )))
}

pub async fn update_status(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.portal.ledger.update_status(&user_id, req.status) {
        return Err(update_failure(&state, &user_id));
    }

    info!("Admin set status of {} to {:?}", user_id, req.status);
    Ok(Json(SmsResponse::ok_with_message(
        updated_user(&state, &user_id)?,
        "Status updated",
    )))
}

fn updated_user(state: &AppState, user_id: &str) -> Result<User, ApiError> {
    state
        .portal
        .ledger
        .user(user_id)
        .ok_or_else(|| CoreError::NotFound(format!("User {}", user_id)).into())
}

/// The ledger reports failure as `false`; tell a missing user apart from a
/// storage fault for the status code.
fn update_failure(state: &AppState, user_id: &str) -> ApiError {
    match state.portal.ledger.user(user_id) {
        None => CoreError::NotFound(format!("User {}", user_id)).into(),
        Some(_) => CoreError::Persistence("could not save user".into()).into(),
    }
}
