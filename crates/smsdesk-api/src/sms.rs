use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use smsdesk_core::{AuthUser, CoreError};
use smsdesk_types::api::{Claims, SendRequest, SmsResponse, ThreadQuery};

use crate::auth::AppState;
use crate::error::ApiError;

pub async fn send(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = AuthUser::from(&claims);
    let sent = state.portal.sms.try_send(&user, req).await?;

    Ok((
        StatusCode::CREATED,
        Json(SmsResponse::ok_with_message(sent, "Message sent")),
    ))
}

pub async fn history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> impl IntoResponse {
    Json(state.portal.sms.history(&AuthUser::from(&claims)))
}

pub async fn threads(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ThreadQuery>,
) -> impl IntoResponse {
    let user = AuthUser::from(&claims);
    Json(state.portal.sms.threads(&user, query.search.as_deref()))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    Json(state.portal.sms.delete_message(&AuthUser::from(&claims), &id))
}

pub async fn delete_thread(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(recipient): Path<String>,
) -> impl IntoResponse {
    Json(state.portal.sms.delete_thread(&AuthUser::from(&claims), &recipient))
}

/// The caller's own ledger entry.
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .portal
        .ledger
        .user(&claims.sub)
        .ok_or_else(|| CoreError::NotFound(format!("Account {}", claims.sub)))?;

    Ok(Json(SmsResponse::ok(user)))
}
