use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::warn;

use smsdesk_types::api::Claims;
use smsdesk_types::models::UserStatus;

use crate::auth::AppState;

/// Extract and validate JWT from Authorization header, and require the
/// account it names to exist and be active.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;

    // Tokens outlive a ban; the ledger has the final say.
    let claims = token_data.claims;
    match state.portal.ledger.user(&claims.sub) {
        Some(user) if user.status == UserStatus::Active => {}
        Some(_) => {
            warn!("Banned user {} refused", claims.username);
            return Err(StatusCode::FORBIDDEN);
        }
        None => return Err(StatusCode::UNAUTHORIZED),
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Admit only users listed as administrators. Runs after [`require_auth`].
pub async fn require_admin(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let claims = req
        .extensions()
        .get::<Claims>()
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !state.is_admin(&claims.username) {
        warn!("User {} denied admin access", claims.username);
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(next.run(req).await)
}
