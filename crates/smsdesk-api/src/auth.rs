use std::collections::HashSet;
use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{error, info};

use smsdesk_core::{AuthUser, CoreError, Portal};
use smsdesk_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest};

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub portal: Portal,
    pub jwt_secret: String,
    /// Lowercased usernames allowed on the admin routes.
    pub admin_users: HashSet<String>,
}

impl AppStateInner {
    pub fn new(portal: Portal, jwt_secret: String, admin_users: impl IntoIterator<Item = String>) -> Self {
        Self {
            portal,
            jwt_secret,
            admin_users: admin_users
                .into_iter()
                .map(|name| name.trim().to_lowercase())
                .filter(|name| !name.is_empty())
                .collect(),
        }
    }

    pub fn is_admin(&self, username: &str) -> bool {
        self.admin_users.contains(&username.to_lowercase())
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Password hashing is CPU-bound; keep it off the async workers
    let ledger = state.portal.ledger.clone();
    let username = req.username.trim().to_string();
    let user = tokio::task::spawn_blocking(move || ledger.register(&req.username, &req.email, &req.password))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::internal()
        })??;
    let user = AuthUser {
        id: user.id,
        username,
        email: user.email,
    };

    info!("New account {} ({})", user.username, user.id);
    Ok((StatusCode::CREATED, Json(login_response(&state, user)?)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ledger = state.portal.ledger.clone();
    let user = tokio::task::spawn_blocking(move || ledger.authenticate(&req.login, &req.password))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::internal()
        })?
        .map_err(|e| match e {
            CoreError::Validation(message) => ApiError::new(StatusCode::UNAUTHORIZED, message),
            other => other.into(),
        })?;

    Ok(Json(login_response(&state, user)?))
}

fn login_response(state: &AppStateInner, user: AuthUser) -> Result<LoginResponse, ApiError> {
    let token = create_token(&state.jwt_secret, &user).map_err(|e| {
        error!("Failed to sign token for {}: {}", user.id, e);
        ApiError::internal()
    })?;

    Ok(LoginResponse {
        user_id: user.id,
        username: user.username,
        email: user.email,
        token,
    })
}

pub fn create_token(secret: &str, user: &AuthUser) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user.id.clone(),
        username: user.username.clone(),
        email: user.email.clone(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
