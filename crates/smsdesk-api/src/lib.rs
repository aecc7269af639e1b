pub mod admin;
pub mod auth;
pub mod error;
pub mod middleware;
pub mod sms;

use axum::{
    Router, middleware as mw,
    routing::{delete, get, post, put},
};

pub use auth::{AppState, AppStateInner};
pub use error::ApiError;

/// Every HTTP route of the portal except the WebSocket gateway.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/me", get(sms::me))
        .route("/sms/send", post(sms::send))
        .route("/sms/history", get(sms::history))
        .route("/sms/threads", get(sms::threads))
        .route("/sms/messages/{id}", delete(sms::delete_message))
        .route("/sms/threads/{recipient}", delete(sms::delete_thread))
        .layer(mw::from_fn_with_state(state.clone(), middleware::require_auth));

    let admin_routes = Router::new()
        .route("/admin/users", get(admin::list_users))
        .route("/admin/users/{id}/balance", put(admin::update_balance))
        .route("/admin/users/{id}/status", put(admin::update_status))
        .layer(mw::from_fn_with_state(state.clone(), middleware::require_admin))
        .layer(mw::from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .with_state(state)
}
