mod config;

use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use smsdesk_api::{AppState, AppStateInner};
use smsdesk_core::{Portal, StoredBlacklist};
use smsdesk_db::RecordStore;
use smsdesk_gateway::EventBus;
use smsdesk_gateway::connection;

use crate::config::Config;

#[derive(Clone)]
struct GatewayState {
    bus: EventBus,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "smsdesk=debug,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {:#}", e);
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    // Init database
    let store = Arc::new(RecordStore::open(&config.db_path)?);

    // Shared state
    let bus = EventBus::new();
    let blacklist = Arc::new(StoredBlacklist::new(store.clone()));
    let portal = Portal::new(store, bus.clone(), blacklist, config.send_delay);

    if config.seed_demo_user && portal.ledger.seed_demo_user() {
        info!("Seeded demo account user1");
    }

    let app_state: AppState = Arc::new(AppStateInner::new(
        portal,
        config.jwt_secret.clone(),
        config.admin_users.clone(),
    ));

    let gateway_state = GatewayState {
        bus,
        jwt_secret: config.jwt_secret.clone(),
    };

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(gateway_state);

    let app = Router::new()
        .merge(smsdesk_api::router(app_state))
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("SMSDesk server listening on {}", config.addr);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(
    State(state): State<GatewayState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.bus, state.jwt_secret)
    })
}
