use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

use smsdesk_types::api::Claims;
use smsdesk_types::events::{EventKind, GatewayCommand, GatewayFrame, PortalEvent};

use crate::dispatcher::{EventBus, Subscription};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Time a client has to send `Identify` after connecting.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle one WebSocket client: identify, then relay bus events for the
/// identified user until either side goes away.
pub async fn handle_connection(socket: WebSocket, bus: EventBus, jwt_secret: String) {
    let (mut sender, mut receiver) = socket.split();

    let claims = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(claims) => claims,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    info!("{} ({}) connected to gateway", claims.username, claims.sub);

    let ready = GatewayFrame::Ready {
        user_id: claims.sub.clone(),
        username: claims.username.clone(),
    };
    if send_frame(&mut sender, &ready).await.is_err() {
        return;
    }

    // Bus handlers run synchronously inside publish, so they only hand the
    // event over to this connection's channel.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<PortalEvent>();
    let subscriptions = [EventKind::HistoryChanged, EventKind::BalanceChanged]
        .map(|kind| subscribe_for_user(&bus, kind, claims.sub.clone(), event_tx.clone()));
    drop(event_tx);

    run_connection_loop(sender, receiver, event_rx).await;

    for subscription in subscriptions {
        subscription.unsubscribe();
    }
    info!("{} ({}) disconnected from gateway", claims.username, claims.sub);
}

fn subscribe_for_user(
    bus: &EventBus,
    kind: EventKind,
    user_id: String,
    tx: mpsc::UnboundedSender<PortalEvent>,
) -> Subscription {
    bus.subscribe(kind, move |event| {
        if event.user_id() != user_id {
            return Ok(());
        }
        tx.send(event.clone())
            .map_err(|_| anyhow::anyhow!("gateway connection for {} already closed", user_id))
    })
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut event_rx: mpsc::UnboundedReceiver<PortalEvent>,
) {
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    // Forward bus events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    let Some(event) = event else { break };
                    if send_frame(&mut sender, &GatewayFrame::Event(event)).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // The client has nothing to say after Identify; only liveness matters.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Pong(_) => pong_flag_recv.store(true, Ordering::Release),
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    frame: &GatewayFrame,
) -> anyhow::Result<()> {
    let text = serde_json::to_string(frame)?;
    sender.send(Message::Text(text.into())).await?;
    Ok(())
}

async fn wait_for_identify(
    receiver: &mut SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<Claims> {
    use jsonwebtoken::{DecodingKey, Validation, decode};

    let identify = async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    let token_data = decode::<Claims>(
                        &token,
                        &DecodingKey::from_secret(jwt_secret.as_bytes()),
                        &Validation::default(),
                    )
                    .ok()?;

                    return Some(token_data.claims);
                }
            }
        }
        None
    };

    tokio::time::timeout(IDENTIFY_TIMEOUT, identify).await.ok().flatten()
}
