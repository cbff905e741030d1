/// WebSocket gateway endpoint for realtime events
///
/// Connection lifecycle: the bearer credential is verified before the
/// upgrade completes, the identity is registered (last connection wins) and
/// implicitly joined to its personal group, and an initial unread-count push
/// is sent. Clients may then join or leave per-thread topic groups. On
/// disconnect the registry entry is removed immediately; there is no grace
/// period and no reconnection buffering.
use crate::{
    auth,
    context::AppContext,
    error::SkeinError,
    realtime::{ConnectionHandle, GatewayEvent},
};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use tokio::{
    sync::mpsc,
    time::{interval, Duration},
};
use uuid::Uuid;

/// Keepalive ping interval
const PING_INTERVAL_SECS: u64 = 30;

pub fn routes() -> Router<AppContext> {
    Router::new().route("/api/gateway", get(gateway_handshake))
}

/// Connection handshake parameters
#[derive(Debug, Deserialize)]
pub struct GatewayParams {
    /// Signed bearer credential
    pub token: Option<String>,
}

/// Messages a client may send over the socket
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case", rename_all_fields = "camelCase")]
enum ClientMessage {
    JoinThread { thread_id: String },
    LeaveThread { thread_id: String },
}

/// WebSocket handshake: authenticate, then upgrade
async fn gateway_handshake(
    ws: WebSocketUpgrade,
    Query(params): Query<GatewayParams>,
    State(ctx): State<AppContext>,
) -> Response {
    // Reject before entering the authenticated state
    let token = match params.token {
        Some(token) => token,
        None => {
            return SkeinError::Authentication("Missing credential".to_string()).into_response()
        }
    };

    let claims = match auth::verify_token(&token, &ctx.config.auth.jwt_secret) {
        Ok(claims) => claims,
        Err(e) => return e.into_response(),
    };

    let user = match ctx.users.get_user(&claims.sub).await {
        Ok(user) => user,
        Err(_) => {
            return SkeinError::Authentication("Unknown user".to_string()).into_response()
        }
    };

    ws.on_upgrade(move |socket| handle_connection(socket, user.id, ctx))
}

/// Drive one authenticated connection until it disconnects
async fn handle_connection(socket: WebSocket, user_id: String, ctx: AppContext) {
    let (mut sender, mut receiver) = socket.split();

    let conn_id = Uuid::new_v4().to_string();
    let (tx, mut rx) = mpsc::unbounded_channel::<GatewayEvent>();

    // Registration joins the personal group; a replaced connection's channel
    // closes here, which ends its outbound loop.
    let replaced = ctx
        .gateway
        .registry()
        .register(&user_id, ConnectionHandle::new(conn_id.clone(), tx))
        .await;
    drop(replaced);

    tracing::debug!(%user_id, %conn_id, "gateway connection established");

    // Initial unread-count push
    ctx.notifications.push_unread_count(&user_id).await;

    let mut ping_interval = interval(Duration::from_secs(PING_INTERVAL_SECS));
    ping_interval.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            // Outbound events from the registry
            maybe_event = rx.recv() => {
                match maybe_event {
                    Some(event) => {
                        let payload = match serde_json::to_string(&event) {
                            Ok(payload) => payload,
                            Err(e) => {
                                tracing::error!("Failed to encode gateway event: {}", e);
                                continue;
                            }
                        };
                        if sender.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    // Channel closed: this connection was replaced
                    None => break,
                }
            }

            // Keepalive pings
            _ = ping_interval.tick() => {
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }

            // Inbound client messages
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&ctx, &user_id, &text).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::debug!(%user_id, "client closed connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(%user_id, "websocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    // Disconnect is the only cancellation signal; no pending-operation
    // cleanup, the registry entry just goes away.
    ctx.gateway.registry().unregister(&user_id, &conn_id).await;
    tracing::debug!(%user_id, %conn_id, "gateway connection closed");
}

/// Handle a topic join/leave request; malformed messages are ignored
async fn handle_client_message(ctx: &AppContext, user_id: &str, text: &str) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(_) => {
            tracing::debug!(%user_id, "ignoring malformed client message");
            return;
        }
    };

    match message {
        ClientMessage::JoinThread { thread_id } => {
            let topic = crate::realtime::Gateway::thread_topic(&thread_id);
            ctx.gateway.registry().join_topic(user_id, &topic).await;
        }
        ClientMessage::LeaveThread { thread_id } => {
            let topic = crate::realtime::Gateway::thread_topic(&thread_id);
            ctx.gateway.registry().leave_topic(user_id, &topic).await;
        }
    }
}
