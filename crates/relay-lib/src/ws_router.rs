// ============================
// parley-relay-lib/src/ws_router.rs
// ============================
//! WebSocket router and connection handling.
use crate::directory::SignalKind;
use crate::error::RelayError;
use crate::telemetry;
use crate::validation;
use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use parley_common::{ClientMessage, ServerMessage};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Create the WebSocket router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

/// Handler for WebSocket connections
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    counter!(telemetry::WS_CONNECTION).increment(1);
    gauge!(telemetry::WS_ACTIVE).increment(1.0);

    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    // Outbound channel; the directory keeps the sender for fan-out
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let Ok(conn_id) = state.directory.register(tx.clone()).await else {
        return;
    };
    debug!(%conn_id, "connection registered");

    // Forward directory messages to the socket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let Ok(json) = serde_json::to_string(&msg) else {
                continue;
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Main loop: process incoming WebSocket messages
    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => {
                    if let Err(e) = dispatch(&state, &conn_id, &tx, client_msg).await {
                        // only reachable when the directory actor is gone
                        warn!(%conn_id, error = %e, "dropping connection");
                        break;
                    }
                },
                Err(e) => {
                    let _ = tx.send(ServerMessage::MalformedMessage {
                        reason: e.to_string(),
                    });
                },
            },
            Message::Close(_) => break,
            _ => {}, // Ignore pings, pongs and binary frames
        }
    }

    // Transport loss is an implicit leave
    let _ = state.directory.disconnect(&conn_id);
    debug!(%conn_id, "connection closed");

    gauge!(telemetry::WS_ACTIVE).decrement(1.0);
    send_task.abort();
}

/// Route one parsed client message to the directory.
///
/// The sender identity passed along with relay operations is always the
/// session's `conn_id`, never anything the client supplied.
async fn dispatch(
    state: &AppState,
    conn_id: &str,
    tx: &mpsc::UnboundedSender<ServerMessage>,
    msg: ClientMessage,
) -> Result<(), RelayError> {
    let directory = &state.directory;
    match msg {
        ClientMessage::Enter {
            event_id,
            event_name,
        } => {
            if let Err(e) = validation::validate_event_id(&event_id) {
                let _ = tx.send(ServerMessage::MalformedMessage {
                    reason: e.to_string(),
                });
                return Ok(());
            }
            if let Some(name) = event_name.as_deref() {
                if let Err(e) = validation::validate_display_name(name) {
                    let _ = tx.send(ServerMessage::MalformedMessage {
                        reason: e.to_string(),
                    });
                    return Ok(());
                }
            }
            directory.enter(conn_id, &event_id, event_name)?;
        },
        ClientMessage::StartCall { event_id } => {
            directory.start_call(conn_id, &event_id).await?;
        },
        ClientMessage::JoinExisting { event_id } => {
            directory.join_existing(conn_id, &event_id)?;
        },
        ClientMessage::JoinRandom => directory.join_random(conn_id)?,
        ClientMessage::LeaveCall => directory.leave_call(conn_id)?,
        ClientMessage::RelayOffer { payload, to } => {
            directory.relay(conn_id, SignalKind::Offer, &to, payload)?;
        },
        ClientMessage::RelayAnswer { payload, to } => {
            directory.relay(conn_id, SignalKind::Answer, &to, payload)?;
        },
        ClientMessage::RelayIceCandidate { payload, to } => {
            directory.relay(conn_id, SignalKind::IceCandidate, &to, payload)?;
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_healthz() {
        let state = AppState::new(Settings::default());
        let app = create_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ws_route_rejects_plain_get() {
        let state = AppState::new(Settings::default());
        let app = create_router(state);

        // without the upgrade handshake headers the route must refuse
        let response = app
            .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }
}
