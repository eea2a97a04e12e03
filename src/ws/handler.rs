//! WebSocket upgrade handler
//!
//! Each connection is given a fresh participant id, which is the
//! transport-verified sender stamped on every frame forwarded to the
//! session. The participant's avatar is spawned on connect and despawned
//! when the socket closes.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::game::{Outbound, ParticipantId, SessionHandle};
use crate::http::routes::AppError;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("socket: {0}")]
    Socket(#[from] axum::Error),
}

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Result<Response, AppError> {
    if !state.has_capacity() {
        warn!(
            connections = state.connection_count(),
            max_players = state.config.max_players,
            "Rejecting connection, session full"
        );
        return Err(AppError::Unavailable("Session is full".to_string()));
    }

    let participant = ParticipantId::new_random();
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, participant, state)))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, participant: ParticipantId, state: AppState) {
    info!(participant = %participant, "New WebSocket connection");
    state.register(participant);

    let (mut ws_sink, ws_stream) = socket.split();

    let welcome = ServerMsg::Welcome {
        participant_id: participant,
        tick_rate: state.session.tick_rate,
        server_time: unix_millis(),
    };

    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(participant = %participant, error = %e, "Failed to send welcome");
        state.unregister(participant);
        return;
    }

    // Subscribe before joining so the connection sees its own spawn
    let outbound_rx = state.session.subscribe();
    if state.session.submit(participant, ClientMsg::Join).await.is_err() {
        error!(participant = %participant, "Session is gone");
        state.unregister(participant);
        return;
    }

    run_connection(participant, ws_sink, ws_stream, &state.session, outbound_rx).await;

    state.unregister(participant);
    info!(participant = %participant, "WebSocket connection closed");
}

/// Pump frames both ways until either side closes
async fn run_connection(
    participant: ParticipantId,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    session: &SessionHandle,
    mut outbound_rx: broadcast::Receiver<Outbound>,
) {
    let rate_limiter = ConnectionRateLimiter::new();

    // Writer task: session output addressed to us -> WebSocket
    let writer_handle = tokio::spawn(async move {
        loop {
            match outbound_rx.recv().await {
                Ok(outbound) => {
                    if !outbound.is_for(participant) {
                        continue;
                    }
                    if let Err(e) = send_msg(&mut ws_sink, &outbound.msg).await {
                        debug!(participant = %participant, error = %e, "WebSocket send failed");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(participant = %participant, lagged_count = n, "Connection lagged, skipping messages");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(participant = %participant, "Outbound channel closed");
                    break;
                }
            }
        }
    });

    // Reader loop: WebSocket -> session
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let msg = match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!(participant = %participant, error = %e, "Failed to parse client message");
                        continue;
                    }
                };

                let allowed = match &msg {
                    ClientMsg::Rpc(_) => rate_limiter.check_rpc(),
                    _ => rate_limiter.check_input(),
                };
                if !allowed {
                    debug!(participant = %participant, "Rate limited client message");
                    continue;
                }

                if session.submit(participant, msg).await.is_err() {
                    debug!(participant = %participant, "Session input channel closed");
                    break;
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(participant = %participant, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(participant = %participant, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(participant = %participant, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Despawn the avatar
    let _ = session.submit(participant, ClientMsg::Leave).await;

    writer_handle.abort();
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), SendError> {
    let json = serde_json::to_string(msg)?;
    sink.send(Message::Text(json)).await?;
    Ok(())
}
