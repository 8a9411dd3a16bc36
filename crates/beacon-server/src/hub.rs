//! Hub adapter: the bridge between transport connections and the topic
//! registry.
//!
//! Each WebSocket connection gets one handler task. Inbound `Invoke`
//! frames are dispatched to the registry on spawned tasks so a slow topic
//! method never blocks the socket; replies and faults come back over a
//! per-connection outbox. Pushes addressed to the connection arrive on
//! the receiver registered with the [`PushRouter`] and are framed as
//! `Send` on the way out.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use beacon_core::{CallContext, InvokeError, PushRouter, TopicRegistry};
use beacon_protocol::{codec, Frame, PROTOCOL_VERSION};
use beacon_transport::ConnectionId;
use bytes::BytesMut;
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// Per-connection push routing and channel membership.
    pub router: Arc<PushRouter>,
    /// The registered topics.
    pub registry: TopicRegistry,
    /// Server configuration.
    pub config: Config,
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(state: Arc<AppState>) -> Result<()> {
    let config = state.config.clone();

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    // Build router
    let app = Router::new()
        .route(&config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    // Bind and serve
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Beacon server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();

    let connection_id = ConnectionId::generate().to_string();
    debug!(connection = %connection_id, "WebSocket connected");

    // Split the WebSocket
    let (mut sender, mut receiver) = socket.split();

    // Send Connected frame
    let connected_frame = Frame::connected(
        &connection_id,
        PROTOCOL_VERSION,
        heartbeat_hint(state.config.heartbeat.interval_ms),
    );
    if send_frame(&mut sender, &connected_frame).await.is_err() {
        error!(connection = %connection_id, "Failed to send Connected frame");
        return;
    }

    // Register with the push router before any topic method can address us,
    // and join the connection-scoped default channel
    let mut push_rx = state.router.register_connection(&connection_id);
    state
        .router
        .groups()
        .add(&connection_id, &format!("conn:{connection_id}"));

    // Cancelled when this connection goes away; in-flight invocations get
    // child tokens
    let cancel = CancellationToken::new();

    // Outbox for replies and faults produced by spawned invocations
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Frame>();

    // Identity attached by a Connect frame, if any
    let mut user: Option<String> = None;

    // Read buffer for partial frames
    let mut read_buffer = BytesMut::with_capacity(4096);

    loop {
        tokio::select! {
            biased;

            // Pushes addressed to this connection (direct, channel, or all)
            Some(push) = push_rx.recv() => {
                let frame = Frame::send(
                    push.topic.clone(),
                    push.message.clone(),
                    push.args.clone(),
                );
                metrics::record_push();
                if send_frame(&mut sender, &frame).await.is_err() {
                    break;
                }
            }

            // Replies and faults from in-flight invocations
            Some(frame) = out_rx.recv() => {
                if send_frame(&mut sender, &frame).await.is_err() {
                    break;
                }
            }

            // Receive from WebSocket
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => {
                        if data.len() > state.config.limits.max_message_size {
                            warn!(
                                connection = %connection_id,
                                bytes = data.len(),
                                "Inbound message exceeds size limit"
                            );
                            break;
                        }
                        metrics::record_message(data.len(), "inbound");
                        read_buffer.extend_from_slice(&data);

                        if !drain_frames(
                            &mut read_buffer,
                            &connection_id,
                            &mut user,
                            &state,
                            &cancel,
                            &out_tx,
                        ) {
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        // Treat text as binary
                        read_buffer.extend_from_slice(text.as_bytes());
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // Ignore pongs
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_fault("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    // Cleanup: cancel in-flight invocations, then drop routing state and
    // channel memberships
    cancel.cancel();
    state.router.drop_connection(&connection_id);
    metrics::set_active_channels(state.router.groups().channel_count());

    debug!(connection = %connection_id, "WebSocket disconnected");
}

/// Drain every complete frame from the read buffer.
///
/// Returns `false` when the stream is unrecoverable and the connection
/// must close: a decode error leaves the offending bytes in place, so
/// retrying the same buffer can only fail again.
fn drain_frames(
    read_buffer: &mut BytesMut,
    connection_id: &str,
    user: &mut Option<String>,
    state: &Arc<AppState>,
    cancel: &CancellationToken,
    out_tx: &mpsc::UnboundedSender<Frame>,
) -> bool {
    loop {
        match codec::decode_from(read_buffer) {
            Ok(Some(frame)) => {
                handle_frame(frame, connection_id, user, state, cancel, out_tx);
            }
            Ok(None) => return true,
            Err(e) => {
                warn!(connection = %connection_id, error = %e, "Undecodable inbound data, closing");
                metrics::record_fault("protocol");
                return false;
            }
        }
    }
}

/// Handle one decoded frame from the client.
fn handle_frame(
    frame: Frame,
    connection_id: &str,
    user: &mut Option<String>,
    state: &Arc<AppState>,
    cancel: &CancellationToken,
    out_tx: &mpsc::UnboundedSender<Frame>,
) {
    match frame {
        Frame::Invoke {
            id,
            topic,
            message,
            args,
        } => {
            debug!(connection = %connection_id, topic = %topic, message = %message, "Invoke");
            spawn_invocation(
                state,
                connection_id,
                user.clone(),
                topic,
                message,
                args,
                cancel.child_token(),
                Some((id, out_tx.clone())),
            );
        }

        // Fire-and-forget invocation: no reply, faults are only logged
        Frame::Send {
            topic,
            message,
            args,
        } => {
            debug!(connection = %connection_id, topic = %topic, message = %message, "Send");
            spawn_invocation(
                state,
                connection_id,
                user.clone(),
                topic,
                message,
                args,
                cancel.child_token(),
                None,
            );
        }

        Frame::Ping { timestamp } => {
            let _ = out_tx.send(Frame::pong(timestamp));
        }

        Frame::Pong { .. } => {
            // Liveness only
        }

        Frame::Connect { version, token } => {
            if version != PROTOCOL_VERSION {
                warn!(
                    connection = %connection_id,
                    client_version = version,
                    "Protocol version mismatch"
                );
            }
            // The token doubles as the caller identity until real
            // authentication lands in front of the hub.
            *user = token;
        }

        other => {
            warn!(
                connection = %connection_id,
                frame_type = ?other.frame_type(),
                "Unexpected frame type"
            );
        }
    }
}

/// Dispatch one invocation on its own task.
///
/// With a `reply_to`, the outcome goes back to the caller as a `Reply` or
/// `Fault` frame; without one the outcome is discarded after logging.
#[allow(clippy::too_many_arguments)]
fn spawn_invocation(
    state: &Arc<AppState>,
    connection_id: &str,
    user: Option<String>,
    topic: String,
    message: String,
    args: Vec<Value>,
    cancel: CancellationToken,
    reply_to: Option<(u64, mpsc::UnboundedSender<Frame>)>,
) {
    let state = Arc::clone(state);
    let context = CallContext {
        connection_id: connection_id.to_string(),
        user,
    };

    tokio::spawn(async move {
        let start = Instant::now();
        metrics::record_invocation(&topic);

        let outcome = state
            .registry
            .invoke(context, &topic, &message, args, cancel)
            .await;
        metrics::record_invoke_latency(start.elapsed().as_secs_f64());

        match (outcome, reply_to) {
            (Ok(payload), Some((id, out))) => {
                let _ = out.send(Frame::reply(id, payload));
            }
            (Err(e), Some((id, out))) => {
                metrics::record_fault(fault_kind(&e));
                debug!(topic = %topic, message = %message, error = %e, "Invocation faulted");
                let _ = out.send(Frame::fault(id, e.to_string()));
            }
            (Ok(_), None) => {}
            (Err(e), None) => {
                metrics::record_fault(fault_kind(&e));
                debug!(topic = %topic, message = %message, error = %e, "Send faulted");
            }
        }
    });
}

/// The heartbeat interval advertised in the handshake. The wire field is
/// narrower than the config value; clamp rather than truncate.
fn heartbeat_hint(interval_ms: u64) -> u32 {
    u32::try_from(interval_ms).unwrap_or(u32::MAX)
}

fn fault_kind(error: &InvokeError) -> &'static str {
    match error {
        InvokeError::TopicNotFound(_) => "topic_not_found",
        InvokeError::MessageNotFound { .. } => "message_not_found",
        InvokeError::Argument(_) => "argument",
        InvokeError::Method(_) => "method",
    }
}

/// Send a frame to the WebSocket.
async fn send_frame(sender: &mut SplitSink<WebSocket, Message>, frame: &Frame) -> Result<()> {
    let data = codec::encode(frame)?;
    metrics::record_message(data.len(), "outbound");
    sender.send(Message::Binary(data.to_vec())).await?;
    Ok(())
}
