//! WebSocket connection management and the public invoke/on surface.
//!
//! [`Client::new`] does no I/O. The underlying connection is established
//! once, by whichever invocation touches the wire first; concurrent first
//! uses race into a single handshake behind a `OnceCell`. Push handlers
//! live outside the connection, so `on` registrations made before the
//! first invoke are already in place when frames start arriving.

use crate::dispatch::Dispatcher;
use crate::error::ClientError;
use beacon_protocol::{codec, Frame, PROTOCOL_VERSION};
use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, OnceCell};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// The live half of a client: everything that only exists once the
/// WebSocket handshake has completed.
struct Link {
    connection_id: String,
    out: mpsc::UnboundedSender<Frame>,
    closed: CancellationToken,
}

struct Inner {
    url: String,
    token: Option<String>,
    dispatcher: Arc<Dispatcher>,
    link: OnceCell<Link>,
}

/// A connection to a Beacon server.
///
/// Cheap to clone; all clones share one WebSocket. Invocations go through
/// [`TopicHandle`]s obtained from [`Client::topic`].
///
/// ```rust,ignore
/// let client = Client::new("ws://127.0.0.1:4600/ws");
/// let chat = client.topic("chat");
/// chat.on("Message", |args| println!("{args:?}"));
/// chat.invoke("Join", vec![json!("lobby")]).await?;
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Create a client for `url`. Performs no I/O; the connection is
    /// established on first use.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_token(url, None)
    }

    /// Create a client that identifies with a token on connect.
    #[must_use]
    pub fn with_token(url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                token,
                dispatcher: Arc::new(Dispatcher::new()),
                link: OnceCell::new(),
            }),
        }
    }

    /// Establish the connection now instead of on first invoke.
    ///
    /// # Errors
    ///
    /// Returns an error if the WebSocket connection or the handshake fails.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.link().await.map(|_| ())
    }

    /// The server-assigned connection id, connecting first if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn connection_id(&self) -> Result<String, ClientError> {
        Ok(self.link().await?.connection_id.clone())
    }

    /// Handle for invoking methods on one topic.
    #[must_use]
    pub fn topic(&self, topic: impl Into<String>) -> TopicHandle {
        TopicHandle {
            client: self.clone(),
            topic: topic.into(),
        }
    }

    /// Whether an established connection has been torn down.
    ///
    /// `false` for a client that has not connected yet.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner
            .link
            .get()
            .is_some_and(|link| link.closed.is_cancelled())
    }

    /// Wait until an established connection is torn down.
    pub async fn closed(&self) {
        if let Some(link) = self.inner.link.get() {
            link.closed.cancelled().await;
        }
    }

    /// Tear the connection down. Pending invocations fail with
    /// [`ClientError::Closed`].
    pub fn close(&self) {
        self.inner.dispatcher.close();
        if let Some(link) = self.inner.link.get() {
            link.closed.cancel();
        }
    }

    async fn link(&self) -> Result<&Link, ClientError> {
        self.inner
            .link
            .get_or_try_init(|| {
                connect_link(
                    self.inner.url.clone(),
                    self.inner.token.clone(),
                    Arc::clone(&self.inner.dispatcher),
                )
            })
            .await
    }
}

/// Invocation surface for one topic.
#[derive(Clone)]
pub struct TopicHandle {
    client: Client,
    topic: String,
}

impl TopicHandle {
    /// The topic identifier this handle addresses.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.topic
    }

    /// Invoke a topic method and wait for its reply.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Fault`] if the server answers with a fault
    /// and [`ClientError::Closed`] if the connection drops first.
    pub async fn invoke(
        &self,
        message: &str,
        args: Vec<Value>,
    ) -> Result<Option<Value>, ClientError> {
        let link = self.client.link().await?;
        let dispatcher = &self.client.inner.dispatcher;

        let (id, rx) = dispatcher.register_call();
        let frame = Frame::invoke(id, self.topic.clone(), message, args);
        if link.out.send(frame).is_err() {
            dispatcher.abandon_call(id);
            return Err(ClientError::Closed);
        }
        rx.await.map_err(|_| ClientError::Closed)?
    }

    /// Invoke a topic method without waiting for an outcome.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the connection is gone.
    pub async fn send(&self, message: &str, args: Vec<Value>) -> Result<(), ClientError> {
        let link = self.client.link().await?;
        link.out
            .send(Frame::send(self.topic.clone(), message, args))
            .map_err(|_| ClientError::Closed)
    }

    /// Register a handler for a message pushed on this topic.
    ///
    /// Message names match case-insensitively. Registering a second
    /// handler for the same message replaces the first. Does not connect;
    /// registrations made before the first invoke take effect immediately
    /// once frames arrive.
    pub fn on<F>(&self, message: &str, handler: F)
    where
        F: Fn(Vec<Value>) + Send + Sync + 'static,
    {
        self.client.inner.dispatcher.on(&self.topic, message, handler);
    }
}

/// Dial, handshake, and spawn the reader and writer tasks.
async fn connect_link(
    url: String,
    token: Option<String>,
    dispatcher: Arc<Dispatcher>,
) -> Result<Link, ClientError> {
    let (ws, _) = connect_async(&url)
        .await
        .map_err(|e| ClientError::Connect(e.to_string()))?;
    let (mut sink, mut stream) = ws.split();

    // Identify first; the server's Connected frame may already be in
    // flight, the order does not matter.
    let hello = codec::encode(&Frame::connect(PROTOCOL_VERSION, token))?;
    sink.send(Message::Binary(hello.to_vec()))
        .await
        .map_err(|e| ClientError::Connect(e.to_string()))?;

    let mut read_buffer = BytesMut::with_capacity(4096);
    let connection_id = loop {
        if let Some(frame) = codec::decode_from(&mut read_buffer)? {
            match frame {
                Frame::Connected {
                    connection_id,
                    version,
                    ..
                } => {
                    if version != PROTOCOL_VERSION {
                        warn!(server_version = version, "Protocol version mismatch");
                    }
                    break connection_id;
                }
                other => {
                    return Err(ClientError::Handshake(format!(
                        "expected Connected, got {:?}",
                        other.frame_type()
                    )))
                }
            }
        }
        match stream.next().await {
            Some(Ok(Message::Binary(data))) => read_buffer.extend_from_slice(&data),
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(ClientError::Connect(e.to_string())),
            None => return Err(ClientError::Closed),
        }
    };
    debug!(connection = %connection_id, "Connected");

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Frame>();
    let closed = CancellationToken::new();

    // Writer: single owner of the sink
    let writer_closed = closed.clone();
    tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                frame = out_rx.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
                () = writer_closed.cancelled() => break,
            };
            let data = match codec::encode(&frame) {
                Ok(data) => data,
                Err(e) => {
                    warn!(error = %e, "Failed to encode frame");
                    continue;
                }
            };
            if sink.send(Message::Binary(data.to_vec())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    // Reader: decodes frames and feeds the dispatcher
    let reader_closed = closed.clone();
    let reader_out = out_tx.clone();
    tokio::spawn(async move {
        'read: loop {
            let result = tokio::select! {
                result = stream.next() => match result {
                    Some(result) => result,
                    None => break 'read,
                },
                () = reader_closed.cancelled() => break 'read,
            };
            match result {
                Ok(Message::Binary(data)) => {
                    read_buffer.extend_from_slice(&data);
                    loop {
                        match codec::decode_from(&mut read_buffer) {
                            Ok(Some(frame)) => {
                                if let Some(response) = dispatcher.handle(frame) {
                                    let _ = reader_out.send(response);
                                }
                            }
                            Ok(None) => break,
                            Err(e) => {
                                warn!(error = %e, "Undecodable frame, closing");
                                break 'read;
                            }
                        }
                    }
                }
                // tungstenite answers pings on its own
                Ok(Message::Close(_)) => break 'read,
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "WebSocket error");
                    break 'read;
                }
            }
        }
        dispatcher.close();
        reader_closed.cancel();
    });

    Ok(Link {
        connection_id,
        out: out_tx,
        closed,
    })
}
