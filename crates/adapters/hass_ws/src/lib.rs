//! # smartish-adapter-hass-ws
//!
//! WebSocket adapter — implements the [`FrameSink`] and [`FrameSource`]
//! ports for the Home Assistant WebSocket API using tokio-tungstenite.
//!
//! ## Responsibilities
//! - Open the WebSocket connection
//! - Serialize outbound frames as JSON text messages from a single writer
//!   task, so any number of clones can send concurrently
//! - Decode inbound text messages into JSON values
//!
//! Frame semantics (authentication, correlation) live in `smartish-app`.

pub mod config;
pub mod error;

use futures_util::stream::SplitStream;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use smartish_app::ports::{FrameSink, FrameSource};
use smartish_domain::error::SmartishError;

pub use config::HomeAssistantConfig;
pub use error::WsError;

const OUTBOUND_CAPACITY: usize = 64;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open a connection to `url` and split it into its two halves.
///
/// # Errors
///
/// Returns [`WsError::Connect`] when the handshake fails.
pub async fn connect(url: &str) -> Result<(WsFrameSink, WsFrameSource<SplitStream<Socket>>), WsError> {
    let (socket, _response) = connect_async(url).await.map_err(|source| WsError::Connect {
        url: url.to_string(),
        source,
    })?;
    tracing::info!(%url, "connected to home-automation server");
    let (write, read) = socket.split();
    Ok((WsFrameSink::spawn(write), WsFrameSource::new(read)))
}

/// Sending half. Cheap to clone; clones feed the same writer task.
#[derive(Clone)]
pub struct WsFrameSink {
    outbound: mpsc::Sender<Message>,
}

impl WsFrameSink {
    /// Start the writer task over `write`. The task stops when every clone
    /// of the returned sink is gone or the socket fails.
    pub fn spawn<W>(mut write: W) -> Self
    where
        W: Sink<Message, Error = tungstenite::Error> + Unpin + Send + 'static,
    {
        let (outbound, mut queue) = mpsc::channel::<Message>(OUTBOUND_CAPACITY);
        tokio::spawn(async move {
            while let Some(message) = queue.recv().await {
                if let Err(err) = write.send(message).await {
                    tracing::warn!(error = %err, "WebSocket send failed, stopping writer");
                    break;
                }
            }
            let _ = write.close().await;
        });
        Self { outbound }
    }

    /// Ask the server to close the connection.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::WriterClosed`] when the writer has already stopped.
    pub async fn close(&self) -> Result<(), WsError> {
        self.outbound
            .send(Message::Close(None))
            .await
            .map_err(|_| WsError::WriterClosed)
    }
}

impl FrameSink for WsFrameSink {
    async fn send(&self, frame: serde_json::Value) -> Result<(), SmartishError> {
        self.outbound
            .send(Message::Text(frame.to_string().into()))
            .await
            .map_err(|_| WsError::WriterClosed.into_domain())
    }
}

/// Receiving half.
pub struct WsFrameSource<R> {
    read: R,
}

impl<R> WsFrameSource<R> {
    pub fn new(read: R) -> Self {
        Self { read }
    }
}

impl<R> FrameSource for WsFrameSource<R>
where
    R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin + Send,
{
    async fn recv(&mut self) -> Result<Option<serde_json::Value>, SmartishError> {
        loop {
            let Some(message) = self.read.next().await else {
                return Ok(None);
            };
            match message.map_err(WsError::Receive)? {
                Message::Text(text) => match serde_json::from_str(text.as_str()) {
                    Ok(frame) => return Ok(Some(frame)),
                    Err(err) => tracing::warn!(error = %err, "dropping non-JSON message"),
                },
                Message::Close(frame) => {
                    tracing::info!(?frame, "server closed the connection");
                    return Ok(None);
                }
                Message::Binary(_) | Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }
}
