//! Duplex connections to relays.
//!
//! [`Connector`] opens one [`RelayConnection`] per subscription. Failures are
//! reported to the caller and never retried here.

use std::{fmt, time::Duration};

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::{interval_at, Instant, Interval};
use tokio_socks::tcp::Socks5Stream;
use tokio_tungstenite::tungstenite::{
    client::IntoClientRequest, protocol::WebSocketConfig, Error as WsError, Message,
};
use tokio_tungstenite::{client_async_tls_with_config, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};
use url::Url;

use crate::{error::TransportError, message::ClientMessage};

/// Address of one relay. Only `ws://` and `wss://` URLs are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelayEndpoint(Url);

impl RelayEndpoint {
    pub fn parse(url: &str) -> Result<Self, TransportError> {
        let parsed = Url::parse(url.trim())
            .map_err(|e| TransportError::InvalidUrl(format!("{url}: {e}")))?;
        match parsed.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(TransportError::InvalidUrl(format!(
                    "{url}: scheme must be ws or wss, got {other}"
                )))
            }
        }
        if parsed.host_str().is_none() {
            return Err(TransportError::InvalidUrl(format!("{url}: missing host")));
        }
        Ok(Self(parsed))
    }

    pub fn url(&self) -> &Url {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for RelayEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Process-wide transport settings, read-only once built.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Upper bound for a single inbound frame and message, in bytes.
    pub max_frame_size: usize,
    /// Keep-alive ping interval while waiting for frames.
    pub ping_interval: Option<Duration>,
    /// Optional SOCKS5 proxy (host:port).
    pub tor_socks: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_size: 16 << 20,
            ping_interval: Some(Duration::from_secs(30)),
            tor_socks: None,
        }
    }
}

impl TransportConfig {
    fn websocket_config(&self) -> WebSocketConfig {
        let mut cfg = WebSocketConfig::default();
        cfg.max_frame_size = Some(self.max_frame_size);
        cfg.max_message_size = Some(self.max_frame_size);
        cfg
    }
}

/// Opens connections to relays.
#[allow(async_fn_in_trait)]
pub trait Connector {
    type Connection: RelayConnection;

    async fn open(&self, endpoint: &RelayEndpoint) -> Result<Self::Connection, TransportError>;
}

/// One open duplex connection.
#[allow(async_fn_in_trait)]
pub trait RelayConnection {
    async fn send(&mut self, message: &ClientMessage) -> Result<(), TransportError>;

    /// Next inbound text frame, or `None` once the connection is closed.
    async fn receive(&mut self) -> Result<Option<String>, TransportError>;

    /// Start closing the connection. Frames already in flight can still be read.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// WebSocket [`Connector`] with optional SOCKS5 proxying.
#[derive(Debug, Clone, Default)]
pub struct WsConnector {
    config: TransportConfig,
}

impl WsConnector {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }
}

type BoxedStream = Box<dyn AsyncReadWrite + Unpin + Send>;

/// WebSocket connection to a single relay.
pub struct WsConnection {
    ws: WebSocketStream<MaybeTlsStream<BoxedStream>>,
    ping: Option<Interval>,
}

impl Connector for WsConnector {
    type Connection = WsConnection;

    async fn open(&self, endpoint: &RelayEndpoint) -> Result<WsConnection, TransportError> {
        debug!("connecting");
        let ws = connect_ws(endpoint, &self.config).await?;
        info!("connected");
        let ping = self
            .config
            .ping_interval
            .filter(|d| !d.is_zero())
            .map(|period| interval_at(Instant::now() + period, period));
        Ok(WsConnection { ws, ping })
    }
}

impl RelayConnection for WsConnection {
    async fn send(&mut self, message: &ClientMessage) -> Result<(), TransportError> {
        let text = message.to_json();
        debug!(message = %text, "sending");
        self.ws.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            let next = match self.ping.as_mut() {
                Some(ping) => tokio::select! {
                    msg = self.ws.next() => Some(msg),
                    _ = ping.tick() => None,
                },
                None => Some(self.ws.next().await),
            };
            let Some(next) = next else {
                debug!("sending keep-alive ping");
                self.ws.send(Message::Ping(Vec::new())).await?;
                continue;
            };
            match next {
                None => return Ok(None),
                Some(Ok(Message::Text(txt))) => {
                    debug!(bytes = txt.len(), "frame received");
                    return Ok(Some(txt));
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "relay closed connection");
                    return Ok(None);
                }
                Some(Ok(Message::Binary(data))) => {
                    debug!(bytes = data.len(), "ignoring binary frame");
                }
                Some(Ok(_)) => {}
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => return Ok(None),
                Some(Err(WsError::Capacity(e))) => {
                    return Err(TransportError::Frame(e.to_string()))
                }
                Some(Err(WsError::Utf8)) => {
                    return Err(TransportError::Frame("invalid utf-8 in text frame".into()))
                }
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        debug!("closing connection");
        // No frames may follow our close frame.
        self.ping = None;
        match self.ws.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Establish a WebSocket connection, optionally via a SOCKS5 proxy.
async fn connect_ws(
    endpoint: &RelayEndpoint,
    config: &TransportConfig,
) -> Result<WebSocketStream<MaybeTlsStream<BoxedStream>>, TransportError> {
    let url = endpoint.url();
    let host = url
        .host_str()
        .ok_or_else(|| TransportError::InvalidUrl(format!("{endpoint}: missing host")))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| TransportError::InvalidUrl(format!("{endpoint}: missing port")))?;
    let req = endpoint.as_str().into_client_request()?;
    let stream: BoxedStream = if let Some(proxy) = config.tor_socks.as_deref() {
        Box::new(Socks5Stream::connect(proxy, (host, port)).await?)
    } else {
        Box::new(
            TcpStream::connect((host, port))
                .await
                .map_err(|e| TransportError::Connect(format!("{host}:{port}: {e}")))?,
        )
    };
    let (ws, _) =
        client_async_tls_with_config(req, stream, Some(config.websocket_config()), None).await?;
    Ok(ws)
}

/// Blanket trait for boxed async read/write streams.
trait AsyncReadWrite: AsyncRead + AsyncWrite {}
impl<T: AsyncRead + AsyncWrite> AsyncReadWrite for T {}
