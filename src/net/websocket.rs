// WebSocket market stream - combined-stream client for Binance
//
// The driver owns the stream directly and reads it inline from its single
// task; there is no channel fan-out. Read failures and server closes surface
// as FeedError so the driver can reset all books and re-enter its reconnect
// loop.

use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

/// Binance combined-stream endpoint (TLS).
pub const BINANCE_WS_URL: &str = "wss://stream.binance.com:9443";

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("websocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("stream closed by server")]
    StreamClosed,
}

/// Stream names for the depth subscription (lowercase symbols).
pub fn depth_streams(symbols: &[String]) -> Vec<String> {
    symbols.iter().map(|s| format!("{}@depth", s.to_lowercase())).collect()
}

/// Stream names for the trade subscription (lowercase symbols).
pub fn trade_streams(symbols: &[String]) -> Vec<String> {
    symbols.iter().map(|s| format!("{}@trade", s.to_lowercase())).collect()
}

/// Combined stream URL: {base}/stream?streams=a@depth/b@depth
pub fn combined_stream_url(base: &str, streams: &[String]) -> String {
    format!("{}/stream?streams={}", base, streams.join("/"))
}

/// A connected market-data stream.
pub struct MarketStream {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl MarketStream {
    /// Connect and subscribe via the combined-stream path.
    pub async fn connect(base: &str, streams: &[String]) -> Result<Self, FeedError> {
        let url = combined_stream_url(base, streams);
        info!(url = %url, streams = streams.len(), "Connecting to market stream");

        let (inner, _) = connect_async(url.as_str()).await?;
        info!("Market stream connected");

        Ok(Self { inner })
    }

    /// Read the next text payload, answering pings along the way. Any
    /// transport failure or server-side close is a FeedError; the caller
    /// treats it as an upstream reset.
    pub async fn next_text(&mut self) -> Result<String, FeedError> {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text),
                Some(Ok(Message::Ping(payload))) => {
                    self.inner.send(Message::Pong(payload)).await?;
                }
                Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Binary(data))) => {
                    warn!(bytes = data.len(), "Unexpected binary message, ignoring");
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(frame = ?frame, "Market stream closed by server");
                    return Err(FeedError::StreamClosed);
                }
                Some(Ok(Message::Frame(_))) => {}
                Some(Err(e)) => return Err(FeedError::Ws(e)),
                None => return Err(FeedError::StreamClosed),
            }
        }
    }

    /// Best-effort graceful close for shutdown.
    pub async fn close(&mut self) {
        if let Err(e) = self.inner.close(None).await {
            debug!(error = %e, "Error closing market stream");
        }
    }
}
