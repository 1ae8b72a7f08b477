// Tick sink - downstream transport for quote/trade/health rows
//
// Fire-and-forget framed writes over TCP. A failed write is reported to the
// caller, which performs exactly one reconnect + resend before dropping the
// row and moving on.

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::core::types::{HealthRecord, QuoteRow, TradeRow};
use crate::net::wire;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sink not connected")]
    NotConnected,
}

/// The outbound transport seam. Tests inject a recording implementation.
pub trait TickSink {
    fn send_quote(
        &mut self,
        row: &QuoteRow,
    ) -> impl std::future::Future<Output = Result<(), SinkError>>;

    fn send_trade(
        &mut self,
        row: &TradeRow,
    ) -> impl std::future::Future<Output = Result<(), SinkError>>;

    fn send_health(
        &mut self,
        rec: &HealthRecord,
    ) -> impl std::future::Future<Output = Result<(), SinkError>>;

    /// Tear down and re-establish the transport after a failed send.
    fn reconnect(&mut self) -> impl std::future::Future<Output = Result<(), SinkError>>;
}

/// TCP sink for the tick-capture service.
pub struct TcpTickSink {
    host: String,
    port: u16,
    conn: Option<TcpStream>,
}

impl TcpTickSink {
    /// Connect at startup. Failure here is a bring-up error; mains exit
    /// non-zero instead of retrying.
    pub async fn connect(host: &str, port: u16) -> Result<Self, SinkError> {
        let conn = TcpStream::connect((host, port)).await?;
        info!(host = host, port = port, "Tick sink connected");
        Ok(Self {
            host: host.to_string(),
            port,
            conn: Some(conn),
        })
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<(), SinkError> {
        let conn = self.conn.as_mut().ok_or(SinkError::NotConnected)?;
        match conn.write_all(frame).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // a broken pipe invalidates the handle until reconnect()
                self.conn = None;
                Err(SinkError::Io(e))
            }
        }
    }
}

impl TickSink for TcpTickSink {
    async fn send_quote(&mut self, row: &QuoteRow) -> Result<(), SinkError> {
        self.write_frame(&wire::encode_quote(row)).await
    }

    async fn send_trade(&mut self, row: &TradeRow) -> Result<(), SinkError> {
        self.write_frame(&wire::encode_trade(row)).await
    }

    async fn send_health(&mut self, rec: &HealthRecord) -> Result<(), SinkError> {
        self.write_frame(&wire::encode_health(rec)).await
    }

    async fn reconnect(&mut self) -> Result<(), SinkError> {
        warn!(host = %self.host, port = self.port, "Reconnecting tick sink");
        self.conn = None;
        let conn = TcpStream::connect((self.host.as_str(), self.port)).await?;
        info!("Tick sink reconnected");
        self.conn = Some(conn);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_failure() {
        // nothing listens on this port
        let result = TcpTickSink::connect("127.0.0.1", 1).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_send_quote_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            sock.read_to_end(&mut buf).await.unwrap();
            buf
        });

        let mut sink = TcpTickSink::connect("127.0.0.1", addr.port()).await.unwrap();
        let row = QuoteRow::invalid("BTCUSDT", 0, 0, 1);
        sink.send_quote(&row).await.unwrap();
        drop(sink);

        let received = accept.await.unwrap();
        let header = wire::decode_header(&received).unwrap();
        assert_eq!(header.kind, wire::KIND_QUOTE);
        assert_eq!(received.len(), wire::HEADER_LEN + header.payload_len as usize);
    }
}
