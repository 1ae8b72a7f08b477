// Trade feed handler - per-event normalization with gap detection
//
// Stateless apart from the last trade id per symbol: decode, validate the
// id sequence, stamp latencies, publish. Shares the reconnect/backoff and
// sink-retry policies with the quote handler.

use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::book::decode_trade_event;
use crate::core::config::FeedConfig;
use crate::core::types::{ConnectionState, TradeRow};
use crate::handler::{sleep_with_backoff, wall_clock_ns, HealthTracker, Shutdown};
use crate::net::sink::TickSink;
use crate::net::websocket::{trade_streams, FeedError, MarketStream, BINANCE_WS_URL};

pub struct TradeFeedHandler<K: TickSink> {
    stream_symbols: Vec<String>,
    known_symbols: HashSet<String>,
    last_trade_id: HashMap<String, i64>,
    sink: K,
    shutdown: Shutdown,
    health: HealthTracker,
    ws_base_url: String,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
    reconnect_attempt: u32,
    seq_no: u64,
}

impl<K: TickSink> TradeFeedHandler<K> {
    pub fn new(config: &FeedConfig, sink: K, shutdown: Shutdown) -> Self {
        let known_symbols: HashSet<String> = config.internal_symbols().into_iter().collect();
        let health = HealthTracker::new("trade", known_symbols.len(), wall_clock_ns());

        Self {
            stream_symbols: config.stream_symbols(),
            known_symbols,
            last_trade_id: HashMap::new(),
            sink,
            shutdown,
            health,
            ws_base_url: BINANCE_WS_URL.to_string(),
            initial_backoff_ms: config.initial_backoff_ms,
            max_backoff_ms: config.max_backoff_ms,
            reconnect_attempt: 0,
            seq_no: 0,
        }
    }

    /// Websocket endpoint override, used by tests.
    pub fn with_ws_base_url(mut self, url: &str) -> Self {
        self.ws_base_url = url.to_string();
        self
    }

    /// Run until shutdown, reconnecting with exponential backoff on upstream
    /// failure.
    pub async fn run(&mut self) {
        info!(symbols = ?self.stream_symbols, "Trade handler starting");

        while !self.shutdown.is_set() {
            match self.run_stream_loop().await {
                Ok(()) => break,
                Err(e) => {
                    if self.shutdown.is_set() {
                        break;
                    }
                    warn!(error = %e, "Upstream connection lost, will reconnect");
                    self.health.set_conn_state(ConnectionState::Reconnecting);

                    let attempt = self.reconnect_attempt;
                    self.reconnect_attempt = self.reconnect_attempt.saturating_add(1);
                    if !sleep_with_backoff(
                        attempt,
                        self.initial_backoff_ms,
                        self.max_backoff_ms,
                        &self.shutdown,
                    )
                    .await
                    {
                        break;
                    }
                }
            }
        }

        self.health.set_conn_state(ConnectionState::Disconnected);
        info!(
            received = self.health.msgs_received(),
            published = self.health.msgs_published(),
            "Trade handler stopped"
        );
    }

    async fn run_stream_loop(&mut self) -> Result<(), FeedError> {
        self.health.set_conn_state(ConnectionState::Connecting);

        let streams = trade_streams(&self.stream_symbols);
        let mut ws = MarketStream::connect(&self.ws_base_url, &streams).await?;

        // trade ids restart cleanly on a fresh stream
        self.last_trade_id.clear();
        self.reconnect_attempt = 0;
        self.health.set_conn_state(ConnectionState::Connected);

        let shutdown = self.shutdown.clone();
        loop {
            let msg = tokio::select! {
                msg = ws.next_text() => msg?,
                _ = shutdown.wait() => {
                    ws.close().await;
                    return Ok(());
                }
            };

            let recv_time_ns = wall_clock_ns();
            self.process_message(&msg, recv_time_ns).await;
            self.publish_health(recv_time_ns).await;
        }
    }

    /// Decode, validate and publish one trade event. Undecodable events and
    /// unknown symbols are dropped silently.
    pub async fn process_message(&mut self, raw: &str, recv_time_ns: i64) {
        let parse_start = Instant::now();

        let trade = match decode_trade_event(raw) {
            Ok(trade) => trade,
            Err(e) => {
                debug!(error = %e, "Dropping undecodable event");
                return;
            }
        };

        if !self.known_symbols.contains(&trade.symbol) {
            return;
        }

        self.health.note_received(recv_time_ns);
        self.validate_trade_id(&trade.symbol, trade.trade_id);

        let parse_us = parse_start.elapsed().as_micros() as i64;
        let normalize_start = Instant::now();

        self.seq_no += 1;
        let mut row = TradeRow {
            sym: trade.symbol,
            trade_id: trade.trade_id,
            price: trade.price,
            qty: trade.qty,
            buyer_is_maker: trade.buyer_is_maker,
            exch_event_time_ms: trade.event_time_ms,
            exch_trade_time_ms: trade.trade_time_ms,
            recv_time_ns,
            parse_us,
            send_us: 0,
            seq_no: self.seq_no,
        };
        // time spent normalizing between parse completion and sink hand-off
        row.send_us = normalize_start.elapsed().as_micros() as i64;

        self.send_trade(&row).await;
        self.health.note_published(recv_time_ns);
    }

    /// Log trade-id anomalies: duplicates, out-of-order delivery and gaps.
    /// The event is still published; the anomaly is observability only.
    fn validate_trade_id(&mut self, symbol: &str, trade_id: i64) {
        if let Some(&last) = self.last_trade_id.get(symbol) {
            if trade_id == last {
                warn!(symbol = symbol, trade_id = trade_id, "Duplicate trade id");
            } else if trade_id < last {
                warn!(
                    symbol = symbol,
                    last = last,
                    trade_id = trade_id,
                    "Out-of-order trade id"
                );
            } else if trade_id > last + 1 {
                warn!(
                    symbol = symbol,
                    last = last,
                    trade_id = trade_id,
                    missed = trade_id - last - 1,
                    "Trade id gap"
                );
            }
        }
        self.last_trade_id.insert(symbol.to_string(), trade_id);
    }

    /// One reconnect + resend on failure, then the trade is dropped.
    async fn send_trade(&mut self, row: &TradeRow) {
        if self.sink.send_trade(row).await.is_ok() {
            return;
        }

        warn!(seq = row.seq_no, "Sink write failed, reconnecting");
        match self.sink.reconnect().await {
            Ok(()) => {
                if let Err(e) = self.sink.send_trade(row).await {
                    warn!(error = %e, seq = row.seq_no, "Resend failed, dropping trade");
                }
            }
            Err(e) => {
                warn!(error = %e, seq = row.seq_no, "Sink reconnect failed, dropping trade");
            }
        }
    }

    async fn publish_health(&mut self, now_ns: i64) {
        if let Some(record) = self.health.due_record(now_ns) {
            if let Err(e) = self.sink.send_health(&record).await {
                debug!(error = %e, "Health publish failed");
            }
        }
    }
}
