// Quote feed handler - depth stream driver with snapshot reconciliation
//
// Owns the whole quote path on one task: websocket reads, per-symbol state
// dispatch, inline snapshot fetch + buffered replay, change-detected
// publication, heartbeat sweeps and health reporting. Per-symbol lifecycle:
//
//   INIT -> (buffer deltas, fetch snapshot) -> SYNCING -> (replay) -> VALID
//   VALID -> (sequence gap) -> INVALID -> INIT (rebuild)

use tracing::{debug, info, warn};

use crate::book::state::{InvalidReason, Phase};
use crate::book::{decode_depth_event, BookManager, DeltaOutcome, QuotePublisher};
use crate::core::config::FeedConfig;
use crate::core::types::{ConnectionState, QuoteRow, SNAPSHOT_DEPTH};
use crate::handler::{sleep_with_backoff, wall_clock_ns, HealthTracker, Shutdown};
use crate::net::rest::SnapshotSource;
use crate::net::sink::TickSink;
use crate::net::websocket::{depth_streams, FeedError, MarketStream, BINANCE_WS_URL};

pub struct QuoteFeedHandler<S: SnapshotSource, K: TickSink> {
    stream_symbols: Vec<String>,
    books: BookManager,
    publisher: QuotePublisher,
    snapshots: S,
    sink: K,
    shutdown: Shutdown,
    health: HealthTracker,
    ws_base_url: String,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
    reconnect_attempt: u32,
    /// Strictly increasing across every outbound quote for the process
    /// lifetime, advanced for every extraction whether or not it is sent.
    seq_no: u64,
}

impl<S: SnapshotSource, K: TickSink> QuoteFeedHandler<S, K> {
    pub fn new(config: &FeedConfig, snapshots: S, sink: K, shutdown: Shutdown) -> Self {
        let internal = config.internal_symbols();
        let books = BookManager::new(&internal);
        let publisher = QuotePublisher::new(books.len());
        let health = HealthTracker::new("quote", books.len(), wall_clock_ns());

        Self {
            stream_symbols: config.stream_symbols(),
            publisher,
            snapshots,
            sink,
            shutdown,
            health,
            ws_base_url: BINANCE_WS_URL.to_string(),
            initial_backoff_ms: config.initial_backoff_ms,
            max_backoff_ms: config.max_backoff_ms,
            reconnect_attempt: 0,
            seq_no: 0,
            books,
        }
    }

    /// Websocket endpoint override, used by tests.
    pub fn with_ws_base_url(mut self, url: &str) -> Self {
        self.ws_base_url = url.to_string();
        self
    }

    // ========================================================================
    // Outer loop
    // ========================================================================

    /// Run until shutdown, reconnecting with exponential backoff on upstream
    /// failure.
    pub async fn run(&mut self) {
        info!(symbols = ?self.stream_symbols, "Quote handler starting");

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
            "Quote handler stopped"
        );
    }

    /// One websocket session: connect, then process messages until the
    /// transport fails or shutdown is requested. Ok(()) means graceful
    /// shutdown.
    async fn run_stream_loop(&mut self) -> Result<(), FeedError> {
        self.health.set_conn_state(ConnectionState::Connecting);

        // Discard all in-flight state; the delta stream has no resumption
        // semantics, so every connection starts from scratch.
        self.books.reset_all();

        let streams = depth_streams(&self.stream_symbols);
        let mut ws = MarketStream::connect(&self.ws_base_url, &streams).await?;

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
            self.sweep_heartbeats(recv_time_ns).await;
            self.publish_health(recv_time_ns).await;
        }
    }

    // ========================================================================
    // Per-message dispatch
    // ========================================================================

    /// Decode one inbound payload and drive the owning slot's state machine.
    /// Undecodable events and unknown symbols are dropped silently.
    pub async fn process_message(&mut self, raw: &str, recv_time_ns: i64) {
        let (symbol, delta) = match decode_depth_event(raw) {
            Ok(decoded) => decoded,
            Err(e) => {
                debug!(error = %e, "Dropping undecodable event");
                return;
            }
        };

        let idx = match self.books.index_of(&symbol) {
            Some(idx) => idx,
            None => return,
        };

        self.health.note_received(recv_time_ns);

        match self.books.state(idx).phase() {
            Phase::Init => {
                if self.books.buffer_delta(idx, delta) {
                    self.sync_symbol(idx, recv_time_ns).await;
                }
            }
            Phase::Syncing | Phase::Valid => {
                match self.books.apply_delta(idx, &delta) {
                    DeltaOutcome::Applied { .. } => self.maybe_publish(idx, recv_time_ns).await,
                    DeltaOutcome::Stale => {}
                    DeltaOutcome::Invalidated(_) => {
                        self.publish_invalid(idx, recv_time_ns).await;
                        self.books.reset(idx);
                    }
                }
            }
            Phase::Invalid => {
                // the delta that finds a broken slot restarts the cycle
                self.books.reset(idx);
                if self.books.buffer_delta(idx, delta) {
                    self.sync_symbol(idx, recv_time_ns).await;
                }
            }
        }
    }

    // ========================================================================
    // Synchronization coordinator
    // ========================================================================

    /// Fetch the snapshot for one symbol and replay its buffered deltas.
    ///
    /// The fetch is awaited inline: the feed cannot do useful work for this
    /// symbol until it lands, and other symbols keep buffering in their own
    /// slots. Stale buffered deltas are skipped; a gap stops the replay and
    /// rebuilds.
    async fn sync_symbol(&mut self, idx: usize, recv_time_ns: i64) {
        let symbol = self.books.symbol(idx).to_string();
        info!(symbol = %symbol, "Requesting depth snapshot");

        let snapshot = match self.snapshots.fetch_snapshot(&symbol, SNAPSHOT_DEPTH).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Snapshot fetch failed");
                self.books.invalidate(idx, InvalidReason::SnapshotFailed);
                self.publish_invalid(idx, recv_time_ns).await;
                return;
            }
        };

        let buffered = self.books.apply_snapshot(idx, &snapshot);
        debug!(symbol = %symbol, buffered = buffered.len(), "Replaying buffered deltas");

        for delta in &buffered {
            match self.books.apply_delta(idx, delta) {
                DeltaOutcome::Applied { .. } => {}
                DeltaOutcome::Stale => {}
                DeltaOutcome::Invalidated(_) => {
                    self.publish_invalid(idx, recv_time_ns).await;
                    self.books.reset(idx);
                    return;
                }
            }
        }

        if self.books.is_valid(idx) {
            self.maybe_publish(idx, recv_time_ns).await;
        }
    }

    // ========================================================================
    // Publishing
    // ========================================================================

    async fn maybe_publish(&mut self, idx: usize, recv_time_ns: i64) {
        self.seq_no += 1;
        let quote = self.books.extract_quote(idx, recv_time_ns, self.seq_no);

        if self.publisher.should_publish(idx, &quote) {
            self.send_quote(&quote).await;
            self.publisher.record_publish(idx, &quote);
            self.health.note_published(recv_time_ns);
        }
    }

    /// Emit the single invalidation for a slot that just went INVALID:
    /// zeroed ladders, is_valid = false. The slot's last event time is kept
    /// so per-symbol event times stay non-decreasing.
    async fn publish_invalid(&mut self, idx: usize, recv_time_ns: i64) {
        self.seq_no += 1;
        let quote = QuoteRow::invalid(
            self.books.symbol(idx),
            self.books.exch_event_time_ms(idx),
            recv_time_ns,
            self.seq_no,
        );

        self.send_quote(&quote).await;
        self.publisher.record_publish(idx, &quote);
        self.health.note_published(recv_time_ns);
        info!(symbol = %quote.sym, seq = quote.seq_no, "Published invalidation");
    }

    /// Emit quotes for all VALID slots whose last publish is older than the
    /// heartbeat interval, bounding inter-publish silence while the market is
    /// quiet. Runs after every inbound message.
    pub async fn sweep_heartbeats(&mut self, recv_time_ns: i64) {
        for idx in 0..self.books.len() {
            if self.books.is_valid(idx) && self.publisher.heartbeat_due(idx) {
                self.seq_no += 1;
                let quote = self.books.extract_quote(idx, recv_time_ns, self.seq_no);
                self.send_quote(&quote).await;
                self.publisher.record_publish(idx, &quote);
                self.health.note_published(recv_time_ns);
            }
        }
    }

    /// One reconnect + resend on failure, then the quote is dropped.
    async fn send_quote(&mut self, quote: &QuoteRow) {
        if self.sink.send_quote(quote).await.is_ok() {
            return;
        }

        warn!(seq = quote.seq_no, "Sink write failed, reconnecting");
        match self.sink.reconnect().await {
            Ok(()) => {
                if let Err(e) = self.sink.send_quote(quote).await {
                    warn!(error = %e, seq = quote.seq_no, "Resend failed, dropping quote");
                }
            }
            Err(e) => {
                warn!(error = %e, seq = quote.seq_no, "Sink reconnect failed, dropping quote");
            }
        }
    }

    /// Best-effort health record on its own cadence; the next interval
    /// retries after a failed send.
    async fn publish_health(&mut self, now_ns: i64) {
        if let Some(record) = self.health.due_record(now_ns) {
            if let Err(e) = self.sink.send_health(&record).await {
                debug!(error = %e, "Health publish failed");
            }
        }
    }
}
