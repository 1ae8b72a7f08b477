// Core type definitions shared by the quote and trade feed handlers

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

// ============================================================================
// Constants
// ============================================================================

/// Number of price levels retained per side (L5).
pub const BOOK_DEPTH: usize = 5;

/// Depth requested for REST snapshots. Deliberately deeper than BOOK_DEPTH so
/// a truncated snapshot or an early delete cannot thin the visible ladder
/// below the depth target.
pub const SNAPSHOT_DEPTH: usize = BOOK_DEPTH * 10;

/// Publisher silence threshold in milliseconds (heartbeat even if unchanged).
pub const PUBLISH_TIMEOUT_MS: u64 = 50;

/// Maximum buffered deltas per symbol while a snapshot fetch is outstanding.
pub const MAX_DELTA_BUFFER: usize = 1000;

/// Nanoseconds between the Unix epoch (1970) and the tick store's epoch
/// (2000-01-01). The first field of every outbound row is the receive
/// wall-clock re-based onto the store's epoch.
pub const SINK_EPOCH_OFFSET_NS: i64 = 946_684_800_000_000_000;

// ============================================================================
// Price levels and sides
// ============================================================================

/// A single price level. Equality is exact on both fields: the exchange
/// emits canonical decimal strings and both the snapshot and delta decoders
/// widen them identically, so bitwise f64 comparison is the round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PriceLevel {
    pub price: f64,
    pub qty: f64,
}

impl PriceLevel {
    pub fn new(price: f64, qty: f64) -> Self {
        Self { price, qty }
    }

    /// Empty slot sentinel: (0.0, 0.0).
    pub fn is_empty(&self) -> bool {
        self.price == 0.0 && self.qty == 0.0
    }
}

/// Book side. Bids sort descending by price, asks ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Bid,
    Ask,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Bid => write!(f, "bid"),
            Side::Ask => write!(f, "ask"),
        }
    }
}

// ============================================================================
// Inbound events
// ============================================================================

/// A decoded depth delta covering the contiguous exchange update-id range
/// [first_update_id, final_update_id]. A level with qty == 0 deletes that
/// price.
#[derive(Debug, Clone)]
pub struct DepthDelta {
    pub first_update_id: u64,
    pub final_update_id: u64,
    pub event_time_ms: i64,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

/// FIFO buffer of deltas received while a symbol awaits its snapshot.
pub type DeltaBuffer = VecDeque<DepthDelta>;

/// A point-in-time book capture from the REST API. Bids arrive sorted
/// high-to-low, asks low-to-high.
#[derive(Debug, Clone)]
pub struct DepthSnapshot {
    pub last_update_id: u64,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

/// A decoded trade event from the @trade stream.
#[derive(Debug, Clone)]
pub struct TradeEvent {
    pub symbol: String,
    pub trade_id: i64,
    pub price: f64,
    pub qty: f64,
    pub buyer_is_maker: bool,
    pub event_time_ms: i64,
    pub trade_time_ms: i64,
}

// ============================================================================
// Outbound rows
// ============================================================================

/// L5 quote row published to the tick sink. Field order on the wire follows
/// the quote table schema: adjusted receive time, symbol, bid prices, bid
/// quantities, ask prices, ask quantities (best first), validity, exchange
/// event time, raw receive time, sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteRow {
    pub sym: String,
    pub bid_px: [f64; BOOK_DEPTH],
    pub bid_qty: [f64; BOOK_DEPTH],
    pub ask_px: [f64; BOOK_DEPTH],
    pub ask_qty: [f64; BOOK_DEPTH],
    pub is_valid: bool,
    pub exch_event_time_ms: i64,
    pub recv_time_ns: i64,
    pub seq_no: u64,
}

impl QuoteRow {
    /// An invalidation row: zeroed ladders, is_valid = false.
    pub fn invalid(sym: &str, exch_event_time_ms: i64, recv_time_ns: i64, seq_no: u64) -> Self {
        Self {
            sym: sym.to_string(),
            bid_px: [0.0; BOOK_DEPTH],
            bid_qty: [0.0; BOOK_DEPTH],
            ask_px: [0.0; BOOK_DEPTH],
            ask_qty: [0.0; BOOK_DEPTH],
            is_valid: false,
            exch_event_time_ms,
            recv_time_ns,
            seq_no,
        }
    }

    /// Compare the 4 x BOOK_DEPTH ladder fields only (change detection).
    pub fn same_ladders_as(&self, other: &QuoteRow) -> bool {
        self.bid_px == other.bid_px
            && self.bid_qty == other.bid_qty
            && self.ask_px == other.ask_px
            && self.ask_qty == other.ask_qty
    }
}

impl fmt::Display for QuoteRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "QuoteRow({} bid={}x{} ask={}x{} valid={} seq={})",
            self.sym,
            self.bid_px[0],
            self.bid_qty[0],
            self.ask_px[0],
            self.ask_qty[0],
            self.is_valid,
            self.seq_no
        )
    }
}

/// Normalized trade row published to the tick sink.
#[derive(Debug, Clone)]
pub struct TradeRow {
    pub sym: String,
    pub trade_id: i64,
    pub price: f64,
    pub qty: f64,
    pub buyer_is_maker: bool,
    pub exch_event_time_ms: i64,
    pub exch_trade_time_ms: i64,
    pub recv_time_ns: i64,
    pub parse_us: i64,
    pub send_us: i64,
    pub seq_no: u64,
}

// ============================================================================
// Connection state / health
// ============================================================================

/// Upstream connection state, published in the health record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    /// Lowercase label used in the health table.
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Per-handler liveness record published to the health table.
#[derive(Debug, Clone)]
pub struct HealthRecord {
    pub time_ns: i64,
    pub handler: String,
    pub start_time_ns: i64,
    pub uptime_secs: i64,
    pub msgs_received: u64,
    pub msgs_published: u64,
    pub last_recv_time_ns: i64,
    pub last_pub_time_ns: i64,
    pub conn_state: ConnectionState,
    pub symbol_count: usize,
}
