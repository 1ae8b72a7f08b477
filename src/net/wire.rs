// Wire format for the tick sink
//
// Length-prefixed binary frames, all scalars little-endian:
//
// ```text
// Offset  Size  Field
// 0       2     magic (0xFD71)
// 2       1     version
// 3       1     record kind (1 = quote, 2 = trade, 3 = health)
// 4       4     payload length (u32)
// 8       n     payload
// ```
//
// Quote payload, in quote-table column order:
//   i64 adjusted receive time (store epoch), u8 symbol length + symbol bytes,
//   BOOK_DEPTH x f64 bid prices, bid qtys, ask prices, ask qtys (best first),
//   u8 validity, i64 exchange event time (ms), i64 raw receive time (ns),
//   u64 sequence number.

use crate::core::types::{HealthRecord, QuoteRow, TradeRow, BOOK_DEPTH, SINK_EPOCH_OFFSET_NS};

pub const WIRE_MAGIC: u16 = 0xFD71;
pub const WIRE_VERSION: u8 = 1;

pub const KIND_QUOTE: u8 = 1;
pub const KIND_TRADE: u8 = 2;
pub const KIND_HEALTH: u8 = 3;

/// Frame header length: magic + version + kind + payload length.
pub const HEADER_LEN: usize = 8;

fn put_u8(buf: &mut Vec<u8>, v: u8) {
    buf.push(v);
}

fn put_bool(buf: &mut Vec<u8>, v: bool) {
    buf.push(u8::from(v));
}

fn put_i64(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_f64(buf: &mut Vec<u8>, v: f64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_sym(buf: &mut Vec<u8>, sym: &str) {
    let bytes = sym.as_bytes();
    let len = bytes.len().min(u8::MAX as usize);
    put_u8(buf, len as u8);
    buf.extend_from_slice(&bytes[..len]);
}

fn frame(kind: u8, payload: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&WIRE_MAGIC.to_le_bytes());
    put_u8(&mut out, WIRE_VERSION);
    put_u8(&mut out, kind);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&payload);
    out
}

/// Encode an L5 quote row.
pub fn encode_quote(row: &QuoteRow) -> Vec<u8> {
    let mut p = Vec::with_capacity(64 + 4 * BOOK_DEPTH * 8);
    put_i64(&mut p, row.recv_time_ns - SINK_EPOCH_OFFSET_NS);
    put_sym(&mut p, &row.sym);
    for v in row.bid_px {
        put_f64(&mut p, v);
    }
    for v in row.bid_qty {
        put_f64(&mut p, v);
    }
    for v in row.ask_px {
        put_f64(&mut p, v);
    }
    for v in row.ask_qty {
        put_f64(&mut p, v);
    }
    put_bool(&mut p, row.is_valid);
    put_i64(&mut p, row.exch_event_time_ms);
    put_i64(&mut p, row.recv_time_ns);
    put_u64(&mut p, row.seq_no);
    frame(KIND_QUOTE, p)
}

/// Encode a trade row.
pub fn encode_trade(row: &TradeRow) -> Vec<u8> {
    let mut p = Vec::with_capacity(96);
    put_i64(&mut p, row.recv_time_ns - SINK_EPOCH_OFFSET_NS);
    put_sym(&mut p, &row.sym);
    put_i64(&mut p, row.trade_id);
    put_f64(&mut p, row.price);
    put_f64(&mut p, row.qty);
    put_bool(&mut p, row.buyer_is_maker);
    put_i64(&mut p, row.exch_event_time_ms);
    put_i64(&mut p, row.exch_trade_time_ms);
    put_i64(&mut p, row.recv_time_ns);
    put_i64(&mut p, row.parse_us);
    put_i64(&mut p, row.send_us);
    put_u64(&mut p, row.seq_no);
    frame(KIND_TRADE, p)
}

/// Encode a handler health record.
pub fn encode_health(rec: &HealthRecord) -> Vec<u8> {
    let mut p = Vec::with_capacity(96);
    put_i64(&mut p, rec.time_ns - SINK_EPOCH_OFFSET_NS);
    put_sym(&mut p, &rec.handler);
    put_i64(&mut p, rec.start_time_ns);
    put_i64(&mut p, rec.uptime_secs);
    put_u64(&mut p, rec.msgs_received);
    put_u64(&mut p, rec.msgs_published);
    put_i64(&mut p, rec.last_recv_time_ns);
    put_i64(&mut p, rec.last_pub_time_ns);
    put_sym(&mut p, rec.conn_state.label());
    put_u64(&mut p, rec.symbol_count as u64);
    frame(KIND_HEALTH, p)
}

// ============================================================================
// Decode helpers (tests and diagnostic tooling)
// ============================================================================

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub kind: u8,
    pub payload_len: u32,
}

/// Parse and validate a frame header, returning None for short or foreign
/// buffers.
pub fn decode_header(buf: &[u8]) -> Option<FrameHeader> {
    if buf.len() < HEADER_LEN {
        return None;
    }
    let magic = u16::from_le_bytes([buf[0], buf[1]]);
    if magic != WIRE_MAGIC {
        return None;
    }
    Some(FrameHeader {
        version: buf[2],
        kind: buf[3],
        payload_len: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
    })
}
