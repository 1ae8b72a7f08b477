// Message parser - Binance depth/trade stream payloads and REST snapshots
// Prices and quantities arrive as decimal strings and are widened to f64;
// the snapshot and delta paths share the same widening so price keys
// round-trip identically.

use serde::Deserialize;
use thiserror::Error;

use crate::core::types::{DepthDelta, DepthSnapshot, PriceLevel, TradeEvent};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("invalid {field}: '{value}'")]
    BadNumber { field: &'static str, value: String },
}

/// Parse a string field as f64.
fn parse_f64_field(value: &str, field: &'static str) -> Result<f64, ParseError> {
    value.parse::<f64>().map_err(|_| ParseError::BadNumber {
        field,
        value: value.to_string(),
    })
}

/// Parse a Binance [price_string, qty_string] pair.
fn parse_level(raw: &[String; 2]) -> Result<PriceLevel, ParseError> {
    Ok(PriceLevel {
        price: parse_f64_field(&raw[0], "price")?,
        qty: parse_f64_field(&raw[1], "qty")?,
    })
}

fn parse_levels(raw: &[[String; 2]]) -> Result<Vec<PriceLevel>, ParseError> {
    raw.iter().map(parse_level).collect()
}

// ============================================================================
// Raw Binance payloads
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawDepthUpdate {
    #[serde(rename = "e")]
    _event_type: String,
    #[serde(rename = "E")]
    event_time: i64,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "U")]
    first_update_id: u64,
    #[serde(rename = "u")]
    final_update_id: u64,
    #[serde(rename = "b")]
    bids: Vec<[String; 2]>,
    #[serde(rename = "a")]
    asks: Vec<[String; 2]>,
}

#[derive(Debug, Deserialize)]
struct RawDepthSnapshot {
    #[serde(rename = "lastUpdateId")]
    last_update_id: u64,
    bids: Vec<[String; 2]>,
    asks: Vec<[String; 2]>,
}

#[derive(Debug, Deserialize)]
struct RawTrade {
    #[serde(rename = "e")]
    _event_type: String,
    #[serde(rename = "E")]
    event_time: i64,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "t")]
    trade_id: i64,
    #[serde(rename = "p")]
    price: String,
    #[serde(rename = "q")]
    qty: String,
    #[serde(rename = "T")]
    trade_time: i64,
    #[serde(rename = "m")]
    buyer_is_maker: bool,
}

/// Unwrap the combined stream envelope {"stream": "...", "data": {...}} if
/// present; bare payloads pass through.
fn unwrap_envelope(value: &serde_json::Value) -> &serde_json::Value {
    value.get("data").unwrap_or(value)
}

// ============================================================================
// Decode entry points
// ============================================================================

/// Decode a depth update event, returning the uppercase symbol and delta.
/// Events missing the mandatory `s`/`U`/`u` fields are errors; the driver
/// drops them silently.
pub fn decode_depth_event(raw_json: &str) -> Result<(String, DepthDelta), ParseError> {
    let value: serde_json::Value =
        serde_json::from_str(raw_json).map_err(|e| ParseError::InvalidJson(e.to_string()))?;
    let payload = unwrap_envelope(&value);

    if payload.get("s").is_none() {
        return Err(ParseError::MissingField("s"));
    }
    if payload.get("U").is_none() || payload.get("u").is_none() {
        return Err(ParseError::MissingField("U/u"));
    }

    let raw: RawDepthUpdate = serde_json::from_value(payload.clone())
        .map_err(|e| ParseError::InvalidJson(e.to_string()))?;

    let delta = DepthDelta {
        first_update_id: raw.first_update_id,
        final_update_id: raw.final_update_id,
        event_time_ms: raw.event_time,
        bids: parse_levels(&raw.bids)?,
        asks: parse_levels(&raw.asks)?,
    };

    Ok((raw.symbol.to_uppercase(), delta))
}

/// Decode a trade event from the @trade stream.
pub fn decode_trade_event(raw_json: &str) -> Result<TradeEvent, ParseError> {
    let value: serde_json::Value =
        serde_json::from_str(raw_json).map_err(|e| ParseError::InvalidJson(e.to_string()))?;
    let payload = unwrap_envelope(&value);

    if payload.get("s").is_none() || payload.get("t").is_none() {
        return Err(ParseError::MissingField("s/t"));
    }

    let raw: RawTrade = serde_json::from_value(payload.clone())
        .map_err(|e| ParseError::InvalidJson(e.to_string()))?;

    Ok(TradeEvent {
        symbol: raw.symbol.to_uppercase(),
        trade_id: raw.trade_id,
        price: parse_f64_field(&raw.price, "price")?,
        qty: parse_f64_field(&raw.qty, "qty")?,
        buyer_is_maker: raw.buyer_is_maker,
        event_time_ms: raw.event_time,
        trade_time_ms: raw.trade_time,
    })
}

/// Decode a REST depth snapshot response body.
///
/// Binance error bodies carry `code`/`msg` instead of book data; those are
/// surfaced as a decode error carrying the API message.
pub fn decode_snapshot(body: &str) -> Result<DepthSnapshot, ParseError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| ParseError::InvalidJson(e.to_string()))?;

    if let Some(code) = value.get("code").and_then(|c| c.as_i64()) {
        let msg = value
            .get("msg")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown");
        return Err(ParseError::InvalidJson(format!("API error {}: {}", code, msg)));
    }

    if value.get("lastUpdateId").is_none() {
        return Err(ParseError::MissingField("lastUpdateId"));
    }

    let raw: RawDepthSnapshot =
        serde_json::from_value(value).map_err(|e| ParseError::InvalidJson(e.to_string()))?;

    Ok(DepthSnapshot {
        last_update_id: raw.last_update_id,
        bids: parse_levels(&raw.bids)?,
        asks: parse_levels(&raw.asks)?,
    })
}
