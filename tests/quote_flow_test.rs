// End-to-end quote flow tests
//
// These drive the quote handler through its public message path with a stub
// snapshot source and a recording sink - no network. Scenarios follow the
// book lifecycle: clean bring-up, stale snapshot, sequence gap, validity
// oscillation, heartbeat, and the sink retry policy.
//
// Run with: cargo test --test quote_flow_test

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use feed_handler::core::{DepthSnapshot, FeedConfig, HealthRecord, PriceLevel, QuoteRow, TradeRow};
use feed_handler::handler::{QuoteFeedHandler, Shutdown};
use feed_handler::net::{SinkError, SnapshotError, SnapshotSource, TickSink};

// ============================================================================
// Helpers
// ============================================================================

/// Build a combined-stream depth update payload.
fn depth_msg(sym: &str, first: u64, last: u64, bids: &[(f64, f64)], asks: &[(f64, f64)]) -> String {
    let levels = |side: &[(f64, f64)]| {
        side.iter()
            .map(|(p, q)| format!(r#"["{}","{}"]"#, p, q))
            .collect::<Vec<_>>()
            .join(",")
    };
    format!(
        r#"{{"stream":"{stream}@depth","data":{{"e":"depthUpdate","E":{e},"s":"{sym}","U":{first},"u":{last},"b":[{bids}],"a":[{asks}]}}}}"#,
        stream = sym.to_lowercase(),
        e = 1_700_000_000_000u64 + last,
        sym = sym.to_uppercase(),
        first = first,
        last = last,
        bids = levels(bids),
        asks = levels(asks),
    )
}

fn snapshot(last_update_id: u64, bids: &[(f64, f64)], asks: &[(f64, f64)]) -> DepthSnapshot {
    DepthSnapshot {
        last_update_id,
        bids: bids.iter().map(|&(p, q)| PriceLevel::new(p, q)).collect(),
        asks: asks.iter().map(|&(p, q)| PriceLevel::new(p, q)).collect(),
    }
}

/// Snapshot source backed by a queue of canned responses.
#[derive(Clone, Default)]
struct StubSnapshots {
    responses: Arc<Mutex<VecDeque<Result<DepthSnapshot, u16>>>>,
    requests: Arc<Mutex<Vec<(String, usize)>>>,
}

impl StubSnapshots {
    fn push_ok(&self, snap: DepthSnapshot) {
        self.responses.lock().unwrap().push_back(Ok(snap));
    }

    fn push_err(&self) {
        self.responses.lock().unwrap().push_back(Err(503));
    }

    fn requests(&self) -> Vec<(String, usize)> {
        self.requests.lock().unwrap().clone()
    }
}

impl SnapshotSource for StubSnapshots {
    async fn fetch_snapshot(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<DepthSnapshot, SnapshotError> {
        self.requests
            .lock()
            .unwrap()
            .push((symbol.to_string(), limit));
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(snap)) => Ok(snap),
            Some(Err(status)) => Err(SnapshotError::Status(status)),
            None => Err(SnapshotError::Status(599)),
        }
    }
}

/// Sink that records every published row and can fail on demand.
#[derive(Clone, Default)]
struct RecordingSink {
    quotes: Arc<Mutex<Vec<QuoteRow>>>,
    health: Arc<Mutex<Vec<HealthRecord>>>,
    fail_next_sends: Arc<Mutex<u32>>,
    reconnects: Arc<Mutex<u32>>,
}

impl RecordingSink {
    fn quotes(&self) -> Vec<QuoteRow> {
        self.quotes.lock().unwrap().clone()
    }

    fn fail_next(&self, n: u32) {
        *self.fail_next_sends.lock().unwrap() = n;
    }

    fn reconnects(&self) -> u32 {
        *self.reconnects.lock().unwrap()
    }

    fn take_failure(&self) -> bool {
        let mut remaining = self.fail_next_sends.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            true
        } else {
            false
        }
    }
}

impl TickSink for RecordingSink {
    async fn send_quote(&mut self, row: &QuoteRow) -> Result<(), SinkError> {
        if self.take_failure() {
            return Err(SinkError::NotConnected);
        }
        self.quotes.lock().unwrap().push(row.clone());
        Ok(())
    }

    async fn send_trade(&mut self, _row: &TradeRow) -> Result<(), SinkError> {
        Ok(())
    }

    async fn send_health(&mut self, rec: &HealthRecord) -> Result<(), SinkError> {
        self.health.lock().unwrap().push(rec.clone());
        Ok(())
    }

    async fn reconnect(&mut self) -> Result<(), SinkError> {
        *self.reconnects.lock().unwrap() += 1;
        Ok(())
    }
}

fn make_handler(
    symbols: &[&str],
) -> (
    QuoteFeedHandler<StubSnapshots, RecordingSink>,
    StubSnapshots,
    RecordingSink,
) {
    let config = FeedConfig {
        symbols: symbols.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    };
    let snapshots = StubSnapshots::default();
    let sink = RecordingSink::default();
    let handler = QuoteFeedHandler::new(
        &config,
        snapshots.clone(),
        sink.clone(),
        Shutdown::new(),
    );
    (handler, snapshots, sink)
}

fn assert_seq_strictly_increasing(quotes: &[QuoteRow]) {
    for pair in quotes.windows(2) {
        assert!(
            pair[1].seq_no > pair[0].seq_no,
            "sequence numbers must strictly increase: {} then {}",
            pair[0].seq_no,
            pair[1].seq_no
        );
    }
}

/// The engine does not enforce uncrossed books, so the harness checks every
/// valid emission with both sides populated.
fn assert_not_crossed(quotes: &[QuoteRow]) {
    for q in quotes.iter().filter(|q| q.is_valid) {
        if q.bid_px[0] > 0.0 && q.ask_px[0] > 0.0 {
            assert!(
                q.ask_px[0] > q.bid_px[0],
                "crossed book published for {}: bid {} >= ask {}",
                q.sym,
                q.bid_px[0],
                q.ask_px[0]
            );
        }
    }
}

// ============================================================================
// Clean bring-up
// ============================================================================

#[tokio::test]
async fn test_clean_bring_up() {
    let (mut handler, snapshots, sink) = make_handler(&["btcusdt"]);
    snapshots.push_ok(snapshot(108, &[(10.0, 1.0), (9.5, 2.0)], &[(10.5, 3.0)]));

    // first delta arms the fetch; replay straddles 109 and the book goes VALID
    handler
        .process_message(&depth_msg("btcusdt", 100, 110, &[(10.0, 2.0)], &[]), 1_000)
        .await;

    let quotes = sink.quotes();
    assert_eq!(quotes.len(), 1, "one valid quote after bring-up");
    assert!(quotes[0].is_valid);
    assert_eq!(quotes[0].sym, "BTCUSDT");
    assert_eq!(quotes[0].bid_px[0], 10.0);
    assert_eq!(quotes[0].bid_qty[0], 2.0);
    assert_eq!(quotes[0].bid_px[1], 9.5);
    assert_eq!(quotes[0].ask_px[0], 10.5);

    // snapshot requested once, deeper than the book depth
    assert_eq!(snapshots.requests(), vec![("BTCUSDT".to_string(), 50)]);

    // second delta applies live
    handler
        .process_message(&depth_msg("btcusdt", 111, 115, &[(10.1, 1.0)], &[]), 2_000)
        .await;

    let quotes = sink.quotes();
    assert_eq!(quotes.len(), 2);
    assert!(quotes[1].is_valid);
    assert_eq!(quotes[1].bid_px[0], 10.1);
    assert_eq!(quotes[1].recv_time_ns, 2_000);
    assert_seq_strictly_increasing(&quotes);
    assert_not_crossed(&quotes);
}

// ============================================================================
// Stale snapshot
// ============================================================================

#[tokio::test]
async fn test_stale_snapshot_invalidates_and_refetches() {
    let (mut handler, snapshots, sink) = make_handler(&["btcusdt"]);
    // too old: replay finds U=100 > 81
    snapshots.push_ok(snapshot(80, &[(10.0, 1.0)], &[(10.5, 1.0)]));

    handler
        .process_message(&depth_msg("btcusdt", 100, 110, &[], &[]), 1_000)
        .await;

    let quotes = sink.quotes();
    assert_eq!(quotes.len(), 1);
    assert!(!quotes[0].is_valid);
    assert_eq!(quotes[0].bid_px, [0.0; 5]);
    assert_eq!(quotes[0].ask_qty, [0.0; 5]);

    // the next delta re-arms the fetch; a fresh snapshot brings the book up
    snapshots.push_ok(snapshot(112, &[(10.0, 1.0)], &[(10.5, 1.0)]));
    handler
        .process_message(&depth_msg("btcusdt", 111, 115, &[], &[]), 2_000)
        .await;

    assert_eq!(snapshots.requests().len(), 2);
    let quotes = sink.quotes();
    assert_eq!(quotes.len(), 2);
    assert!(quotes[1].is_valid);
    assert_seq_strictly_increasing(&quotes);
}

// ============================================================================
// Sequence gap in VALID
// ============================================================================

#[tokio::test]
async fn test_sequence_gap_emits_single_invalidation() {
    let (mut handler, snapshots, sink) = make_handler(&["btcusdt"]);
    snapshots.push_ok(snapshot(499, &[(10.0, 1.0)], &[(10.5, 1.0)]));

    handler
        .process_message(&depth_msg("btcusdt", 500, 500, &[], &[]), 1_000)
        .await;
    assert_eq!(sink.quotes().len(), 1);

    // next delta skips 501
    handler
        .process_message(&depth_msg("btcusdt", 502, 505, &[(11.0, 1.0)], &[]), 2_000)
        .await;

    let quotes = sink.quotes();
    assert_eq!(quotes.len(), 2, "exactly one invalidation for the edge");
    assert!(!quotes[1].is_valid);
    assert_eq!(quotes[1].bid_px, [0.0; 5]);
    assert_eq!(quotes[1].recv_time_ns, 2_000);

    // the gap delta itself is gone; a later delta re-arms the snapshot fetch
    snapshots.push_ok(snapshot(507, &[(11.0, 1.0)], &[(11.5, 1.0)]));
    handler
        .process_message(&depth_msg("btcusdt", 506, 510, &[], &[]), 3_000)
        .await;
    assert_eq!(snapshots.requests().len(), 2);
    assert_seq_strictly_increasing(&sink.quotes());
}

// ============================================================================
// Validity oscillation
// ============================================================================

#[tokio::test]
async fn test_validity_oscillation_two_edge_emissions() {
    let (mut handler, snapshots, sink) = make_handler(&["btcusdt"]);
    snapshots.push_ok(snapshot(99, &[(10.0, 1.0)], &[(10.5, 1.0)]));

    // bring up
    handler
        .process_message(&depth_msg("btcusdt", 100, 100, &[], &[]), 1_000)
        .await;
    // gap -> INVALID (emit invalidation) -> reset
    handler
        .process_message(&depth_msg("btcusdt", 105, 106, &[], &[]), 2_000)
        .await;
    // buffer -> snapshot -> VALID (emit valid quote)
    snapshots.push_ok(snapshot(109, &[(10.2, 1.0)], &[(10.6, 1.0)]));
    handler
        .process_message(&depth_msg("btcusdt", 107, 110, &[], &[]), 3_000)
        .await;

    let quotes = sink.quotes();
    let validity: Vec<bool> = quotes.iter().map(|q| q.is_valid).collect();
    assert_eq!(validity, vec![true, false, true]);
    assert_seq_strictly_increasing(&quotes);

    // exactly one invalidation across the whole oscillation
    assert_eq!(quotes.iter().filter(|q| !q.is_valid).count(), 1);
}

// ============================================================================
// Heartbeat
// ============================================================================

#[tokio::test]
async fn test_heartbeat_republishes_unchanged_book() {
    let (mut handler, snapshots, sink) = make_handler(&["btcusdt"]);
    snapshots.push_ok(snapshot(99, &[(10.0, 1.0)], &[(10.5, 1.0)]));

    handler
        .process_message(&depth_msg("btcusdt", 100, 100, &[], &[]), 1_000)
        .await;
    assert_eq!(sink.quotes().len(), 1);

    // quiet market: no change for longer than the heartbeat interval
    tokio::time::sleep(Duration::from_millis(70)).await;
    handler.sweep_heartbeats(9_000).await;

    let quotes = sink.quotes();
    assert_eq!(quotes.len(), 2, "exactly one heartbeat emission");
    assert!(quotes[1].is_valid);
    assert!(quotes[1].same_ladders_as(&quotes[0]));
    assert_eq!(quotes[1].exch_event_time_ms, quotes[0].exch_event_time_ms);
    assert!(quotes[1].seq_no > quotes[0].seq_no);
    assert_eq!(quotes[1].recv_time_ns, 9_000);

    // immediately after, nothing further is due
    handler.sweep_heartbeats(9_100).await;
    assert_eq!(sink.quotes().len(), 2);
}

// ============================================================================
// Snapshot failure
// ============================================================================

#[tokio::test]
async fn test_snapshot_failure_invalidates_then_recovers() {
    let (mut handler, snapshots, sink) = make_handler(&["btcusdt"]);
    snapshots.push_err();

    handler
        .process_message(&depth_msg("btcusdt", 100, 110, &[], &[]), 1_000)
        .await;

    let quotes = sink.quotes();
    assert_eq!(quotes.len(), 1);
    assert!(!quotes[0].is_valid);

    // next delta re-arms the fetch and the book recovers
    snapshots.push_ok(snapshot(112, &[(10.0, 1.0)], &[(10.5, 1.0)]));
    handler
        .process_message(&depth_msg("btcusdt", 111, 115, &[], &[]), 2_000)
        .await;

    let quotes = sink.quotes();
    assert_eq!(quotes.len(), 2);
    assert!(quotes[1].is_valid);
}

// ============================================================================
// Dropping and isolation
// ============================================================================

#[tokio::test]
async fn test_unknown_symbol_and_malformed_events_dropped() {
    let (mut handler, snapshots, sink) = make_handler(&["btcusdt"]);

    handler
        .process_message(&depth_msg("solusdt", 100, 110, &[], &[]), 1_000)
        .await;
    handler.process_message("not json at all", 2_000).await;
    // missing U/u
    handler
        .process_message(r#"{"data":{"e":"depthUpdate","E":1,"s":"BTCUSDT","b":[],"a":[]}}"#, 3_000)
        .await;

    assert!(sink.quotes().is_empty());
    assert!(snapshots.requests().is_empty());
}

#[tokio::test]
async fn test_symbols_fail_independently() {
    let (mut handler, snapshots, sink) = make_handler(&["btcusdt", "ethusdt"]);
    snapshots.push_ok(snapshot(99, &[(10.0, 1.0)], &[(10.5, 1.0)]));
    snapshots.push_ok(snapshot(199, &[(20.0, 1.0)], &[(20.5, 1.0)]));

    handler
        .process_message(&depth_msg("btcusdt", 100, 100, &[], &[]), 1_000)
        .await;
    handler
        .process_message(&depth_msg("ethusdt", 200, 200, &[], &[]), 2_000)
        .await;

    // gap on ETH only
    handler
        .process_message(&depth_msg("ethusdt", 205, 206, &[], &[]), 3_000)
        .await;
    // BTC continues cleanly
    handler
        .process_message(&depth_msg("btcusdt", 101, 101, &[(10.1, 1.0)], &[]), 4_000)
        .await;

    let quotes = sink.quotes();
    let eth_invalid = quotes.iter().filter(|q| q.sym == "ETHUSDT" && !q.is_valid).count();
    let btc_invalid = quotes.iter().filter(|q| q.sym == "BTCUSDT" && !q.is_valid).count();
    assert_eq!(eth_invalid, 1);
    assert_eq!(btc_invalid, 0);
    assert!(quotes.last().unwrap().is_valid);
    assert_seq_strictly_increasing(&quotes);
    assert_not_crossed(&quotes);
}

// ============================================================================
// Sink retry policy
// ============================================================================

#[tokio::test]
async fn test_sink_failure_reconnects_and_resends_once() {
    let (mut handler, snapshots, sink) = make_handler(&["btcusdt"]);
    snapshots.push_ok(snapshot(99, &[(10.0, 1.0)], &[(10.5, 1.0)]));

    sink.fail_next(1);
    handler
        .process_message(&depth_msg("btcusdt", 100, 100, &[], &[]), 1_000)
        .await;

    assert_eq!(sink.reconnects(), 1);
    let quotes = sink.quotes();
    assert_eq!(quotes.len(), 1, "resend after reconnect succeeded");
    assert!(quotes[0].is_valid);
}

#[tokio::test]
async fn test_sink_double_failure_drops_quote_and_continues() {
    let (mut handler, snapshots, sink) = make_handler(&["btcusdt"]);
    snapshots.push_ok(snapshot(99, &[(10.0, 1.0)], &[(10.5, 1.0)]));

    // both the write and the post-reconnect resend fail
    sink.fail_next(2);
    handler
        .process_message(&depth_msg("btcusdt", 100, 100, &[], &[]), 1_000)
        .await;

    assert_eq!(sink.reconnects(), 1, "exactly one reconnect attempt");
    assert!(sink.quotes().is_empty(), "quote dropped after second failure");

    // the handler keeps processing afterwards
    handler
        .process_message(&depth_msg("btcusdt", 101, 101, &[(10.1, 1.0)], &[]), 2_000)
        .await;
    assert_eq!(sink.quotes().len(), 1);
}
