// Handler health tracking - per-handler liveness published to the sink

use std::time::{Duration, Instant};

use crate::core::types::{ConnectionState, HealthRecord};

/// Health publish interval. Ticked at message boundaries, so emission can be
/// delayed by a blocked call; that is acceptable.
const HEALTH_INTERVAL: Duration = Duration::from_secs(5);

pub struct HealthTracker {
    handler: String,
    start_time_ns: i64,
    started: Instant,
    msgs_received: u64,
    msgs_published: u64,
    last_recv_time_ns: i64,
    last_pub_time_ns: i64,
    conn_state: ConnectionState,
    symbol_count: usize,
    last_emit: Instant,
    interval: Duration,
}

impl HealthTracker {
    pub fn new(handler: &str, symbol_count: usize, start_time_ns: i64) -> Self {
        let now = Instant::now();
        Self {
            handler: handler.to_string(),
            start_time_ns,
            started: now,
            msgs_received: 0,
            msgs_published: 0,
            last_recv_time_ns: 0,
            last_pub_time_ns: 0,
            conn_state: ConnectionState::Disconnected,
            symbol_count,
            last_emit: now,
            interval: HEALTH_INTERVAL,
        }
    }

    pub fn note_received(&mut self, recv_time_ns: i64) {
        self.msgs_received += 1;
        self.last_recv_time_ns = recv_time_ns;
    }

    pub fn note_published(&mut self, pub_time_ns: i64) {
        self.msgs_published += 1;
        self.last_pub_time_ns = pub_time_ns;
    }

    pub fn set_conn_state(&mut self, state: ConnectionState) {
        self.conn_state = state;
    }

    pub fn conn_state(&self) -> ConnectionState {
        self.conn_state
    }

    pub fn msgs_received(&self) -> u64 {
        self.msgs_received
    }

    pub fn msgs_published(&self) -> u64 {
        self.msgs_published
    }

    /// A record due for emission, or None inside the interval. The caller
    /// sends it and the clock restarts here either way.
    pub fn due_record(&mut self, now_ns: i64) -> Option<HealthRecord> {
        if self.last_emit.elapsed() < self.interval {
            return None;
        }
        self.last_emit = Instant::now();
        Some(self.record(now_ns))
    }

    /// Build the current record unconditionally.
    pub fn record(&self, now_ns: i64) -> HealthRecord {
        HealthRecord {
            time_ns: now_ns,
            handler: self.handler.clone(),
            start_time_ns: self.start_time_ns,
            uptime_secs: self.started.elapsed().as_secs() as i64,
            msgs_received: self.msgs_received,
            msgs_published: self.msgs_published,
            last_recv_time_ns: self.last_recv_time_ns,
            last_pub_time_ns: self.last_pub_time_ns,
            conn_state: self.conn_state,
            symbol_count: self.symbol_count,
        }
    }
}
