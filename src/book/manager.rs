// Book manager - per-symbol slots over the flat ladder store
//
// Single owner of all book state: symbol <-> index mapping, ladders, slot
// state machines and exchange event times. Mutated only by the feed driver
// on its one task, so no synchronization is needed.

use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::book::state::{check_sequence, InvalidReason, SeqDecision, SlotState};
use crate::book::store::LadderStore;
use crate::core::types::{
    DeltaBuffer, DepthDelta, DepthSnapshot, QuoteRow, Side, MAX_DELTA_BUFFER,
};

/// Result of feeding one delta to a slot in SYNCING or VALID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOutcome {
    /// Updates applied. `became_valid` marks the SYNCING -> VALID edge.
    Applied { became_valid: bool },
    /// Stale replay delta, skipped; replay continues.
    Stale,
    /// Sequence broken; the slot is now INVALID.
    Invalidated(InvalidReason),
}

pub struct BookManager {
    symbols: Vec<String>,
    index: HashMap<String, usize>,
    ladders: LadderStore,
    states: Vec<SlotState>,
    event_time_ms: Vec<i64>,
}

impl BookManager {
    /// Build slots for the configured symbols. Symbols are uppercased for
    /// internal keys; index order follows the input order.
    pub fn new(symbols: &[String]) -> Self {
        let symbols: Vec<String> = symbols.iter().map(|s| s.to_uppercase()).collect();
        let index = symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), i))
            .collect();
        let n = symbols.len();

        info!(symbols = ?symbols, "Book manager initialized");

        Self {
            ladders: LadderStore::new(n),
            states: (0..n).map(|_| SlotState::new()).collect(),
            event_time_ms: vec![0; n],
            symbols,
            index,
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn index_of(&self, symbol: &str) -> Option<usize> {
        self.index.get(symbol).copied()
    }

    pub fn symbol(&self, idx: usize) -> &str {
        &self.symbols[idx]
    }

    pub fn state(&self, idx: usize) -> &SlotState {
        &self.states[idx]
    }

    pub fn is_valid(&self, idx: usize) -> bool {
        self.states[idx].is_valid()
    }

    pub fn exch_event_time_ms(&self, idx: usize) -> i64 {
        self.event_time_ms[idx]
    }

    // ========================================================================
    // INIT-phase buffering
    // ========================================================================

    /// Append a delta to an INIT slot's buffer. Returns true when this call
    /// armed the snapshot fetch (flag was clear); the coordinator then owns
    /// the fetch.
    ///
    /// If the slot is not in INIT the call is a no-op (the driver dispatches
    /// by state first).
    pub fn buffer_delta(&mut self, idx: usize, delta: DepthDelta) -> bool {
        match &mut self.states[idx] {
            SlotState::Init {
                buffer,
                snapshot_requested,
            } => {
                if buffer.len() >= MAX_DELTA_BUFFER {
                    // replay will miss the straddle and rebuild via snapshot
                    buffer.pop_front();
                    warn!(
                        symbol = %self.symbols[idx],
                        cap = MAX_DELTA_BUFFER,
                        "Delta buffer full, dropping oldest"
                    );
                }
                buffer.push_back(delta);

                if !*snapshot_requested {
                    *snapshot_requested = true;
                    true
                } else {
                    false
                }
            }
            _ => false,
        }
    }

    // ========================================================================
    // Snapshot application and delta sequencing
    // ========================================================================

    /// Apply a REST snapshot: write the top-depth ladders, move the slot from
    /// INIT to SYNCING and hand the buffered deltas back for FIFO replay.
    pub fn apply_snapshot(&mut self, idx: usize, snapshot: &DepthSnapshot) -> DeltaBuffer {
        let prev = std::mem::replace(
            &mut self.states[idx],
            SlotState::Syncing {
                snapshot_update_id: snapshot.last_update_id,
            },
        );

        self.ladders.write_snapshot(idx, &snapshot.bids, &snapshot.asks);

        debug!(
            symbol = %self.symbols[idx],
            last_update_id = snapshot.last_update_id,
            bids = snapshot.bids.len(),
            asks = snapshot.asks.len(),
            "Snapshot applied"
        );

        match prev {
            SlotState::Init { buffer, .. } => buffer,
            _ => DeltaBuffer::new(),
        }
    }

    /// Feed one delta to a slot in SYNCING or VALID: run the acceptance rule,
    /// mutate the ladders on accept, and advance the state machine.
    pub fn apply_delta(&mut self, idx: usize, delta: &DepthDelta) -> DeltaOutcome {
        match check_sequence(&self.states[idx], delta.first_update_id, delta.final_update_id) {
            SeqDecision::Accept => {
                let became_valid = !self.states[idx].is_valid();

                for update in &delta.bids {
                    self.ladders.apply_level_update(idx, Side::Bid, *update);
                }
                for update in &delta.asks {
                    self.ladders.apply_level_update(idx, Side::Ask, *update);
                }

                self.states[idx] = SlotState::Valid {
                    last_update_id: delta.final_update_id,
                };
                self.event_time_ms[idx] = delta.event_time_ms;

                if became_valid {
                    info!(
                        symbol = %self.symbols[idx],
                        last_update_id = delta.final_update_id,
                        "Book is now VALID"
                    );
                }
                DeltaOutcome::Applied { became_valid }
            }
            SeqDecision::Stale => DeltaOutcome::Stale,
            SeqDecision::Reject(reason) => {
                self.invalidate(idx, reason);
                DeltaOutcome::Invalidated(reason)
            }
        }
    }

    /// Drive a slot to INVALID, logging the reason. Ladders keep their last
    /// contents until the driver resets the slot; extraction reports the
    /// invalid state.
    pub fn invalidate(&mut self, idx: usize, reason: InvalidReason) {
        warn!(
            symbol = %self.symbols[idx],
            from = %self.states[idx],
            reason = %reason,
            "Book invalidated"
        );
        self.states[idx] = SlotState::Invalid;
    }

    /// Return a slot to INIT: ladders zeroed, buffer discarded, snapshot
    /// fetch disarmed, event time cleared.
    pub fn reset(&mut self, idx: usize) {
        self.ladders.clear(idx);
        self.states[idx] = SlotState::new();
        self.event_time_ms[idx] = 0;
    }

    /// Reset every slot (upstream reconnect discards all in-flight state; the
    /// delta stream offers no resumption).
    pub fn reset_all(&mut self) {
        for idx in 0..self.symbols.len() {
            self.reset(idx);
        }
        debug!(count = self.symbols.len(), "All books reset");
    }

    // ========================================================================
    // Extraction
    // ========================================================================

    /// Extract the publishable quote for a slot. is_valid reflects the slot
    /// state at this moment.
    pub fn extract_quote(&self, idx: usize, recv_time_ns: i64, seq_no: u64) -> QuoteRow {
        let mut row = QuoteRow {
            sym: self.symbols[idx].clone(),
            bid_px: Default::default(),
            bid_qty: Default::default(),
            ask_px: Default::default(),
            ask_qty: Default::default(),
            is_valid: self.states[idx].is_valid(),
            exch_event_time_ms: self.event_time_ms[idx],
            recv_time_ns,
            seq_no,
        };
        self.ladders.copy_out(
            idx,
            &mut row.bid_px,
            &mut row.bid_qty,
            &mut row.ask_px,
            &mut row.ask_qty,
        );
        row
    }
}
