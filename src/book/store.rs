// Ladder store - flat L5 ladders for all symbols
//
// All price/qty data lives in four flat Vec<f64> arrays indexed by
// [symbol_index * BOOK_DEPTH + level]. At the expected scale (~100 symbols,
// depth 5) the whole store is a few KB and stays resident in L1; per-update
// work is O(BOOK_DEPTH) with no allocation on the hot path.
//
// Layout per side: index 0 is the best level, unoccupied slots are
// (0.0, 0.0), and occupied slots are densely packed before empty ones.

use crate::core::types::{PriceLevel, Side, BOOK_DEPTH};

pub struct LadderStore {
    num_symbols: usize,
    bid_px: Vec<f64>,
    bid_qty: Vec<f64>,
    ask_px: Vec<f64>,
    ask_qty: Vec<f64>,
}

impl LadderStore {
    pub fn new(num_symbols: usize) -> Self {
        let total = num_symbols * BOOK_DEPTH;
        Self {
            num_symbols,
            bid_px: vec![0.0; total],
            bid_qty: vec![0.0; total],
            ask_px: vec![0.0; total],
            ask_qty: vec![0.0; total],
        }
    }

    pub fn num_symbols(&self) -> usize {
        self.num_symbols
    }

    /// Write a snapshot's ladders into the slot, truncating to the top
    /// BOOK_DEPTH levels per side. Exchange sort order is preserved (bids
    /// high-to-low, asks low-to-high).
    pub fn write_snapshot(&mut self, idx: usize, bids: &[PriceLevel], asks: &[PriceLevel]) {
        self.clear(idx);
        let off = idx * BOOK_DEPTH;

        for (i, level) in bids.iter().take(BOOK_DEPTH).enumerate() {
            self.bid_px[off + i] = level.price;
            self.bid_qty[off + i] = level.qty;
        }
        for (i, level) in asks.iter().take(BOOK_DEPTH).enumerate() {
            self.ask_px[off + i] = level.price;
            self.ask_qty[off + i] = level.qty;
        }
    }

    /// Apply a single level update - the sole ladder mutator.
    ///
    /// qty == 0 deletes the level at that price (no-op if absent). qty > 0
    /// overwrites an existing level's quantity or inserts at the sorted rank,
    /// dropping whatever falls off the BOOK_DEPTH-th slot. Inserts ranked
    /// worse than the worst retained level are discarded.
    pub fn apply_level_update(&mut self, idx: usize, side: Side, update: PriceLevel) {
        let off = idx * BOOK_DEPTH;
        let (px, qty) = match side {
            Side::Bid => (
                &mut self.bid_px[off..off + BOOK_DEPTH],
                &mut self.bid_qty[off..off + BOOK_DEPTH],
            ),
            Side::Ask => (
                &mut self.ask_px[off..off + BOOK_DEPTH],
                &mut self.ask_qty[off..off + BOOK_DEPTH],
            ),
        };

        // Single pass: find the existing level and the insertion rank
        let mut existing = None;
        let mut insert_at = BOOK_DEPTH;
        for i in 0..BOOK_DEPTH {
            if px[i] == update.price && qty[i] > 0.0 {
                existing = Some(i);
                break;
            }
            let better = match side {
                Side::Bid => update.price > px[i],
                Side::Ask => update.price < px[i],
            };
            if insert_at == BOOK_DEPTH && (px[i] == 0.0 || better) {
                insert_at = i;
            }
        }

        if update.qty == 0.0 {
            // Delete: shift the tail left, clear the last slot
            if let Some(pos) = existing {
                for i in pos..BOOK_DEPTH - 1 {
                    px[i] = px[i + 1];
                    qty[i] = qty[i + 1];
                }
                px[BOOK_DEPTH - 1] = 0.0;
                qty[BOOK_DEPTH - 1] = 0.0;
            }
        } else if let Some(pos) = existing {
            qty[pos] = update.qty;
        } else if insert_at < BOOK_DEPTH {
            // Insert: shift the tail right, dropping the last slot
            for i in (insert_at + 1..BOOK_DEPTH).rev() {
                px[i] = px[i - 1];
                qty[i] = qty[i - 1];
            }
            px[insert_at] = update.price;
            qty[insert_at] = update.qty;
        }
        // insert ranked beyond BOOK_DEPTH: discard
    }

    /// Copy both ladders flat into the caller's arrays.
    pub fn copy_out(
        &self,
        idx: usize,
        bid_px: &mut [f64; BOOK_DEPTH],
        bid_qty: &mut [f64; BOOK_DEPTH],
        ask_px: &mut [f64; BOOK_DEPTH],
        ask_qty: &mut [f64; BOOK_DEPTH],
    ) {
        let off = idx * BOOK_DEPTH;
        bid_px.copy_from_slice(&self.bid_px[off..off + BOOK_DEPTH]);
        bid_qty.copy_from_slice(&self.bid_qty[off..off + BOOK_DEPTH]);
        ask_px.copy_from_slice(&self.ask_px[off..off + BOOK_DEPTH]);
        ask_qty.copy_from_slice(&self.ask_qty[off..off + BOOK_DEPTH]);
    }

    /// Zero both ladders for a slot.
    pub fn clear(&mut self, idx: usize) {
        let off = idx * BOOK_DEPTH;
        for i in 0..BOOK_DEPTH {
            self.bid_px[off + i] = 0.0;
            self.bid_qty[off + i] = 0.0;
            self.ask_px[off + i] = 0.0;
            self.ask_qty[off + i] = 0.0;
        }
    }

    pub fn bid_levels(&self, idx: usize) -> Vec<PriceLevel> {
        self.side_levels(idx, Side::Bid)
    }

    pub fn ask_levels(&self, idx: usize) -> Vec<PriceLevel> {
        self.side_levels(idx, Side::Ask)
    }

    fn side_levels(&self, idx: usize, side: Side) -> Vec<PriceLevel> {
        let off = idx * BOOK_DEPTH;
        let (px, qty) = match side {
            Side::Bid => (&self.bid_px, &self.bid_qty),
            Side::Ask => (&self.ask_px, &self.ask_qty),
        };
        (0..BOOK_DEPTH)
            .map(|i| PriceLevel::new(px[off + i], qty[off + i]))
            .collect()
    }
}
