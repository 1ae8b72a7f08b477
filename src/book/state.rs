// Per-symbol lifecycle state machine
//
// INIT -> (buffer deltas, fetch snapshot) -> SYNCING -> (replay straddling
// delta) -> VALID; any sequence break lands in INVALID and the next delta
// restarts the cycle. Each variant carries only the fields that state needs.

use std::fmt;

use crate::core::types::DeltaBuffer;

/// Lifecycle state of one symbol slot.
#[derive(Debug)]
pub enum SlotState {
    /// Buffering deltas until the snapshot lands. No ladder has been touched.
    Init {
        buffer: DeltaBuffer,
        snapshot_requested: bool,
    },
    /// Snapshot applied; replaying deltas toward the first one that straddles
    /// snapshot_update_id + 1.
    Syncing { snapshot_update_id: u64 },
    /// Live: consecutive deltas applied directly.
    Valid { last_update_id: u64 },
    /// Sequence broken or snapshot failed; awaiting the next delta to rebuild.
    Invalid,
}

/// Fieldless view of a slot's lifecycle phase. Copyable, so the driver can
/// dispatch on it without holding a borrow of the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Syncing,
    Valid,
    Invalid,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Init => "INIT",
            Phase::Syncing => "SYNCING",
            Phase::Valid => "VALID",
            Phase::Invalid => "INVALID",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl SlotState {
    /// Fresh slot: empty buffer, snapshot not yet requested.
    pub fn new() -> Self {
        SlotState::Init {
            buffer: DeltaBuffer::new(),
            snapshot_requested: false,
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            SlotState::Init { .. } => Phase::Init,
            SlotState::Syncing { .. } => Phase::Syncing,
            SlotState::Valid { .. } => Phase::Valid,
            SlotState::Invalid => Phase::Invalid,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, SlotState::Valid { .. })
    }

    pub fn name(&self) -> &'static str {
        self.phase().label()
    }
}

impl Default for SlotState {
    fn default() -> Self {
        SlotState::new()
    }
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Why a slot was driven to INVALID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    /// Replay found a delta starting past snapshot_update_id + 1.
    SnapshotTooOld,
    /// Live delta did not continue the sequence.
    SequenceGap,
    /// The snapshot collaborator reported an error.
    SnapshotFailed,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidReason::SnapshotTooOld => write!(f, "snapshot too old"),
            InvalidReason::SequenceGap => write!(f, "sequence gap"),
            InvalidReason::SnapshotFailed => write!(f, "snapshot fetch failed"),
        }
    }
}

/// Outcome of the sequence-acceptance check for a delta range [U, u].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqDecision {
    /// Apply the delta's updates.
    Accept,
    /// Stale with respect to the snapshot; skip it and keep replaying.
    Stale,
    /// Unacceptable; invalidate for the given reason.
    Reject(InvalidReason),
}

/// The acceptance rule.
///
/// SYNCING: a delta is acceptable iff U <= snapshot_update_id + 1 <= u.
/// Anything wholly before that point is stale; a delta starting past it means
/// the snapshot is too old. VALID: only U == last_update_id + 1 is
/// acceptable; overlapping ranges are a gap like any other.
pub fn check_sequence(state: &SlotState, first_update_id: u64, final_update_id: u64) -> SeqDecision {
    match state {
        SlotState::Syncing { snapshot_update_id } => {
            let target = snapshot_update_id + 1;
            if final_update_id < target {
                SeqDecision::Stale
            } else if first_update_id > target {
                SeqDecision::Reject(InvalidReason::SnapshotTooOld)
            } else {
                SeqDecision::Accept
            }
        }
        SlotState::Valid { last_update_id } => {
            if first_update_id == last_update_id + 1 {
                SeqDecision::Accept
            } else {
                SeqDecision::Reject(InvalidReason::SequenceGap)
            }
        }
        // INIT buffers and INVALID resets before any delta is applied; the
        // driver never asks for a decision in those states.
        SlotState::Init { .. } | SlotState::Invalid => SeqDecision::Reject(InvalidReason::SequenceGap),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn syncing(snapshot_update_id: u64) -> SlotState {
        SlotState::Syncing { snapshot_update_id }
    }

    fn valid(last_update_id: u64) -> SlotState {
        SlotState::Valid { last_update_id }
    }

    #[test]
    fn test_syncing_straddle_accepted() {
        // snapshot 108, target 109: [100, 110] straddles
        assert_eq!(check_sequence(&syncing(108), 100, 110), SeqDecision::Accept);
        // exact boundaries
        assert_eq!(check_sequence(&syncing(108), 109, 109), SeqDecision::Accept);
        assert_eq!(check_sequence(&syncing(108), 100, 109), SeqDecision::Accept);
        assert_eq!(check_sequence(&syncing(108), 109, 120), SeqDecision::Accept);
    }

    #[test]
    fn test_syncing_stale_skipped() {
        // wholly before snapshot_update_id + 1
        assert_eq!(check_sequence(&syncing(108), 100, 108), SeqDecision::Stale);
        assert_eq!(check_sequence(&syncing(108), 90, 95), SeqDecision::Stale);
    }

    #[test]
    fn test_syncing_snapshot_too_old() {
        // snapshot 80, target 81: delta starts at 100
        assert_eq!(
            check_sequence(&syncing(80), 100, 110),
            SeqDecision::Reject(InvalidReason::SnapshotTooOld)
        );
        assert_eq!(
            check_sequence(&syncing(108), 110, 115),
            SeqDecision::Reject(InvalidReason::SnapshotTooOld)
        );
    }

    #[test]
    fn test_valid_consecutive_accepted() {
        assert_eq!(check_sequence(&valid(500), 501, 505), SeqDecision::Accept);
    }

    #[test]
    fn test_valid_gap_rejected() {
        assert_eq!(
            check_sequence(&valid(500), 502, 505),
            SeqDecision::Reject(InvalidReason::SequenceGap)
        );
        // overlap is a gap too
        assert_eq!(
            check_sequence(&valid(500), 500, 505),
            SeqDecision::Reject(InvalidReason::SequenceGap)
        );
        // replayed old delta is a gap in VALID
        assert_eq!(
            check_sequence(&valid(500), 490, 495),
            SeqDecision::Reject(InvalidReason::SequenceGap)
        );
    }

    #[test]
    fn test_fresh_state() {
        let state = SlotState::new();
        assert!(!state.is_valid());
        assert_eq!(state.name(), "INIT");
        match state {
            SlotState::Init {
                buffer,
                snapshot_requested,
            } => {
                assert!(buffer.is_empty());
                assert!(!snapshot_requested);
            }
            _ => panic!("fresh slot must be INIT"),
        }
    }
}
