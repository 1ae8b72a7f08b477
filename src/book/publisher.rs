// Change-detection publisher - per-symbol last-published cache and heartbeat
//
// Decides whether an extracted quote must go out. Edges of validity always
// publish; repeated invalid quotes never do; otherwise any ladder change or
// heartbeat-interval silence publishes.

use std::time::{Duration, Instant};

use crate::core::types::{QuoteRow, PUBLISH_TIMEOUT_MS};

pub struct QuotePublisher {
    /// None = never published for that slot.
    last_published: Vec<Option<QuoteRow>>,
    last_publish_at: Vec<Instant>,
    heartbeat: Duration,
}

impl QuotePublisher {
    pub fn new(num_symbols: usize) -> Self {
        Self::with_heartbeat(num_symbols, Duration::from_millis(PUBLISH_TIMEOUT_MS))
    }

    /// Heartbeat interval override, used by timing tests.
    pub fn with_heartbeat(num_symbols: usize, heartbeat: Duration) -> Self {
        let now = Instant::now();
        Self {
            last_published: vec![None; num_symbols],
            last_publish_at: vec![now; num_symbols],
            heartbeat,
        }
    }

    /// First matching rule wins:
    ///  1. never published          -> yes
    ///  2. validity changed         -> yes (both edges)
    ///  3. still invalid            -> no (one invalidation per edge)
    ///  4. any ladder field changed -> yes
    ///  5. heartbeat elapsed        -> yes
    ///  6. otherwise                -> no
    pub fn should_publish(&self, idx: usize, quote: &QuoteRow) -> bool {
        let last = match &self.last_published[idx] {
            Some(last) => last,
            None => return true,
        };

        if quote.is_valid != last.is_valid {
            return true;
        }
        if !quote.is_valid {
            return false;
        }
        if !quote.same_ladders_as(last) {
            return true;
        }
        self.last_publish_at[idx].elapsed() >= self.heartbeat
    }

    /// Overwrite the cache and restart the slot's heartbeat clock.
    pub fn record_publish(&mut self, idx: usize, quote: &QuoteRow) {
        self.last_published[idx] = Some(quote.clone());
        self.last_publish_at[idx] = Instant::now();
    }

    /// True when the slot has published before and has been silent for at
    /// least the heartbeat interval. The driver sweeps VALID slots with this
    /// after every inbound message.
    pub fn heartbeat_due(&self, idx: usize) -> bool {
        self.last_published[idx].is_some() && self.last_publish_at[idx].elapsed() >= self.heartbeat
    }

    /// Forget a slot's history (driver reset path keeps the cache intact on
    /// purpose - validity edges must still compare against the last actually
    /// published row - so this is only for tests).
    #[cfg(test)]
    fn clear(&mut self, idx: usize) {
        self.last_published[idx] = None;
        self.last_publish_at[idx] = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::BOOK_DEPTH;

    fn valid_quote(seq: u64, best_bid: f64) -> QuoteRow {
        let mut q = QuoteRow::invalid("BTCUSDT", 1000, 2000, seq);
        q.is_valid = true;
        q.bid_px[0] = best_bid;
        q.bid_qty[0] = 1.0;
        q.ask_px[0] = best_bid + 0.5;
        q.ask_qty[0] = 2.0;
        q
    }

    #[test]
    fn test_first_publish_always() {
        let publisher = QuotePublisher::new(1);
        assert!(publisher.should_publish(0, &valid_quote(1, 10.0)));
        assert!(publisher.should_publish(0, &QuoteRow::invalid("BTCUSDT", 0, 0, 1)));
    }

    #[test]
    fn test_validity_edges_publish() {
        let mut publisher = QuotePublisher::new(1);
        let valid = valid_quote(1, 10.0);
        publisher.record_publish(0, &valid);

        // valid -> invalid
        let invalid = QuoteRow::invalid("BTCUSDT", 0, 0, 2);
        assert!(publisher.should_publish(0, &invalid));
        publisher.record_publish(0, &invalid);

        // invalid -> invalid suppressed
        let invalid2 = QuoteRow::invalid("BTCUSDT", 0, 1, 3);
        assert!(!publisher.should_publish(0, &invalid2));

        // invalid -> valid
        assert!(publisher.should_publish(0, &valid_quote(4, 10.0)));
    }

    #[test]
    fn test_ladder_change_publishes() {
        let mut publisher = QuotePublisher::new(1);
        publisher.record_publish(0, &valid_quote(1, 10.0));

        // identical ladders, fresh clock: suppressed
        assert!(!publisher.should_publish(0, &valid_quote(2, 10.0)));

        // best bid moved
        assert!(publisher.should_publish(0, &valid_quote(3, 10.5)));

        // a deep level change counts too
        let mut deep = valid_quote(4, 10.0);
        deep.ask_qty[BOOK_DEPTH - 1] = 9.0;
        assert!(publisher.should_publish(0, &deep));
    }

    #[test]
    fn test_heartbeat_fires_after_silence() {
        let mut publisher = QuotePublisher::with_heartbeat(1, Duration::from_millis(20));
        publisher.record_publish(0, &valid_quote(1, 10.0));

        assert!(!publisher.heartbeat_due(0));
        assert!(!publisher.should_publish(0, &valid_quote(2, 10.0)));

        std::thread::sleep(Duration::from_millis(30));

        assert!(publisher.heartbeat_due(0));
        // rule 5: unchanged quote publishes once the interval has passed
        assert!(publisher.should_publish(0, &valid_quote(3, 10.0)));

        publisher.record_publish(0, &valid_quote(3, 10.0));
        assert!(!publisher.heartbeat_due(0));
    }

    #[test]
    fn test_heartbeat_requires_prior_publish() {
        let publisher = QuotePublisher::with_heartbeat(1, Duration::from_millis(0));
        assert!(!publisher.heartbeat_due(0));
    }

    #[test]
    fn test_slots_are_independent() {
        let mut publisher = QuotePublisher::new(2);
        publisher.record_publish(0, &valid_quote(1, 10.0));

        assert!(!publisher.should_publish(0, &valid_quote(2, 10.0)));
        // slot 1 never published
        assert!(publisher.should_publish(1, &valid_quote(2, 10.0)));

        publisher.clear(0);
        assert!(publisher.should_publish(0, &valid_quote(3, 10.0)));
    }
}
