//! Request sequencing
//!
//! Requests may overlap when the provider is slower than the poll interval.
//! Each request gets a number when it is issued; a completion is applied only
//! if its number is newer than the last applied one, so a slow response that
//! lands after a fresher one is discarded.

/// Monotonic request counter with "freshest completion wins" semantics
#[derive(Debug, Default, Clone)]
pub struct PollSequencer {
    /// Last sequence number handed out
    issued: u64,
    /// Sequence number of the last applied completion (0 = none)
    applied: u64,
    /// Set on teardown; every later completion is stale
    closed: bool,
}

impl PollSequencer {
    /// Create a new sequencer
    pub fn new() -> Self {
        Self::default()
    }

    /// Number the next request
    pub fn issue(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    /// Check whether a completion must be discarded
    pub fn is_stale(&self, seq: u64) -> bool {
        self.closed || seq <= self.applied || seq > self.issued
    }

    /// Record a completion as applied; returns `false` if it is stale
    pub fn accept(&mut self, seq: u64) -> bool {
        if self.is_stale(seq) {
            return false;
        }
        self.applied = seq;
        true
    }

    /// Reject everything from now on
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Check if the sequencer was closed
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Last sequence number handed out
    pub fn latest_issued(&self) -> u64 {
        self.issued
    }

    /// Sequence number of the last applied completion
    pub fn last_applied(&self) -> u64 {
        self.applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_order_completions() {
        let mut seq = PollSequencer::new();
        let a = seq.issue();
        let b = seq.issue();
        assert!(seq.accept(a));
        assert!(seq.accept(b));
        assert_eq!(seq.last_applied(), b);
    }

    #[test]
    fn test_slow_older_completion_is_stale() {
        let mut seq = PollSequencer::new();
        let slow = seq.issue();
        let fast = seq.issue();

        assert!(seq.accept(fast));
        assert!(seq.is_stale(slow));
        assert!(!seq.accept(slow));
        assert_eq!(seq.last_applied(), fast);
    }

    #[test]
    fn test_duplicate_and_unknown_are_stale() {
        let mut seq = PollSequencer::new();
        let a = seq.issue();
        assert!(seq.accept(a));
        assert!(!seq.accept(a));
        assert!(seq.is_stale(a + 5));
    }

    #[test]
    fn test_closed_rejects_everything() {
        let mut seq = PollSequencer::new();
        let a = seq.issue();
        seq.close();
        assert!(seq.is_closed());
        assert!(!seq.accept(a));
        assert_eq!(seq.last_applied(), 0);
    }
}
