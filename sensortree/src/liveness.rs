//! Parent-link liveness.
//!
//! The only failure detector in the protocol: every acked send toward the
//! parent bumps a counter, every `DataAck` naming this node lowers it, and a
//! send that pushes it past the threshold declares the parent lost. Data is
//! never retransmitted; the node re-enters setup instead.

/// Verdict for an acked send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Healthy,
    /// Threshold crossed; the caller must drop its parent.
    ParentLost,
}

/// Outstanding-ack counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckTracker {
    outstanding: u8,
    threshold: u8,
}

impl AckTracker {
    pub const fn new(threshold: u8) -> Self {
        Self {
            outstanding: 0,
            threshold,
        }
    }

    pub fn outstanding(&self) -> u8 {
        self.outstanding
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Count one acked send.
    pub fn record_send(&mut self) -> Liveness {
        self.outstanding = self.outstanding.saturating_add(1);
        if self.outstanding > self.threshold {
            Liveness::ParentLost
        } else {
            Liveness::Healthy
        }
    }

    /// Take back a send that never reached the link.
    pub fn cancel_send(&mut self) {
        self.outstanding = self.outstanding.saturating_sub(1);
    }

    /// Count one ack addressed to this node. Returns false for an ack nothing was waiting on.
    pub fn record_ack(&mut self) -> bool {
        if self.outstanding == 0 {
            return false;
        }
        self.outstanding -= 1;
        true
    }

    /// Forget all outstanding sends (new parent or parent lost).
    pub fn reset(&mut self) {
        self.outstanding = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_then_ack_returns_to_zero() {
        let mut tracker = AckTracker::new(1);
        assert_eq!(tracker.record_send(), Liveness::Healthy);
        assert_eq!(tracker.outstanding(), 1);
        assert!(tracker.record_ack());
        assert_eq!(tracker.outstanding(), 0);
    }

    #[test]
    fn test_second_unacked_send_crosses_threshold() {
        let mut tracker = AckTracker::new(1);
        tracker.record_send();
        assert_eq!(tracker.record_send(), Liveness::ParentLost);
    }

    #[test]
    fn test_cancelled_send_does_not_count() {
        let mut tracker = AckTracker::new(1);
        tracker.record_send();
        tracker.cancel_send();
        assert_eq!(tracker.outstanding(), 0);
        assert_eq!(tracker.record_send(), Liveness::Healthy);
        tracker.cancel_send();
        tracker.cancel_send();
        assert_eq!(tracker.outstanding(), 0);
    }

    #[test]
    fn test_spurious_ack_does_not_underflow() {
        let mut tracker = AckTracker::new(1);
        assert!(!tracker.record_ack());
        assert_eq!(tracker.outstanding(), 0);
        assert_eq!(tracker.record_send(), Liveness::Healthy);
    }

    #[test]
    fn test_higher_threshold_tolerates_more() {
        let mut tracker = AckTracker::new(3);
        for _ in 0..3 {
            assert_eq!(tracker.record_send(), Liveness::Healthy);
        }
        assert_eq!(tracker.record_send(), Liveness::ParentLost);
        tracker.reset();
        assert_eq!(tracker.outstanding(), 0);
    }
}
