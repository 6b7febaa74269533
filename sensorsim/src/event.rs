//! Event types and priority queue ordering for discrete event simulation.

use std::cmp::Ordering;

use sensortree::{Address, Frame, OutgoingData, Timestamp};

/// Unique sequence number for deterministic event ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Scenario actions that can be scheduled during simulation.
#[derive(Debug, Clone)]
pub enum ScenarioAction {
    /// Take a link down.
    DisableLink { a: Address, b: Address },
    /// Bring a link back up.
    EnableLink { a: Address, b: Address },
    /// Set loss rate on a link.
    SetLossRate { a: Address, b: Address, rate: f64 },
    /// Change the signal strength reported on a link.
    SetRssi { a: Address, b: Address, rssi: i8 },
    /// Take a tree snapshot for metrics.
    TakeSnapshot,
}

/// Events in the discrete event simulation.
#[derive(Debug, Clone)]
pub enum Event {
    /// Hand a frame to a node's radio.
    FrameDelivery {
        to: Address,
        from: Address,
        /// Link destination the sender used (broadcast or `to`).
        dest: Address,
        frame: Frame,
        rssi: i8,
    },
    /// Fire timer for a node.
    TimerFire { node: Address },
    /// Application on `from` sends data.
    AppSend { from: Address, data: OutgoingData },
    /// Execute a scenario action.
    ScenarioAction(ScenarioAction),
}

/// A scheduled event with timestamp and sequence number for ordering.
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    pub time: Timestamp,
    /// Tie-breaker for events at the same time.
    pub seq: SequenceNumber,
    pub event: Event,
}

impl ScheduledEvent {
    pub fn new(time: Timestamp, seq: SequenceNumber, event: Event) -> Self {
        Self { time, seq, event }
    }
}

// BinaryHeap is a max-heap; reverse so the earliest event pops first.
impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        match other.time.cmp(&self.time) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ord => ord,
        }
    }
}
