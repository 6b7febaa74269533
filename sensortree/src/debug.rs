//! Debug events for protocol tracing.
//!
//! Compiled in for tests and the `debug` feature. The simulator installs an
//! emitter per node and prints or asserts on the resulting trace.

use crate::time::Timestamp;
use crate::types::{Address, MulticastGroup, NodeRole};
use crate::wire::DecodeError;

/// Emit a debug event when tracing is compiled in; otherwise the event
/// expression is never evaluated.
macro_rules! emit_debug {
    ($node:expr, $event:expr) => {
        #[cfg(any(test, feature = "debug"))]
        {
            $node.emit_debug($event);
        }
    };
}

/// Receiver of debug events, installed with `Node::set_debug_emitter`.
pub trait DebugEmitter: Send {
    fn emit(&mut self, event: DebugEvent);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugEvent {
    /// Setup broadcast while looking for a parent.
    SetupBroadcast { timestamp: Timestamp },
    /// Parent adopted; `replaced` is the previous parent if any.
    ParentAdopted {
        parent: Address,
        role: NodeRole,
        rssi: i8,
        replaced: Option<Address>,
    },
    /// Candidate heard but not adopted.
    CandidateIgnored {
        from: Address,
        role: NodeRole,
        reason: &'static str,
    },
    /// Ack threshold crossed.
    ParentLost { parent: Address, outstanding: u8 },
    ChildRegistered {
        child: Address,
        next_hop: Address,
        group: MulticastGroup,
    },
    /// A child moved; `old_next_hop` is told to drop it.
    StaleRoute { child: Address, old_next_hop: Address },
    ChildRemoved { child: Address, propagated: bool },
    DataForwardedUp { origin: Address, parent: Address },
    DataForwardedDown { dest: Address, next_hop: Address },
    DataDelivered { source: Address, topic_len: usize },
    DataDropped { reason: &'static str },
    AckSent { dest: Address, next_hop: Address },
    AckForwarded { dest: Address, next_hop: Address },
    AckReceived { outstanding: u8 },
    DecodeFailed { error: DecodeError, len: usize },
}
