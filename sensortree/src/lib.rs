#![forbid(unsafe_code)]
//! sensortree - Tree routing and framing for multi-role wireless sensor networks
//!
//! One gateway at the root, sub-gateways as relays, sensor and actuator
//! nodes as leaves, mobile nodes that attach anywhere and never relay. This
//! crate is the per-node engine: it forms the tree, keeps a directory of
//! every descendant, routes data up to the gateway and down to single nodes
//! or multicast groups, and detects a dead parent link through missing acks.
//!
//! This crate is `no_std`. Frames, payloads and the child directory are
//! fixed-capacity `heapless` buffers; `alloc` is only used by the debug
//! tracing hook and the test helpers.
//!
//! # Key Properties
//!
//! - Every frame is an envelope (`src`, `dest`) around one packet of at most
//!   [`MAX_FRAME_SIZE`] bytes
//! - Parents are chosen by role first, signal strength second
//! - A descendant is stored once per ancestor, with the neighbour it is
//!   reached through
//! - Multicast fans out to each distinct next hop serving a group
//! - No retransmission: a parent that stops acking is abandoned
//!
//! # Example (basic usage)
//!
//! ```
//! use sensortree::traits::test_impls::{MockClock, MockTransport};
//! use sensortree::{Address, DefaultConfig, Identity, MulticastGroup, Node, NodeRole, TreeState};
//!
//! let identity = Identity::new(
//!     Address::from_short(3),
//!     NodeRole::Node,
//!     MulticastGroup::LIGHT_BULB,
//! );
//! let mut node = Node::<_, _, DefaultConfig>::new(MockTransport::new(), MockClock::new(), identity);
//! assert_eq!(node.state(), TreeState::Unset);
//!
//! node.start();
//! assert_eq!(node.state(), TreeState::SettingUp);
//! assert!(node.transport().take_sent()[0].is_broadcast());
//! ```
//!
//! # Example (integration pattern)
//!
//! ```text
//! use sensortree::{Node, Transport, Clock, OutgoingData};
//!
//! // Implement Transport over the radio and Clock over the timer...
//!
//! // let mut node = Node::new(transport, clock, identity);
//!
//! // spawn(async move {
//! //     node.run().await;
//! // });
//!
//! // node.outgoing().send(OutgoingData::up(group, topic, value)).await;
//! // let command = node.incoming().receive().await;
//! ```
//!
//! # Module Structure
//!
//! - [`types`] - Addresses, roles, groups, tree entries, errors
//! - [`wire`] - Envelope, control and data packet encoding
//! - [`traits`] - Transport and Clock seams, application channels
//! - [`node`] - Node struct, inputs, run loop
//! - [`tree`] - Setup, parent selection, child registration
//! - [`routing`] - Packet dispatch, forwarding, acks, sends
//! - [`children`] - Child directory and multicast next hops
//! - [`liveness`] - Outstanding-ack counter
//! - [`time`] - Timestamp and Duration types
//! - [`config`] - Timing configuration

#![no_std]

// Prevent test/debug features from being used in release builds.
#[cfg(all(feature = "test-support", not(test), not(debug_assertions)))]
compile_error!(
    "The `test-support` feature must not be enabled in release builds. \
     It includes an in-memory transport and a manual clock."
);

#[cfg(all(feature = "debug", not(test), not(debug_assertions)))]
compile_error!(
    "The `debug` feature must not be enabled in release builds. \
     It adds protocol tracing overhead intended only for development and simulation."
);

extern crate alloc;

pub mod children;
pub mod config;
#[macro_use]
pub mod debug;
pub mod liveness;
pub mod node;
pub mod routing;
pub mod time;
pub mod traits;
pub mod tree;
pub mod types;
pub mod wire;

// Re-export main types at crate root
pub use children::{ChildDirectory, Registration, Removal};
pub use config::{DefaultConfig, FastConfig, NodeConfig};
pub use node::{Input, Node};
pub use time::{Duration, Timestamp};
pub use traits::{Clock, IncomingData, OutgoingData, Received, Transmission, Transport};
pub use types::{
    Address, Child, ControlKind, Error, Event, Frame, Identity, MobileFlags, MulticastGroup,
    NodeRole, Parent, Payload, TransportMetrics, TreeState,
};
pub use wire::{
    ControlMessage, ControlPacket, DataPacket, Decode, DecodeError, Encode, EncodeError,
    EnvelopeHeader, Packet,
};

// Re-export constants
pub use types::{
    DATA_HEADER_LEN, ENVELOPE_LEN, KEEPALIVE_TOPIC, MAX_CHILDREN, MAX_FRAME_SIZE, MAX_PAYLOAD,
};
