//! sensorsim - Discrete event network simulator for sensortree.
//!
//! Runs whole sensor networks (gateway, sub-gateways, leaves, mobiles) in
//! one process without real-time delays, so tree formation, routing and
//! recovery can be tested deterministically.
//!
//! # Features
//!
//! - **Discrete event simulation**: no real-time delays, deterministic ordering
//! - **Radio model**: broadcasts reach every neighbour, unicasts only their destination
//! - **Link properties**: RSSI, frame loss, delay per link
//! - **Scenario builder**: farm layouts with scheduled link failures and sends
//! - **Metrics**: tree snapshots, frame counts, convergence time
//!
//! # Example
//!
//! ```
//! use sensorsim::{Duration, ScenarioBuilder};
//!
//! let result = ScenarioBuilder::farm(2, 3)
//!     .with_seed(42)
//!     .run_for(Duration::from_secs(5));
//!
//! assert!(result.converged());
//! ```
//!
//! # Architecture
//!
//! The simulator pops events ordered by (time, sequence number), sets the
//! target node's clock, and calls its handlers directly instead of the async
//! `Node::run` loop. After every handler it routes the frames the node
//! queued and re-arms the node's timer at `Node::next_wake`.

pub mod event;
pub mod metrics;
pub mod node;
pub mod scenario;
pub mod sim;
pub mod topology;

// Re-export main types
pub use event::{Event, ScenarioAction, ScheduledEvent};
pub use metrics::{SimMetrics, SimulationResult, TreeSnapshot};
pub use node::SimNode;
pub use scenario::{FarmLayout, ScenarioBuilder};
pub use sensortree::{Address, Duration, Timestamp};
pub use sim::Simulator;
pub use topology::{Link, Topology};
