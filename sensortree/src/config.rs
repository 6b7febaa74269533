//! Compile-time protocol timing.
//!
//! The `NodeConfig` trait fixes the timers and the liveness threshold for a
//! build. `DefaultConfig` matches deployed motes; `FastConfig` shortens every
//! interval so simulations converge in a few virtual seconds.
//!
//! ```ignore
//! use sensortree::{Node, FastConfig};
//!
//! let node = Node::<_, _, FastConfig>::new(transport, clock, identity);
//! ```
//!
//! Capacities (child table, frame size) are protocol limits rather than
//! tuning knobs and live in [`types`](crate::types).

use crate::time::Duration;

/// Timing and liveness parameters.
pub trait NodeConfig {
    /// Delay between Setup broadcasts while no parent is known.
    const SETUP_RETRY_INTERVAL: Duration;

    /// Interval between keepalive sends while attached.
    const KEEPALIVE_INTERVAL: Duration;

    /// Outstanding acked sends tolerated before the parent is declared lost.
    const ACK_THRESHOLD: u8;

    /// Wake-up interval when no timer is pending.
    const IDLE_WAKE: Duration;
}

/// Deployment timing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConfig;

impl NodeConfig for DefaultConfig {
    const SETUP_RETRY_INTERVAL: Duration = Duration::from_secs(8);
    const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
    const ACK_THRESHOLD: u8 = 1;
    const IDLE_WAKE: Duration = Duration::from_secs(60);
}

/// Shortened timing for simulation and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct FastConfig;

impl NodeConfig for FastConfig {
    const SETUP_RETRY_INTERVAL: Duration = Duration::from_millis(800);
    const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(3);
    const ACK_THRESHOLD: u8 = 1;
    const IDLE_WAKE: Duration = Duration::from_secs(6);
}
