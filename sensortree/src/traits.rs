//! Seams to the outside world: link layer, time source, application.
//!
//! The node never touches a radio or timer directly. A firmware integration
//! implements [`Transport`] over its MAC layer and [`Clock`] over its timer
//! driver; the simulator implements both in memory.
//!
//! # Interrupt safety
//!
//! All channels use `CriticalSectionRawMutex`, so a radio RX interrupt may
//! call `incoming().try_send()` directly and a transmit task may drain
//! `outgoing()` while the protocol task runs.

use core::future::Future;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::time::Timestamp;
use crate::types::{Address, Event, Frame, MobileFlags, MulticastGroup, Payload, MAX_CHILDREN};

/// Queue size for transport channels. One multicast fan-out may fill it.
pub(crate) const TRANSPORT_QUEUE_SIZE: usize = MAX_CHILDREN;

/// Queue size for application-level channels.
pub(crate) const APP_QUEUE_SIZE: usize = 8;

/// Queue size for the event channel.
pub(crate) const EVENT_QUEUE_SIZE: usize = 16;

/// Mutex type used for channels.
pub(crate) type ChannelMutex = CriticalSectionRawMutex;

/// Frame received by the link layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub data: Frame,
    /// Link-layer sender (the neighbour, not necessarily the originator).
    pub src: Address,
    /// Link-layer destination, broadcast for Setup traffic.
    pub dest: Address,
    /// Signal strength in dBm, if the radio reports one.
    pub rssi: Option<i8>,
}

/// Frame handed to the link layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmission {
    pub dest: Address,
    pub frame: Frame,
}

impl Transmission {
    pub fn is_broadcast(&self) -> bool {
        self.dest.is_broadcast()
    }
}

pub type TransportInChannel = Channel<ChannelMutex, Received, TRANSPORT_QUEUE_SIZE>;
pub type TransportOutChannel = Channel<ChannelMutex, Transmission, TRANSPORT_QUEUE_SIZE>;

/// Data surfaced to the application (`app.on_data`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingData {
    pub topic: Payload,
    pub data: Payload,
    pub group: MulticastGroup,
    /// Originator of the packet.
    pub source: Address,
    pub mobile: MobileFlags,
}

/// Application send request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingData {
    pub group: MulticastGroup,
    pub up: bool,
    pub topic: Payload,
    pub data: Payload,
    /// Final destination of a down packet; broadcast (group-wide) when `None`.
    pub dest: Option<Address>,
    /// Count this send against the parent liveness threshold.
    pub want_ack: bool,
    pub mobile: MobileFlags,
}

impl OutgoingData {
    /// Acked topic/value send toward the gateway.
    pub fn up(group: MulticastGroup, topic: Payload, data: Payload) -> Self {
        Self {
            group,
            up: true,
            topic,
            data,
            dest: None,
            want_ack: true,
            mobile: MobileFlags::NotMobile,
        }
    }

    /// Unacked send down the tree.
    pub fn down(group: MulticastGroup, dest: Option<Address>, topic: Payload, data: Payload) -> Self {
        Self {
            group,
            up: false,
            topic,
            data,
            dest,
            want_ack: false,
            mobile: MobileFlags::NotMobile,
        }
    }

    pub fn with_ack(mut self, want_ack: bool) -> Self {
        self.want_ack = want_ack;
        self
    }

    pub fn with_mobile(mut self, mobile: MobileFlags) -> Self {
        self.mobile = mobile;
        self
    }
}

pub type AppInChannel = Channel<ChannelMutex, IncomingData, APP_QUEUE_SIZE>;
pub type AppOutChannel = Channel<ChannelMutex, OutgoingData, APP_QUEUE_SIZE>;
pub type EventChannel = Channel<ChannelMutex, Event, EVENT_QUEUE_SIZE>;

/// Link layer.
///
/// - Radio ISR or simulator: `incoming().try_send(received)`
/// - Node: `outgoing().try_send(transmission)`, never blocking
/// - Transmit task: `outgoing().receive().await`
///
/// ```
/// use sensortree::traits::test_impls::MockTransport;
/// use sensortree::traits::{Transmission, Transport};
/// use sensortree::{Address, Frame};
///
/// let transport = MockTransport::new();
/// let frame = Frame::from_slice(&[1, 2, 3]).unwrap();
/// transport
///     .outgoing()
///     .try_send(Transmission { dest: Address::BROADCAST, frame })
///     .unwrap();
///
/// let sent = transport.take_sent();
/// assert_eq!(sent.len(), 1);
/// assert!(sent[0].is_broadcast());
/// ```
pub trait Transport {
    fn outgoing(&self) -> &TransportOutChannel;

    fn incoming(&self) -> &TransportInChannel;

    /// Whether a frame heard at `rssi` is good enough to adopt its sender
    /// as parent. Accepts everything by default.
    fn is_acceptable_rssi(&self, rssi: Option<i8>) -> bool {
        let _ = rssi;
        true
    }
}

/// Time source.
///
/// ```
/// use sensortree::traits::test_impls::MockClock;
/// use sensortree::{Clock, Duration, Timestamp};
///
/// let clock = MockClock::new();
/// clock.advance(Duration::from_secs(8));
/// assert_eq!(clock.now(), Timestamp::from_secs(8));
/// ```
///
/// On embassy targets:
///
/// ```text
/// impl Clock for EmbassyClock {
///     type SleepFuture<'a> = embassy_time::Timer;
///
///     fn now(&self) -> Timestamp {
///         Timestamp::from_millis(embassy_time::Instant::now().as_millis())
///     }
///
///     fn sleep_until(&self, time: Timestamp) -> Self::SleepFuture<'_> {
///         embassy_time::Timer::at(embassy_time::Instant::from_millis(time.as_millis()))
///     }
/// }
/// ```
pub trait Clock {
    type SleepFuture<'a>: Future<Output = ()>
    where
        Self: 'a;

    fn now(&self) -> Timestamp;

    fn sleep_until(&self, time: Timestamp) -> Self::SleepFuture<'_>;
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_impls {
    //! In-memory transport and manual clock for unit tests and doc tests.
    //!
    //! Available when running tests or with the `test-support` feature enabled.

    use alloc::vec::Vec;
    use core::cell::Cell;
    use core::future::{ready, Ready};

    use super::*;
    use crate::time::Duration;

    /// Transport backed by two channels; tests inject and drain frames.
    pub struct MockTransport {
        outgoing: TransportOutChannel,
        incoming: TransportInChannel,
        min_rssi: Option<i8>,
    }

    impl Default for MockTransport {
        fn default() -> Self {
            Self {
                outgoing: Channel::new(),
                incoming: Channel::new(),
                min_rssi: None,
            }
        }
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Reject parents heard below `min_rssi`.
        pub fn with_min_rssi(min_rssi: i8) -> Self {
            Self {
                min_rssi: Some(min_rssi),
                ..Self::default()
            }
        }

        /// Queue a frame as if the radio had received it.
        pub fn inject_rx(&self, received: Received) {
            let _ = self.incoming.try_send(received);
        }

        /// Drain every queued transmission.
        pub fn take_sent(&self) -> Vec<Transmission> {
            let mut sent = Vec::new();
            while let Ok(t) = self.outgoing.try_receive() {
                sent.push(t);
            }
            sent
        }
    }

    impl Transport for MockTransport {
        fn outgoing(&self) -> &TransportOutChannel {
            &self.outgoing
        }

        fn incoming(&self) -> &TransportInChannel {
            &self.incoming
        }

        fn is_acceptable_rssi(&self, rssi: Option<i8>) -> bool {
            match (self.min_rssi, rssi) {
                (Some(min), Some(rssi)) => rssi >= min,
                _ => true,
            }
        }
    }

    /// Clock that only moves when told to.
    #[derive(Default)]
    pub struct MockClock {
        current: Cell<Timestamp>,
    }

    impl MockClock {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn at(time: Timestamp) -> Self {
            Self {
                current: Cell::new(time),
            }
        }

        pub fn set(&self, time: Timestamp) {
            self.current.set(time);
        }

        pub fn advance(&self, duration: Duration) {
            self.current.set(self.current.get() + duration);
        }
    }

    impl Clock for MockClock {
        type SleepFuture<'a> = Ready<()>;

        fn now(&self) -> Timestamp {
            self.current.get()
        }

        // Completes immediately; tests advance time by hand.
        fn sleep_until(&self, _time: Timestamp) -> Self::SleepFuture<'_> {
            ready(())
        }
    }
}
