//! Node implementation - the per-node protocol state machine.
//!
//! A `Node` owns everything one radio needs: its identity, parent, child
//! directory and ack counter, plus the channels to the application. Nothing
//! is global, so a simulator can run hundreds of nodes in one process.
//!
//! The node is driven by two named inputs:
//! - [`Input::PacketIn`]: a frame from the link layer
//! - [`Input::Tick`]: the timer fired (setup retry, keepalive)
//!
//! plus application sends ([`Node::send_data`]). Every handler runs to
//! completion and never blocks; transmissions are queued on the transport.
//!
//! # Usage
//!
//! ```ignore
//! let mut node = Node::<_, _, DefaultConfig>::new(transport, clock, identity);
//!
//! spawn(async move {
//!     node.run().await;
//! });
//!
//! node.outgoing().send(OutgoingData::up(group, topic, value)).await;
//! let reading = node.incoming().receive().await;
//! ```

#[cfg(any(test, feature = "debug"))]
use alloc::boxed::Box;
use core::marker::PhantomData;

use embassy_sync::channel::Channel;

use crate::children::ChildDirectory;
use crate::config::{DefaultConfig, NodeConfig};
use crate::liveness::AckTracker;
use crate::time::Timestamp;
use crate::traits::{
    AppInChannel, AppOutChannel, Clock, EventChannel, IncomingData, Received,
    Transmission, Transport,
};
use crate::types::{
    Address, Error, Event, Frame, Identity, MulticastGroup, NodeRole, Parent, TransportMetrics,
    TreeState,
};
use crate::wire::{ControlMessage, ControlPacket, DecodeError, EnvelopeHeader};

/// Named inputs of the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Timer expiry; the node checks setup retry and keepalive deadlines.
    Tick,
    /// Frame delivered by the link layer.
    PacketIn(Received),
}

/// The protocol node.
///
/// Generic over:
/// - `T`: link layer
/// - `Clk`: time source
/// - `Cfg`: timing parameters
pub struct Node<T, Clk, Cfg = DefaultConfig> {
    // Dependencies (injected)
    transport: T,
    clock: Clk,

    // Application-level channels
    app_incoming: AppInChannel,
    app_outgoing: AppOutChannel,
    events: EventChannel,

    identity: Identity,

    // Tree position
    parent: Option<Parent>,
    children: ChildDirectory,
    acks: AckTracker,

    // Scheduling
    next_setup: Option<Timestamp>,
    next_keepalive: Option<Timestamp>,

    metrics: TransportMetrics,

    #[cfg(any(test, feature = "debug"))]
    debug_emitter: Option<Box<dyn crate::debug::DebugEmitter>>,

    _config: PhantomData<Cfg>,
}

impl<T, Clk, Cfg> Node<T, Clk, Cfg>
where
    T: Transport,
    Clk: Clock,
    Cfg: NodeConfig,
{
    pub fn new(transport: T, clock: Clk, identity: Identity) -> Self {
        Self {
            transport,
            clock,
            app_incoming: Channel::new(),
            app_outgoing: Channel::new(),
            events: Channel::new(),
            identity,
            parent: None,
            children: ChildDirectory::new(),
            acks: AckTracker::new(Cfg::ACK_THRESHOLD),
            next_setup: None,
            next_keepalive: None,
            metrics: TransportMetrics::default(),
            #[cfg(any(test, feature = "debug"))]
            debug_emitter: None,
            _config: PhantomData,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn address(&self) -> Address {
        self.identity.address
    }

    pub fn role(&self) -> NodeRole {
        self.identity.role
    }

    pub fn group(&self) -> MulticastGroup {
        self.identity.group
    }

    pub fn parent(&self) -> Option<&Parent> {
        self.parent.as_ref()
    }

    /// The gateway is always attached: it is the root.
    pub fn is_attached(&self) -> bool {
        self.role().is_root() || self.parent.is_some()
    }

    pub fn state(&self) -> TreeState {
        if self.is_attached() {
            TreeState::Attached
        } else if self.next_setup.is_some() {
            TreeState::SettingUp
        } else {
            TreeState::Unset
        }
    }

    pub fn children(&self) -> &ChildDirectory {
        &self.children
    }

    /// Acked sends still waiting for a `DataAck`.
    pub fn outstanding_acks(&self) -> u8 {
        self.acks.outstanding()
    }

    pub fn metrics(&self) -> &TransportMetrics {
        &self.metrics
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn clock(&self) -> &Clk {
        &self.clock
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Data delivered to this node's application.
    pub fn incoming(&self) -> &AppInChannel {
        &self.app_incoming
    }

    /// Application sends consumed by [`run`](Self::run).
    pub fn outgoing(&self) -> &AppOutChannel {
        &self.app_outgoing
    }

    pub fn events(&self) -> &EventChannel {
        &self.events
    }

    #[cfg(any(test, feature = "debug"))]
    pub fn set_debug_emitter(&mut self, emitter: Box<dyn crate::debug::DebugEmitter>) {
        self.debug_emitter = Some(emitter);
    }

    #[cfg(any(test, feature = "debug"))]
    pub(crate) fn emit_debug(&mut self, event: crate::debug::DebugEvent) {
        if let Some(emitter) = self.debug_emitter.as_mut() {
            emitter.emit(event);
        }
    }

    /// First action after boot: the gateway announces itself once, every
    /// other role starts looking for a parent.
    pub fn start(&mut self) {
        let now = self.clock.now();
        if self.role().is_root() {
            log::info!("[{}] gateway up, announcing", self.address());
            if let Err(e) = self.send_control(Address::BROADCAST, ControlMessage::Setup) {
                log::debug!("[{}] announce failed: {}", self.address(), e);
            }
        } else {
            self.broadcast_setup(now);
        }
    }

    /// Feed one input through the state machine.
    pub fn handle(&mut self, input: Input) {
        match input {
            Input::Tick => {
                let now = self.clock.now();
                self.handle_timer(now);
            }
            Input::PacketIn(rx) => {
                self.on_packet_received(&rx.data, rx.src, rx.dest, rx.rssi);
            }
        }
    }

    /// Run the node's main loop forever.
    ///
    /// Multiplexes received frames, application sends and the timer. Call
    /// from an async task/executor.
    pub async fn run(&mut self) -> ! {
        use embassy_futures::select::{select3, Either3};

        self.start();

        loop {
            let wake = self.next_wake();

            let result = select3(
                self.transport.incoming().receive(),
                self.app_outgoing.receive(),
                self.clock.sleep_until(wake),
            )
            .await;

            match result {
                Either3::First(rx) => self.handle(Input::PacketIn(rx)),
                Either3::Second(data) => {
                    if let Err(e) = self.send_data(data) {
                        log::debug!("[{}] application send failed: {}", self.address(), e);
                    }
                }
                Either3::Third(()) => self.handle(Input::Tick),
            }
        }
    }

    /// When the timer should next fire.
    pub fn next_wake(&self) -> Timestamp {
        let now = self.clock.now();
        let idle = now + Cfg::IDLE_WAKE;
        if self.role().is_root() {
            return idle;
        }
        let due = match self.parent {
            None => self.next_setup.unwrap_or(now),
            Some(_) => self.next_keepalive.unwrap_or(idle),
        };
        due.min(idle)
    }

    /// Timer work: retry setup while detached, keepalive while attached.
    pub(crate) fn handle_timer(&mut self, now: Timestamp) {
        if self.role().is_root() {
            return;
        }

        if self.parent.is_none() {
            if self.next_setup.map_or(true, |due| now >= due) {
                self.broadcast_setup(now);
            }
            return;
        }

        if let Some(due) = self.next_keepalive {
            if now >= due {
                // Rescheduled first: a lost parent clears it again.
                self.next_keepalive = Some(now + Cfg::KEEPALIVE_INTERVAL);
                if let Err(e) = self.send_keepalive() {
                    log::debug!("[{}] keepalive not sent: {}", self.address(), e);
                }
            }
        }
    }

    // --- Transmission helpers ---

    /// Queue a frame on the link layer.
    pub(crate) fn transmit(&mut self, dest: Address, frame: Frame) -> Result<(), Error> {
        match self
            .transport
            .outgoing()
            .try_send(Transmission { dest, frame })
        {
            Ok(()) => Ok(()),
            Err(_) => {
                self.metrics.dropped += 1;
                log::debug!("[{}] transport queue full, dropping frame to {}", self.address(), dest);
                Err(Error::QueueFull)
            }
        }
    }

    /// Build and queue a control packet from this node.
    pub(crate) fn send_control(
        &mut self,
        dest: Address,
        message: ControlMessage,
    ) -> Result<(), Error> {
        let packet = ControlPacket::new(self.role(), message);
        let frame = EnvelopeHeader::new(self.address(), dest).wrap(&packet)?;
        self.transmit(dest, frame)?;
        self.metrics.control_sent += 1;
        Ok(())
    }

    pub(crate) fn push_event(&mut self, event: Event) {
        let _ = self.events.try_send(event);
    }

    pub(crate) fn push_incoming(&mut self, data: IncomingData) {
        if self.app_incoming.try_send(data).is_err() {
            log::warn!("[{}] application queue full, dropping data", self.address());
        }
    }

    pub(crate) fn record_decode_error(&mut self, error: DecodeError, len: usize) {
        self.metrics.decode_errors += 1;
        log::debug!("[{}] dropping {}-byte frame: {}", self.address(), len, error);
        emit_debug!(self, crate::debug::DebugEvent::DecodeFailed { error, len });
    }

    // --- State accessors for tree/routing ---

    pub(crate) fn set_parent(&mut self, parent: Option<Parent>) {
        self.parent = parent;
    }

    pub(crate) fn children_mut(&mut self) -> &mut ChildDirectory {
        &mut self.children
    }

    pub(crate) fn acks_mut(&mut self) -> &mut AckTracker {
        &mut self.acks
    }

    pub(crate) fn set_next_setup(&mut self, time: Option<Timestamp>) {
        self.next_setup = time;
    }

    pub(crate) fn set_next_keepalive(&mut self, time: Option<Timestamp>) {
        self.next_keepalive = time;
    }

    pub(crate) fn metrics_mut(&mut self) -> &mut TransportMetrics {
        &mut self.metrics
    }
}
