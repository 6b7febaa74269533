//! SimNode wrapper for simulated sensortree nodes.

use std::cell::Cell;
use std::future::{ready, Ready};
use std::sync::{Arc, Mutex};

use embassy_sync::channel::Channel;
use sensortree::config::FastConfig;
use sensortree::debug::{DebugEmitter, DebugEvent};
use sensortree::traits::{TransportInChannel, TransportOutChannel};
use sensortree::{
    Address, Clock, Error, Event, Frame, Identity, IncomingData, Input, MulticastGroup,
    Node, NodeRole, OutgoingData, Parent, Received, Timestamp, Transmission, Transport, TreeState,
};

/// Transport whose queues the simulator drains and fills directly.
pub struct SimTransport {
    outgoing: TransportOutChannel,
    incoming: TransportInChannel,
    min_rssi: Option<i8>,
}

impl SimTransport {
    pub fn new() -> Self {
        Self {
            outgoing: Channel::new(),
            incoming: Channel::new(),
            min_rssi: None,
        }
    }

    /// Refuse parents heard below `min_rssi`.
    pub fn with_min_rssi(mut self, min_rssi: i8) -> Self {
        self.min_rssi = Some(min_rssi);
        self
    }

    pub fn take_sent(&self) -> Vec<Transmission> {
        let mut sent = Vec::new();
        while let Ok(t) = self.outgoing.try_receive() {
            sent.push(t);
        }
        sent
    }
}

impl Default for SimTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SimTransport {
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

/// Clock set by the simulator before every handler call.
pub struct SimClock {
    current: Cell<Timestamp>,
}

impl SimClock {
    pub fn at(time: Timestamp) -> Self {
        Self {
            current: Cell::new(time),
        }
    }

    pub fn set(&self, time: Timestamp) {
        self.current.set(time);
    }
}

impl Clock for SimClock {
    type SleepFuture<'a> = Ready<()>;

    fn now(&self) -> Timestamp {
        self.current.get()
    }

    fn sleep_until(&self, _time: Timestamp) -> Self::SleepFuture<'_> {
        ready(())
    }
}

/// Collects debug events into a shared buffer.
struct SharedEmitter(Arc<Mutex<Vec<DebugEvent>>>);

impl DebugEmitter for SharedEmitter {
    fn emit(&mut self, event: DebugEvent) {
        if let Ok(mut events) = self.0.lock() {
            events.push(event);
        }
    }
}

pub type SimNodeInner = Node<SimTransport, SimClock, FastConfig>;

/// A sensortree node plus the logs the simulator keeps for it.
pub struct SimNode {
    inner: SimNodeInner,
    pub created_at: Timestamp,
    /// Data handed to this node's application, in arrival order.
    delivered: Vec<IncomingData>,
    events: Vec<Event>,
    debug: Arc<Mutex<Vec<DebugEvent>>>,
}

impl SimNode {
    pub fn new(identity: Identity, created_at: Timestamp) -> Self {
        Self::with_transport(identity, SimTransport::new(), created_at)
    }

    pub fn with_transport(identity: Identity, transport: SimTransport, created_at: Timestamp) -> Self {
        let mut inner = Node::new(transport, SimClock::at(created_at), identity);
        let debug = Arc::new(Mutex::new(Vec::new()));
        inner.set_debug_emitter(Box::new(SharedEmitter(Arc::clone(&debug))));
        Self {
            inner,
            created_at,
            delivered: Vec::new(),
            events: Vec::new(),
            debug,
        }
    }

    pub fn address(&self) -> Address {
        self.inner.address()
    }

    pub fn role(&self) -> NodeRole {
        self.inner.role()
    }

    pub fn group(&self) -> MulticastGroup {
        self.inner.group()
    }

    pub fn inner(&self) -> &SimNodeInner {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut SimNodeInner {
        &mut self.inner
    }

    pub fn is_attached(&self) -> bool {
        self.inner.is_attached()
    }

    pub fn state(&self) -> TreeState {
        self.inner.state()
    }

    pub fn parent(&self) -> Option<Parent> {
        self.inner.parent().copied()
    }

    pub fn parent_id(&self) -> Option<Address> {
        self.inner.parent().map(|p| p.address)
    }

    pub fn children_count(&self) -> usize {
        self.inner.children().len()
    }

    pub fn next_hop_for(&self, child: &Address) -> Option<Address> {
        self.inner.children().resolve_next_hop(child)
    }

    pub fn next_wake(&self) -> Timestamp {
        self.inner.next_wake()
    }

    pub fn start(&mut self, now: Timestamp) {
        self.inner.clock().set(now);
        self.inner.start();
        self.drain_queues();
    }

    /// Hand a frame to the node as if its radio received it.
    pub fn handle_frame(&mut self, frame: Frame, from: Address, dest: Address, rssi: i8, now: Timestamp) {
        self.inner.clock().set(now);
        self.inner.handle(Input::PacketIn(Received {
            data: frame,
            src: from,
            dest,
            rssi: Some(rssi),
        }));
        self.drain_queues();
    }

    pub fn handle_timer(&mut self, now: Timestamp) {
        self.inner.clock().set(now);
        self.inner.handle(Input::Tick);
        self.drain_queues();
    }

    pub fn app_send(&mut self, data: OutgoingData, now: Timestamp) -> Result<(), Error> {
        self.inner.clock().set(now);
        let result = self.inner.send_data(data);
        self.drain_queues();
        result
    }

    /// Take every frame the node queued since the last call.
    pub fn take_outgoing(&self) -> Vec<Transmission> {
        self.inner.transport().take_sent()
    }

    pub fn delivered(&self) -> &[IncomingData] {
        &self.delivered
    }

    pub fn take_delivered(&mut self) -> Vec<IncomingData> {
        std::mem::take(&mut self.delivered)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn take_debug_events(&self) -> Vec<DebugEvent> {
        self.debug
            .lock()
            .map(|mut events| std::mem::take(&mut *events))
            .unwrap_or_default()
    }

    // The node's application channels are small; keep them empty.
    fn drain_queues(&mut self) {
        while let Ok(data) = self.inner.incoming().try_receive() {
            self.delivered.push(data);
        }
        while let Ok(event) = self.inner.events().try_receive() {
            self.events.push(event);
        }
    }
}
