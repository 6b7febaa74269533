//! Discrete event simulator for sensortree networks.

use std::collections::BinaryHeap;

use hashbrown::HashMap;
use sensortree::{Address, Duration, Frame, Identity, OutgoingData, Timestamp, Transmission};

use crate::event::{Event, ScenarioAction, ScheduledEvent, SequenceNumber};
use crate::metrics::{SimMetrics, SimulationResult, TreeSnapshot};
use crate::node::{SimNode, SimTransport};
use crate::topology::Topology;

/// Shortest gap between two timer firings of one node.
const MIN_TIMER_STEP: Duration = Duration::from_millis(1);

pub struct Simulator {
    nodes: HashMap<Address, SimNode>,
    topology: Topology,
    current_time: Timestamp,
    event_queue: BinaryHeap<ScheduledEvent>,
    metrics: SimMetrics,
    next_seq: u64,
    /// RNG state for frame loss.
    rng_state: u64,
    /// Pending timer per node; older timer events are stale.
    timers: HashMap<Address, Timestamp>,
    snapshot_interval: Option<Duration>,
    next_snapshot: Option<Timestamp>,
}

impl Simulator {
    /// Create a new simulator with given RNG seed.
    pub fn new(seed: u64) -> Self {
        Self {
            nodes: HashMap::new(),
            topology: Topology::new(),
            current_time: Timestamp::ZERO,
            event_queue: BinaryHeap::new(),
            metrics: SimMetrics::new(),
            next_seq: 0,
            rng_state: seed,
            timers: HashMap::new(),
            snapshot_interval: None,
            next_snapshot: None,
        }
    }

    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = Some(interval);
        self.next_snapshot = Some(self.current_time + interval);
        self
    }

    /// Add and start a node.
    pub fn add_node(&mut self, identity: Identity) -> Address {
        self.add_sim_node(SimNode::new(identity, self.current_time))
    }

    /// Add and start a node that refuses parents heard below `min_rssi`.
    pub fn add_node_with_min_rssi(&mut self, identity: Identity, min_rssi: i8) -> Address {
        let transport = SimTransport::new().with_min_rssi(min_rssi);
        self.add_sim_node(SimNode::with_transport(identity, transport, self.current_time))
    }

    fn add_sim_node(&mut self, mut node: SimNode) -> Address {
        let address = node.address();
        node.start(self.current_time);
        self.nodes.insert(address, node);
        self.after_handler(address);
        address
    }

    pub fn node(&self, address: &Address) -> Option<&SimNode> {
        self.nodes.get(address)
    }

    pub fn node_mut(&mut self, address: &Address) -> Option<&mut SimNode> {
        self.nodes.get_mut(address)
    }

    /// All node addresses, sorted.
    pub fn node_ids(&self) -> Vec<Address> {
        let mut ids: Vec<Address> = self.nodes.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn current_time(&self) -> Timestamp {
        self.current_time
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn topology_mut(&mut self) -> &mut Topology {
        &mut self.topology
    }

    pub fn metrics(&self) -> &SimMetrics {
        &self.metrics
    }

    pub fn schedule(&mut self, time: Timestamp, event: Event) {
        let seq = SequenceNumber::new(self.next_seq);
        self.next_seq += 1;
        self.event_queue.push(ScheduledEvent::new(time, seq, event));
    }

    pub fn schedule_action(&mut self, time: Timestamp, action: ScenarioAction) {
        self.schedule(time, Event::ScenarioAction(action));
    }

    /// Schedule an application send on `from`.
    pub fn schedule_send(&mut self, time: Timestamp, from: Address, data: OutgoingData) {
        self.schedule(time, Event::AppSend { from, data });
    }

    pub fn run_until(&mut self, end_time: Timestamp) -> SimulationResult {
        while let Some(event) = self.event_queue.peek() {
            if event.time > end_time {
                break;
            }
            let Some(event) = self.event_queue.pop() else {
                break;
            };
            self.advance_time(event.time);
            self.process_event(event.event);
            self.maybe_take_snapshot();
        }

        self.advance_time(end_time);
        self.take_snapshot();

        SimulationResult {
            end_time: self.current_time,
            metrics: self.metrics.clone(),
            queue_exhausted: self.event_queue.is_empty(),
        }
    }

    pub fn run_for(&mut self, duration: Duration) -> SimulationResult {
        self.run_until(self.current_time + duration)
    }

    fn advance_time(&mut self, time: Timestamp) {
        if time > self.current_time {
            self.current_time = time;
        }
    }

    fn process_event(&mut self, event: Event) {
        match event {
            Event::FrameDelivery {
                to,
                from,
                dest,
                frame,
                rssi,
            } => self.deliver_frame(to, from, dest, frame, rssi),
            Event::TimerFire { node } => self.fire_timer(node),
            Event::AppSend { from, data } => self.app_send(from, data),
            Event::ScenarioAction(action) => self.execute_action(action),
        }
    }

    fn deliver_frame(&mut self, to: Address, from: Address, dest: Address, frame: Frame, rssi: i8) {
        let now = self.current_time;
        if let Some(node) = self.nodes.get_mut(&to) {
            node.handle_frame(frame, from, dest, rssi, now);
            self.metrics.frames_delivered += 1;
        }
        self.after_handler(to);
    }

    fn fire_timer(&mut self, node_id: Address) {
        let now = self.current_time;
        if self.timers.get(&node_id) != Some(&now) {
            return;
        }
        self.timers.remove(&node_id);
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.handle_timer(now);
        }
        self.after_handler(node_id);
    }

    fn app_send(&mut self, from: Address, data: OutgoingData) {
        let now = self.current_time;
        if let Some(node) = self.nodes.get_mut(&from) {
            if let Err(e) = node.app_send(data, now) {
                log::debug!("[{}] application send failed: {}", from, e);
                self.metrics.send_failures += 1;
            }
        }
        self.after_handler(from);
    }

    /// Route what a node queued and re-arm its timer.
    fn after_handler(&mut self, node_id: Address) {
        let (transmissions, wake) = match self.nodes.get(&node_id) {
            Some(node) => (node.take_outgoing(), node.next_wake()),
            None => return,
        };
        for transmission in transmissions {
            self.route_frame(node_id, transmission);
        }

        let wake = wake.max(self.current_time + MIN_TIMER_STEP);
        if self.timers.get(&node_id) != Some(&wake) {
            self.timers.insert(node_id, wake);
            self.schedule(wake, Event::TimerFire { node: node_id });
        }
    }

    /// Put a frame on the air: broadcasts reach every neighbour, unicasts
    /// only their destination.
    fn route_frame(&mut self, sender: Address, transmission: Transmission) {
        self.metrics.frames_sent += 1;
        let Transmission { dest, frame } = transmission;

        let receivers = if dest.is_broadcast() {
            self.topology.neighbors(sender)
        } else if self.topology.is_connected(sender, dest) {
            vec![dest]
        } else {
            self.metrics.frames_dropped += 1;
            return;
        };

        for to in receivers {
            let Some(link) = self.topology.get_link(sender, to) else {
                continue;
            };
            let (loss_rate, delay, rssi) = (link.loss_rate, link.delay, link.rssi);

            if loss_rate > 0.0 && self.random_f64() < loss_rate {
                self.metrics.frames_dropped += 1;
                continue;
            }

            self.schedule(
                self.current_time + delay,
                Event::FrameDelivery {
                    to,
                    from: sender,
                    dest,
                    frame: frame.clone(),
                    rssi,
                },
            );
        }
    }

    fn execute_action(&mut self, action: ScenarioAction) {
        match action {
            ScenarioAction::DisableLink { a, b } => {
                if let Some(link) = self.topology.get_link_mut(a, b) {
                    link.active = false;
                }
            }
            ScenarioAction::EnableLink { a, b } => {
                if let Some(link) = self.topology.get_link_mut(a, b) {
                    link.active = true;
                }
            }
            ScenarioAction::SetLossRate { a, b, rate } => {
                if let Some(link) = self.topology.get_link_mut(a, b) {
                    link.loss_rate = rate.clamp(0.0, 1.0);
                }
            }
            ScenarioAction::SetRssi { a, b, rssi } => {
                if let Some(link) = self.topology.get_link_mut(a, b) {
                    link.rssi = rssi;
                }
            }
            ScenarioAction::TakeSnapshot => self.take_snapshot(),
        }
    }

    fn maybe_take_snapshot(&mut self) {
        if let Some(next) = self.next_snapshot {
            if self.current_time >= next {
                self.take_snapshot();
                if let Some(interval) = self.snapshot_interval {
                    self.next_snapshot = Some(next + interval);
                }
            }
        }
    }

    pub fn take_snapshot(&mut self) {
        let mut snapshot = TreeSnapshot::new(self.current_time);
        for (&address, node) in &self.nodes {
            snapshot.record_node(address, node.role(), node.parent_id(), node.children_count());
        }
        self.metrics.add_snapshot(snapshot);
    }

    /// Uniform in [0, 1).
    fn random_f64(&mut self) -> f64 {
        self.rng_state = self
            .rng_state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1);
        (self.rng_state >> 11) as f64 / (1u64 << 53) as f64
    }
}
