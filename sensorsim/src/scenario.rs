//! Scenario builder for farm-shaped networks.
//!
//! The layout mirrors a typical deployment: one gateway, a ring of
//! sub-gateways in radio range of it, and a cluster of sensor/actuator
//! leaves around each sub-gateway that cannot hear the gateway directly.
//!
//! Addresses are assigned deterministically: gateway `1`, sub-gateway `i`
//! at `10 + i`, leaves from `100` upward, mobiles from `200` upward (all via
//! [`Address::from_short`]). The gateway's directory holds
//! [`MAX_CHILDREN`](sensortree::MAX_CHILDREN) descendants, which bounds the
//! network size.

use sensortree::{Address, Duration, Identity, MulticastGroup, NodeRole, OutgoingData, Timestamp};

use crate::event::ScenarioAction;
use crate::metrics::SimulationResult;
use crate::sim::Simulator;
use crate::topology::{Link, Topology};

const GATEWAY_ID: u8 = 1;
const SUB_GATEWAY_BASE: u8 = 10;
const LEAF_BASE: u8 = 100;
const MOBILE_BASE: u8 = 200;

const GATEWAY_RSSI: i8 = -55;
const LEAF_RSSI: i8 = -60;
const BACKUP_RSSI: i8 = -85;
const MOBILE_RSSI: i8 = -75;

/// Groups handed out to the leaves of each sub-gateway, in order.
const LEAF_GROUPS: [MulticastGroup; 3] = [
    MulticastGroup::LIGHT_BULB,
    MulticastGroup::IRRIGATION,
    MulticastGroup::LIGHT_SENSOR,
];

/// Addresses of everything a scenario created.
#[derive(Debug, Clone)]
pub struct FarmLayout {
    pub gateway: Address,
    pub sub_gateways: Vec<Address>,
    /// Leaves in creation order, grouped by sub-gateway.
    pub leaves: Vec<Address>,
    pub mobiles: Vec<Address>,
    leaves_per_sub: usize,
}

impl FarmLayout {
    /// Leaf `index` of sub-gateway `sub`.
    pub fn leaf(&self, sub: usize, index: usize) -> Address {
        self.leaves[sub * self.leaves_per_sub + index]
    }

    /// Leaves of sub-gateway `sub`.
    pub fn leaves_of(&self, sub: usize) -> &[Address] {
        &self.leaves[sub * self.leaves_per_sub..(sub + 1) * self.leaves_per_sub]
    }

    /// Multicast group of leaf `index` within its sub-gateway.
    pub fn leaf_group(index: usize) -> MulticastGroup {
        LEAF_GROUPS[index % LEAF_GROUPS.len()]
    }

    pub fn all(&self) -> Vec<Address> {
        let mut all = vec![self.gateway];
        all.extend(&self.sub_gateways);
        all.extend(&self.leaves);
        all.extend(&self.mobiles);
        all
    }
}

/// Builder for simulation scenarios.
pub struct ScenarioBuilder {
    sub_gateways: usize,
    leaves_per_sub: usize,
    mobiles: usize,
    /// Leaves also hear the next sub-gateway, weakly.
    backup_links: bool,
    seed: u64,
    loss_rate: f64,
    delay: Duration,
    snapshot_interval: Option<Duration>,
    actions: Vec<(Timestamp, ScenarioAction)>,
    sends: Vec<(Timestamp, Address, OutgoingData)>,
}

impl Default for ScenarioBuilder {
    fn default() -> Self {
        Self::farm(2, 3)
    }
}

impl ScenarioBuilder {
    /// One gateway, `sub_gateways` relays and `leaves_per_sub` leaves each.
    pub fn farm(sub_gateways: usize, leaves_per_sub: usize) -> Self {
        Self {
            sub_gateways,
            leaves_per_sub,
            mobiles: 0,
            backup_links: false,
            seed: 42,
            loss_rate: 0.0,
            delay: Duration::from_millis(1),
            snapshot_interval: None,
            actions: Vec::new(),
            sends: Vec::new(),
        }
    }

    /// Add mobile nodes in range of the first sub-gateway.
    pub fn with_mobiles(mut self, count: usize) -> Self {
        self.mobiles = count;
        self
    }

    /// Let every leaf also hear the next sub-gateway at a weak signal.
    pub fn with_backup_links(mut self) -> Self {
        self.backup_links = true;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_loss_rate(mut self, rate: f64) -> Self {
        self.loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = Some(interval);
        self
    }

    pub fn disable_link_at(mut self, time: Timestamp, a: Address, b: Address) -> Self {
        self.actions
            .push((time, ScenarioAction::DisableLink { a, b }));
        self
    }

    pub fn enable_link_at(mut self, time: Timestamp, a: Address, b: Address) -> Self {
        self.actions.push((time, ScenarioAction::EnableLink { a, b }));
        self
    }

    pub fn snapshot_at(mut self, time: Timestamp) -> Self {
        self.actions.push((time, ScenarioAction::TakeSnapshot));
        self
    }

    /// Application send from `from` at `time`.
    pub fn send_at(mut self, time: Timestamp, from: Address, data: OutgoingData) -> Self {
        self.sends.push((time, from, data));
        self
    }

    /// Addresses this builder will assign.
    pub fn layout(&self) -> FarmLayout {
        let sub_gateways = (0..self.sub_gateways)
            .map(|i| Address::from_short(SUB_GATEWAY_BASE + i as u8))
            .collect();
        let leaves = (0..self.sub_gateways * self.leaves_per_sub)
            .map(|i| Address::from_short(LEAF_BASE + i as u8))
            .collect();
        let mobiles = (0..self.mobiles)
            .map(|i| Address::from_short(MOBILE_BASE + i as u8))
            .collect();
        FarmLayout {
            gateway: Address::from_short(GATEWAY_ID),
            sub_gateways,
            leaves,
            mobiles,
            leaves_per_sub: self.leaves_per_sub,
        }
    }

    fn topology(&self, layout: &FarmLayout) -> Topology {
        let link = |rssi: i8| Link::new().with_rssi(rssi).with_delay(self.delay);
        let mut topo = Topology::new();

        for (s, &sub) in layout.sub_gateways.iter().enumerate() {
            topo.add_link(layout.gateway, sub, link(GATEWAY_RSSI));
            for &leaf in layout.leaves_of(s) {
                topo.add_link(sub, leaf, link(LEAF_RSSI));
            }
            if self.backup_links && layout.sub_gateways.len() > 1 {
                let next = layout.sub_gateways[(s + 1) % layout.sub_gateways.len()];
                for &leaf in layout.leaves_of(s) {
                    topo.add_link(next, leaf, link(BACKUP_RSSI));
                }
            }
        }
        if let Some(&first) = layout.sub_gateways.first() {
            for &mobile in &layout.mobiles {
                topo.add_link(first, mobile, link(MOBILE_RSSI));
            }
        }

        if self.loss_rate > 0.0 {
            topo.set_global_loss_rate(self.loss_rate);
        }
        topo
    }

    /// Build the simulator with every node started at time zero.
    pub fn build(self) -> (Simulator, FarmLayout) {
        let layout = self.layout();
        let mut sim = Simulator::new(self.seed).with_topology(self.topology(&layout));
        if let Some(interval) = self.snapshot_interval {
            sim = sim.with_snapshot_interval(interval);
        }

        sim.add_node(Identity::new(
            layout.gateway,
            NodeRole::Gateway,
            MulticastGroup::UNICAST,
        ));
        for &sub in &layout.sub_gateways {
            sim.add_node(Identity::new(sub, NodeRole::SubGateway, MulticastGroup::UNICAST));
        }
        for s in 0..layout.sub_gateways.len() {
            for (i, &leaf) in layout.leaves_of(s).iter().enumerate() {
                sim.add_node(Identity::new(leaf, NodeRole::Node, FarmLayout::leaf_group(i)));
            }
        }
        for &mobile in &layout.mobiles {
            sim.add_node(Identity::new(mobile, NodeRole::Mobile, MulticastGroup::UNICAST));
        }

        for (time, action) in self.actions {
            sim.schedule_action(time, action);
        }
        for (time, from, data) in self.sends {
            sim.schedule_send(time, from, data);
        }

        (sim, layout)
    }

    pub fn run_for(self, duration: Duration) -> SimulationResult {
        let (mut sim, _) = self.build();
        sim.run_for(duration)
    }
}
