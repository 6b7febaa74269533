//! Metrics collection for simulation analysis.

use hashbrown::HashMap;
use sensortree::{Address, NodeRole, Timestamp};

/// Tree shape at a point in time.
#[derive(Debug, Clone)]
pub struct TreeSnapshot {
    pub time: Timestamp,
    /// Parent of each node; `None` for the gateway and detached nodes.
    pub parents: HashMap<Address, Option<Address>>,
    pub roles: HashMap<Address, NodeRole>,
    /// Child directory size of each node.
    pub directory_sizes: HashMap<Address, usize>,
}

impl TreeSnapshot {
    pub fn new(time: Timestamp) -> Self {
        Self {
            time,
            parents: HashMap::new(),
            roles: HashMap::new(),
            directory_sizes: HashMap::new(),
        }
    }

    pub fn record_node(
        &mut self,
        node: Address,
        role: NodeRole,
        parent: Option<Address>,
        directory_size: usize,
    ) {
        self.parents.insert(node, parent);
        self.roles.insert(node, role);
        self.directory_sizes.insert(node, directory_size);
    }

    /// Non-gateway nodes without a parent, in address order.
    pub fn detached(&self) -> Vec<Address> {
        let mut nodes: Vec<Address> = self
            .parents
            .iter()
            .filter(|(node, parent)| {
                parent.is_none() && self.roles.get(*node).is_some_and(|r| !r.is_root())
            })
            .map(|(&node, _)| node)
            .collect();
        nodes.sort();
        nodes
    }

    pub fn all_attached(&self) -> bool {
        self.detached().is_empty()
    }

    /// Hops from `node` to a node without a parent. `None` on a loop.
    pub fn depth_of(&self, node: Address) -> Option<usize> {
        let mut current = node;
        for depth in 0..=self.parents.len() {
            match self.parents.get(&current).copied().flatten() {
                Some(parent) => current = parent,
                None => return Some(depth),
            }
        }
        None
    }

    pub fn max_depth(&self) -> usize {
        self.parents
            .keys()
            .filter_map(|&n| self.depth_of(n))
            .max()
            .unwrap_or(0)
    }
}

/// Simulation metrics collected over time.
#[derive(Debug, Clone, Default)]
pub struct SimMetrics {
    /// Frames handed to the radio.
    pub frames_sent: u64,
    /// Frames lost to link loss or an unreachable destination.
    pub frames_dropped: u64,
    pub frames_delivered: u64,
    /// Application sends rejected by the node.
    pub send_failures: u64,
    pub snapshots: Vec<TreeSnapshot>,
}

impl SimMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_snapshot(&mut self, snapshot: TreeSnapshot) {
        self.snapshots.push(snapshot);
    }

    /// First snapshot time at which every node had a parent.
    pub fn convergence_time(&self) -> Option<Timestamp> {
        self.snapshots
            .iter()
            .find(|s| s.all_attached())
            .map(|s| s.time)
    }

    pub fn latest_snapshot(&self) -> Option<&TreeSnapshot> {
        self.snapshots.last()
    }
}

/// Result of running a simulation.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub end_time: Timestamp,
    pub metrics: SimMetrics,
    /// Ended because nothing was left to do, not because time ran out.
    pub queue_exhausted: bool,
}

impl SimulationResult {
    /// Every node had a parent at the end.
    pub fn converged(&self) -> bool {
        self.metrics
            .latest_snapshot()
            .is_some_and(|s| s.all_attached())
    }

    pub fn final_max_depth(&self) -> usize {
        self.metrics
            .latest_snapshot()
            .map(|s| s.max_depth())
            .unwrap_or(0)
    }
}
