//! Radio neighbourhoods and link properties.

use hashbrown::HashMap;
use sensortree::{Address, Duration};

/// Properties of a radio link between two nodes.
#[derive(Debug, Clone)]
pub struct Link {
    /// Signal strength in dBm, reported to both ends.
    pub rssi: i8,
    /// Frame loss rate (0.0 to 1.0).
    pub loss_rate: f64,
    pub delay: Duration,
    pub active: bool,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            rssi: -70,
            loss_rate: 0.0,
            delay: Duration::from_millis(1),
            active: true,
        }
    }
}

impl Link {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rssi(mut self, rssi: i8) -> Self {
        self.rssi = rssi;
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

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

/// Which nodes hear each other. Links are symmetric.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    links: HashMap<(Address, Address), Link>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every node hears every other node.
    pub fn fully_connected(nodes: &[Address]) -> Self {
        let mut topo = Self::new();
        for (i, &a) in nodes.iter().enumerate() {
            for &b in nodes.iter().skip(i + 1) {
                topo.add_link(a, b, Link::default());
            }
        }
        topo
    }

    /// Each node hears only its list neighbours.
    pub fn chain(nodes: &[Address]) -> Self {
        let mut topo = Self::new();
        for window in nodes.windows(2) {
            topo.add_link(window[0], window[1], Link::default());
        }
        topo
    }

    /// First node is the hub.
    pub fn star(nodes: &[Address]) -> Self {
        let mut topo = Self::new();
        let Some((&hub, spokes)) = nodes.split_first() else {
            return topo;
        };
        for &spoke in spokes {
            topo.add_link(hub, spoke, Link::default());
        }
        topo
    }

    pub fn add_link(&mut self, a: Address, b: Address, link: Link) {
        self.links.insert(Self::canonical_pair(a, b), link);
    }

    pub fn get_link(&self, a: Address, b: Address) -> Option<&Link> {
        self.links.get(&Self::canonical_pair(a, b))
    }

    pub fn get_link_mut(&mut self, a: Address, b: Address) -> Option<&mut Link> {
        self.links.get_mut(&Self::canonical_pair(a, b))
    }

    /// Link exists and is up.
    pub fn is_connected(&self, a: Address, b: Address) -> bool {
        self.get_link(a, b).is_some_and(|link| link.active)
    }

    /// Nodes reachable from `node` over active links, in address order.
    pub fn neighbors(&self, node: Address) -> Vec<Address> {
        let mut result: Vec<Address> = self
            .links
            .iter()
            .filter(|(_, link)| link.active)
            .filter_map(|(&(a, b), _)| {
                if a == node {
                    Some(b)
                } else if b == node {
                    Some(a)
                } else {
                    None
                }
            })
            .collect();
        result.sort();
        result
    }

    pub fn set_global_loss_rate(&mut self, rate: f64) {
        for link in self.links.values_mut() {
            link.loss_rate = rate.clamp(0.0, 1.0);
        }
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    fn canonical_pair(a: Address, b: Address) -> (Address, Address) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_nodes(count: u8) -> Vec<Address> {
        (1..=count).map(Address::from_short).collect()
    }

    #[test]
    fn test_fully_connected() {
        let nodes = make_nodes(4);
        let topo = Topology::fully_connected(&nodes);
        assert_eq!(topo.link_count(), 6);
        for &a in &nodes {
            assert_eq!(topo.neighbors(a).len(), 3);
        }
    }

    #[test]
    fn test_chain() {
        let nodes = make_nodes(3);
        let topo = Topology::chain(&nodes);
        assert!(topo.is_connected(nodes[0], nodes[1]));
        assert!(topo.is_connected(nodes[2], nodes[1]));
        assert!(!topo.is_connected(nodes[0], nodes[2]));
    }

    #[test]
    fn test_star() {
        let nodes = make_nodes(4);
        let topo = Topology::star(&nodes);
        assert_eq!(topo.neighbors(nodes[0]), &nodes[1..]);
        assert_eq!(topo.neighbors(nodes[3]), [nodes[0]]);
        assert!(Topology::star(&[]).neighbors(nodes[0]).is_empty());
    }

    #[test]
    fn test_disabled_link_is_not_a_neighbor() {
        let nodes = make_nodes(2);
        let mut topo = Topology::chain(&nodes);
        topo.get_link_mut(nodes[1], nodes[0]).unwrap().active = false;
        assert!(!topo.is_connected(nodes[0], nodes[1]));
        assert!(topo.neighbors(nodes[0]).is_empty());
    }

    #[test]
    fn test_link_properties_are_symmetric() {
        let (a, b) = (Address::from_short(9), Address::from_short(2));
        let mut topo = Topology::new();
        topo.add_link(a, b, Link::new().with_rssi(-42).with_loss_rate(1.5));
        let link = topo.get_link(b, a).unwrap();
        assert_eq!(link.rssi, -42);
        assert_eq!(link.loss_rate, 1.0);
    }
}
