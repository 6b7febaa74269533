//! Child directory and multicast next-hop resolution.
//!
//! [`ChildDirectory`] is the table of every descendant this node has heard
//! announced, direct or relayed. Each entry records the neighbour (next hop)
//! through which the descendant is reached, so a subtree is represented
//! without storing its topology.
//!
//! # Layout
//!
//! Entries live in a fixed-capacity `heapless::Vec` in insertion order and
//! are unique by address. Capacity is [`MAX_CHILDREN`]; a full table rejects
//! new addresses but still accepts updates to known ones.
//!
//! The directory itself never transmits. Operations return what the caller
//! must tell its neighbours ([`Registration::Updated::stale_route`],
//! [`Removal::propagate_to`]), and the node turns those into `ChildRemove`
//! packets.

use crate::types::{Address, Child, Error, MulticastGroup, MAX_CHILDREN};

/// Outcome of [`ChildDirectory::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// New entry appended.
    Added,
    /// Existing entry rewritten in place.
    Updated {
        /// Previous next hop, set when the route moved; it must be told to
        /// drop the child.
        stale_route: Option<Address>,
    },
}

/// Outcome of [`ChildDirectory::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Removal {
    pub child: Child,
    /// Relay that also holds an entry for the child.
    pub propagate_to: Option<Address>,
}

/// Insertion-ordered, fixed-capacity child table.
#[derive(Debug, Clone, Default)]
pub struct ChildDirectory {
    entries: heapless::Vec<Child, MAX_CHILDREN>,
}

impl ChildDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.is_full()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Child> {
        self.entries.iter()
    }

    pub fn get(&self, address: &Address) -> Option<&Child> {
        self.entries.iter().find(|c| c.address == *address)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.get(address).is_some()
    }

    /// Record that `announced` is reachable through neighbour `from`.
    ///
    /// A known address is updated in place. When its next hop changes and the
    /// old next hop was a relay, that relay is returned as `stale_route`. An unknown address is appended,
    /// or rejected with [`Error::DirectoryFull`].
    pub fn register(
        &mut self,
        from: Address,
        announced: Address,
        group: MulticastGroup,
    ) -> Result<Registration, Error> {
        if let Some(entry) = self.entries.iter_mut().find(|c| c.address == announced) {
            let old_hop = entry.next_hop;
            entry.next_hop = from;
            entry.group = group;
            let stale_route = (old_hop != from && old_hop != announced).then_some(old_hop);
            return Ok(Registration::Updated { stale_route });
        }

        self.entries
            .push(Child {
                address: announced,
                next_hop: from,
                group,
            })
            .map_err(|_| Error::DirectoryFull)?;
        Ok(Registration::Added)
    }

    /// Delete the entry for `address`, keeping the order of the rest.
    pub fn remove(&mut self, address: &Address) -> Option<Removal> {
        let index = self.entries.iter().position(|c| c.address == *address)?;
        let child = self.entries.remove(index);
        let propagate_to = (!child.is_direct()).then_some(child.next_hop);
        Some(Removal {
            child,
            propagate_to,
        })
    }

    /// Neighbour to hand a packet for `address` to.
    pub fn resolve_next_hop(&self, address: &Address) -> Option<Address> {
        self.get(address).map(|c| c.next_hop)
    }

    /// First entry at or after `start_index` in `group`, with its index.
    pub fn resolve_multicast(
        &self,
        group: MulticastGroup,
        start_index: usize,
    ) -> Option<(usize, Address)> {
        self.entries
            .iter()
            .enumerate()
            .skip(start_index)
            .find(|(_, c)| c.group == group)
            .map(|(i, c)| (i, c.next_hop))
    }

    /// Every distinct next hop serving `group`, each yielded once, in table order.
    pub fn next_hops_for(&self, group: MulticastGroup) -> NextHops<'_> {
        NextHops {
            directory: self,
            group,
            cursor: 0,
        }
    }
}

/// Iterator returned by [`ChildDirectory::next_hops_for`].
pub struct NextHops<'a> {
    directory: &'a ChildDirectory,
    group: MulticastGroup,
    cursor: usize,
}

impl NextHops<'_> {
    // A hop is a duplicate if an earlier entry of the same group already used it.
    fn seen_before(&self, index: usize, hop: Address) -> bool {
        self.directory.entries[..index]
            .iter()
            .any(|c| c.group == self.group && c.next_hop == hop)
    }
}

impl Iterator for NextHops<'_> {
    type Item = Address;

    fn next(&mut self) -> Option<Address> {
        loop {
            let (index, hop) = self.directory.resolve_multicast(self.group, self.cursor)?;
            self.cursor = index + 1;
            if !self.seen_before(index, hop) {
                return Some(hop);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    const G: MulticastGroup = MulticastGroup::LIGHT_BULB;
    const H: MulticastGroup = MulticastGroup::IRRIGATION;

    fn addr(id: u8) -> Address {
        Address::from_short(id)
    }

    #[test]
    fn test_register_direct_child() {
        let mut dir = ChildDirectory::new();
        assert_eq!(dir.register(addr(5), addr(5), G), Ok(Registration::Added));
        assert_eq!(dir.resolve_next_hop(&addr(5)), Some(addr(5)));
        assert!(dir.get(&addr(5)).unwrap().is_direct());
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_reannounce_same_hop_is_not_stale() {
        let mut dir = ChildDirectory::new();
        dir.register(addr(2), addr(5), G).unwrap();
        assert_eq!(
            dir.register(addr(2), addr(5), H),
            Ok(Registration::Updated { stale_route: None })
        );
        assert_eq!(dir.get(&addr(5)).unwrap().group, H);
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_moved_child_reports_old_hop() {
        let mut dir = ChildDirectory::new();
        dir.register(addr(2), addr(9), G).unwrap();
        assert_eq!(
            dir.register(addr(3), addr(9), G),
            Ok(Registration::Updated {
                stale_route: Some(addr(2))
            })
        );
        assert_eq!(dir.resolve_next_hop(&addr(9)), Some(addr(3)));
    }

    #[test]
    fn test_direct_child_moving_behind_relay_is_not_stale() {
        let mut dir = ChildDirectory::new();
        dir.register(addr(9), addr(9), G).unwrap();
        assert_eq!(
            dir.register(addr(2), addr(9), G),
            Ok(Registration::Updated { stale_route: None })
        );
        assert_eq!(dir.resolve_next_hop(&addr(9)), Some(addr(2)));
    }

    #[test]
    fn test_full_directory_rejects_new_but_updates_known() {
        let mut dir = ChildDirectory::new();
        for id in 1..=MAX_CHILDREN as u8 {
            dir.register(addr(id), addr(id), G).unwrap();
        }
        assert!(dir.is_full());
        assert_eq!(
            dir.register(addr(200), addr(200), G),
            Err(Error::DirectoryFull)
        );
        assert!(dir.register(addr(50), addr(1), H).is_ok());
        assert_eq!(dir.resolve_next_hop(&addr(1)), Some(addr(50)));
        assert_eq!(dir.len(), MAX_CHILDREN);
    }

    #[test]
    fn test_remove_reports_relay() {
        let mut dir = ChildDirectory::new();
        dir.register(addr(2), addr(2), G).unwrap();
        dir.register(addr(2), addr(7), G).unwrap();

        let relayed = dir.remove(&addr(7)).unwrap();
        assert_eq!(relayed.propagate_to, Some(addr(2)));

        let direct = dir.remove(&addr(2)).unwrap();
        assert_eq!(direct.propagate_to, None);
        assert!(dir.is_empty());
        assert_eq!(dir.remove(&addr(2)), None);
    }

    #[test]
    fn test_remove_keeps_insertion_order() {
        let mut dir = ChildDirectory::new();
        for id in [4, 5, 6] {
            dir.register(addr(id), addr(id), G).unwrap();
        }
        dir.remove(&addr(5));
        let order: Vec<_> = dir.iter().map(|c| c.address).collect();
        assert_eq!(order, [addr(4), addr(6)]);
    }

    #[test]
    fn test_resolve_multicast_scans_from_index() {
        let mut dir = ChildDirectory::new();
        dir.register(addr(1), addr(1), G).unwrap();
        dir.register(addr(2), addr(2), H).unwrap();
        dir.register(addr(3), addr(3), G).unwrap();

        assert_eq!(dir.resolve_multicast(G, 0), Some((0, addr(1))));
        assert_eq!(dir.resolve_multicast(G, 1), Some((2, addr(3))));
        assert_eq!(dir.resolve_multicast(G, 3), None);
        assert_eq!(dir.resolve_multicast(H, 0), Some((1, addr(2))));
    }

    #[test]
    fn test_next_hops_excludes_other_groups() {
        let mut dir = ChildDirectory::new();
        dir.register(addr(10), addr(1), G).unwrap(); // X
        dir.register(addr(11), addr(2), G).unwrap(); // Y
        dir.register(addr(12), addr(3), H).unwrap(); // Z

        let hops: Vec<_> = dir.next_hops_for(G).collect();
        assert_eq!(hops, [addr(10), addr(11)]);
    }

    #[test]
    fn test_next_hops_deduplicates_shared_relay() {
        let mut dir = ChildDirectory::new();
        dir.register(addr(10), addr(1), G).unwrap();
        dir.register(addr(12), addr(3), H).unwrap();
        dir.register(addr(10), addr(2), G).unwrap();
        dir.register(addr(10), addr(10), G).unwrap();
        dir.register(addr(11), addr(4), G).unwrap();

        let hops: Vec<_> = dir.next_hops_for(G).collect();
        assert_eq!(hops, [addr(10), addr(11)]);
        assert_eq!(dir.next_hops_for(MulticastGroup::LIGHT_SENSOR).count(), 0);
    }
}
