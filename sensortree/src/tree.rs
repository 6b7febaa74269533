//! Tree formation and maintenance.
//!
//! This module handles:
//! - Setup broadcasts and Responses
//! - Parent selection
//! - Child registration and removal
//! - Parent loss

use crate::children::Registration;
use crate::config::NodeConfig;
use crate::node::Node;
use crate::time::Timestamp;
use crate::traits::{Clock, Transport};
use crate::types::{Address, Error, Event, MulticastGroup, NodeRole, Parent};
use crate::wire::ControlMessage;

impl<T, Clk, Cfg> Node<T, Clk, Cfg>
where
    T: Transport,
    Clk: Clock,
    Cfg: NodeConfig,
{
    /// Broadcast a Setup and schedule the next retry.
    pub(crate) fn broadcast_setup(&mut self, now: Timestamp) {
        self.set_next_setup(Some(now + Cfg::SETUP_RETRY_INTERVAL));
        log::debug!("[{}] broadcasting setup", self.address());
        emit_debug!(
            self,
            crate::debug::DebugEvent::SetupBroadcast { timestamp: now }
        );
        if let Err(e) = self.send_control(Address::BROADCAST, ControlMessage::Setup) {
            log::debug!("[{}] setup not sent: {}", self.address(), e);
        }
    }

    /// Handle someone else's Setup.
    ///
    /// A gateway's Setup is a parent offer. Any other Setup is a request,
    /// answered with a Response once this node is part of the tree.
    pub(crate) fn handle_setup(
        &mut self,
        from: Address,
        sender: NodeRole,
        rssi: Option<i8>,
        now: Timestamp,
    ) {
        match self.role() {
            // The gateway only adopts sub-gateways.
            NodeRole::Gateway => {
                if sender == NodeRole::SubGateway {
                    self.answer_setup(from);
                }
            }
            // Mobiles never serve as parents.
            NodeRole::Mobile => {
                if sender == NodeRole::Gateway {
                    self.consider_parent(from, sender, rssi, now);
                }
            }
            NodeRole::Node | NodeRole::SubGateway => {
                if sender == NodeRole::Gateway {
                    self.consider_parent(from, sender, rssi, now);
                } else {
                    self.answer_setup(from);
                }
            }
        }
    }

    fn answer_setup(&mut self, from: Address) {
        if !self.is_attached() {
            return;
        }
        if let Err(e) = self.send_control(from, ControlMessage::Response) {
            log::debug!("[{}] response to {} not sent: {}", self.address(), from, e);
        }
    }

    /// Handle a Response to our Setup.
    pub(crate) fn handle_response(
        &mut self,
        from: Address,
        sender: NodeRole,
        rssi: Option<i8>,
        now: Timestamp,
    ) {
        if self.role().is_root() {
            return;
        }
        self.consider_parent(from, sender, rssi, now);
    }

    /// Run the parent comparison for a candidate. Returns true if adopted.
    pub(crate) fn consider_parent(
        &mut self,
        from: Address,
        sender: NodeRole,
        rssi: Option<i8>,
        now: Timestamp,
    ) -> bool {
        if from == self.address() {
            return false;
        }
        if !self.role().accepts_parent(sender) {
            self.ignore_candidate(from, sender, "ineligible role");
            return false;
        }
        if !self.transport().is_acceptable_rssi(rssi) {
            self.ignore_candidate(from, sender, "weak signal");
            return false;
        }

        let candidate = Parent {
            address: from,
            rssi: rssi.unwrap_or(i8::MIN),
            role: sender,
        };

        match self.parent().copied() {
            None => {
                self.adopt_parent(candidate, None, now);
                true
            }
            Some(current) if current.address == from => {
                // Same parent, fresher signal reading. No re-ack.
                self.set_parent(Some(candidate));
                false
            }
            Some(current) if current.is_worse_than(&candidate) => {
                self.adopt_parent(candidate, Some(current.address), now);
                true
            }
            Some(_) => {
                self.ignore_candidate(from, sender, "not better than current parent");
                false
            }
        }
    }

    fn ignore_candidate(&mut self, from: Address, role: NodeRole, reason: &'static str) {
        log::trace!("[{}] ignoring {:?} candidate {}: {}", self.address(), role, from, reason);
        emit_debug!(
            self,
            crate::debug::DebugEvent::CandidateIgnored { from, role, reason }
        );
    }

    fn adopt_parent(&mut self, parent: Parent, replaced: Option<Address>, now: Timestamp) {
        self.set_parent(Some(parent));
        self.acks_mut().reset();
        self.set_next_setup(None);
        self.set_next_keepalive(Some(now + Cfg::KEEPALIVE_INTERVAL));

        match replaced {
            None => {
                log::info!(
                    "[{}] attached to {} ({:?}, rssi {})",
                    self.address(),
                    parent.address,
                    parent.role,
                    parent.rssi
                );
                self.push_event(Event::Attached {
                    parent: parent.address,
                    role: parent.role,
                });
            }
            Some(old) => {
                log::info!(
                    "[{}] switched parent {} -> {} (rssi {})",
                    self.address(),
                    old,
                    parent.address,
                    parent.rssi
                );
                self.push_event(Event::ParentChanged {
                    old,
                    new: parent.address,
                });
            }
        }
        emit_debug!(
            self,
            crate::debug::DebugEvent::ParentAdopted {
                parent: parent.address,
                role: parent.role,
                rssi: parent.rssi,
                replaced,
            }
        );

        let ack = ControlMessage::SetupAck {
            group: self.group(),
            child: self.address(),
        };
        if let Err(e) = self.send_control(parent.address, ack) {
            log::debug!("[{}] setup ack not sent: {}", self.address(), e);
        }
    }

    /// Drop the parent and go back to setup. Children are kept.
    pub(crate) fn parent_lost(&mut self, now: Timestamp) {
        let Some(parent) = self.parent().copied() else {
            return;
        };
        let outstanding = self.outstanding_acks();

        self.set_parent(None);
        self.acks_mut().reset();
        self.set_next_keepalive(None);

        log::warn!(
            "[{}] parent {} lost ({} unacknowledged)",
            self.address(),
            parent.address,
            outstanding
        );
        emit_debug!(
            self,
            crate::debug::DebugEvent::ParentLost {
                parent: parent.address,
                outstanding,
            }
        );
        self.push_event(Event::ParentLost {
            parent: parent.address,
        });

        self.broadcast_setup(now);
    }

    /// Handle a SetupAck: `announced` is reachable through `from`.
    pub(crate) fn handle_setup_ack(
        &mut self,
        from: Address,
        sender: NodeRole,
        announced: Address,
        group: MulticastGroup,
    ) {
        match self.role() {
            NodeRole::Mobile => return,
            NodeRole::Gateway if sender != NodeRole::SubGateway => {
                log::debug!("[{}] rejecting {:?} child {}", self.address(), sender, from);
                return;
            }
            _ => {}
        }
        // A node never lists itself or its own parent below it.
        if announced == self.address() || self.parent().is_some_and(|p| p.address == from) {
            return;
        }

        if self.register_child(from, announced, group).is_err() {
            return;
        }

        if let Some(parent) = self.parent().copied() {
            let ack = ControlMessage::SetupAck {
                group,
                child: announced,
            };
            if let Err(e) = self.send_control(parent.address, ack) {
                log::debug!("[{}] re-announce of {} failed: {}", self.address(), announced, e);
            }
        }
    }

    /// Record `announced` as reachable through `from`, telling the old next
    /// hop to forget it if the route moved.
    pub fn register_child(
        &mut self,
        from: Address,
        announced: Address,
        group: MulticastGroup,
    ) -> Result<Registration, Error> {
        let registration = match self.children_mut().register(from, announced, group) {
            Ok(r) => r,
            Err(e) => {
                log::warn!(
                    "[{}] child directory full, rejecting {}",
                    self.address(),
                    announced
                );
                return Err(e);
            }
        };

        emit_debug!(
            self,
            crate::debug::DebugEvent::ChildRegistered {
                child: announced,
                next_hop: from,
                group,
            }
        );

        match registration {
            Registration::Added => {
                log::info!("[{}] child {} via {}", self.address(), announced, from);
                self.push_event(Event::ChildJoined {
                    child: announced,
                    group,
                });
            }
            Registration::Updated {
                stale_route: Some(old_next_hop),
            } => {
                log::debug!(
                    "[{}] child {} moved from {} to {}",
                    self.address(),
                    announced,
                    old_next_hop,
                    from
                );
                emit_debug!(
                    self,
                    crate::debug::DebugEvent::StaleRoute {
                        child: announced,
                        old_next_hop,
                    }
                );
                let remove = ControlMessage::ChildRemove { child: announced };
                if let Err(e) = self.send_control(old_next_hop, remove) {
                    log::debug!("[{}] child remove not sent: {}", self.address(), e);
                }
            }
            Registration::Updated { stale_route: None } => {}
        }

        Ok(registration)
    }

    /// Forget `child`, passing the removal on to the relay that also holds
    /// it. Returns false if nothing was removed.
    pub fn remove_child(&mut self, child: Address) -> bool {
        if child == self.address() {
            return false;
        }
        let Some(removal) = self.children_mut().remove(&child) else {
            return false;
        };

        log::debug!("[{}] child {} removed", self.address(), child);
        emit_debug!(
            self,
            crate::debug::DebugEvent::ChildRemoved {
                child,
                propagated: removal.propagate_to.is_some(),
            }
        );
        self.push_event(Event::ChildLeft { child });

        if let Some(relay) = removal.propagate_to {
            if let Err(e) = self.send_control(relay, ControlMessage::ChildRemove { child }) {
                log::debug!("[{}] child remove not propagated: {}", self.address(), e);
            }
        }
        true
    }
}
