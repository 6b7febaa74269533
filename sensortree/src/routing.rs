//! Packet dispatch and data routing.
//!
//! Up traffic always goes to the parent. Down traffic follows the child
//! directory: a concrete destination takes its recorded next hop, a
//! group-wide packet fans out to every distinct next hop serving the group.
//! The gateway acknowledges each up packet it receives with a `DataAck`
//! routed back toward the originator.
//!
//! Forwarding re-wraps the received inner bytes in a fresh envelope, so the
//! originator's address survives every hop while the link destination
//! changes.

use crate::config::NodeConfig;
use crate::liveness::Liveness;
use crate::node::Node;
use crate::time::Timestamp;
use crate::traits::{Clock, IncomingData, OutgoingData, Transport};
use crate::types::{Address, Error, NodeRole, Payload, KEEPALIVE_TOPIC, MAX_CHILDREN};
use crate::wire::{
    decode_envelope, encode_envelope, ControlMessage, ControlPacket, DataPacket, Decode, Encode,
    EnvelopeHeader, Packet,
};

impl<T, Clk, Cfg> Node<T, Clk, Cfg>
where
    T: Transport,
    Clk: Clock,
    Cfg: NodeConfig,
{
    /// Handle one frame from the link layer.
    ///
    /// `link_src` is the neighbour that transmitted it; the envelope carries
    /// the originator.
    pub fn on_packet_received(
        &mut self,
        bytes: &[u8],
        link_src: Address,
        link_dest: Address,
        rssi: Option<i8>,
    ) {
        let now = self.clock().now();
        self.metrics_mut().last_rx = Some(now);

        let (src, dest, inner) = match decode_envelope(bytes) {
            Ok(parts) => parts,
            Err(e) => {
                self.record_decode_error(e, bytes.len());
                return;
            }
        };

        let me = self.address();
        if src == me {
            return;
        }
        let for_me = |a: Address| a == me || a.is_broadcast();
        if !for_me(dest) || !for_me(link_dest) {
            log::trace!("[{}] frame for {} overheard", me, dest);
            return;
        }

        match Packet::decode_from_slice(inner) {
            Ok(Packet::Control(packet)) => {
                self.metrics_mut().control_received += 1;
                self.handle_control(packet, link_src, rssi, now);
            }
            Ok(Packet::Data(packet)) => {
                self.metrics_mut().data_received += 1;
                self.handle_data(packet, src, inner, link_src);
            }
            Err(e) => self.record_decode_error(e, bytes.len()),
        }
    }

    fn handle_control(
        &mut self,
        packet: ControlPacket,
        from: Address,
        rssi: Option<i8>,
        now: Timestamp,
    ) {
        let sender = packet.role;
        match packet.message {
            ControlMessage::Setup => self.handle_setup(from, sender, rssi, now),
            ControlMessage::Response => self.handle_response(from, sender, rssi, now),
            ControlMessage::SetupAck { group, child } => {
                self.handle_setup_ack(from, sender, child, group)
            }
            ControlMessage::DataAck { dest } => self.handle_data_ack(dest),
            ControlMessage::ChildRemove { child } => {
                self.remove_child(child);
            }
        }
    }

    fn handle_data_ack(&mut self, dest: Address) {
        if dest == self.address() {
            if self.acks_mut().record_ack() {
                emit_debug!(
                    self,
                    crate::debug::DebugEvent::AckReceived {
                        outstanding: self.outstanding_acks(),
                    }
                );
            }
            return;
        }

        let Some(next_hop) = self.children().resolve_next_hop(&dest) else {
            log::debug!("[{}] no route for ack to {}", self.address(), dest);
            return;
        };
        emit_debug!(
            self,
            crate::debug::DebugEvent::AckForwarded { dest, next_hop }
        );
        if let Err(e) = self.send_control(next_hop, ControlMessage::DataAck { dest }) {
            log::debug!("[{}] ack to {} not forwarded: {}", self.address(), dest, e);
        }
    }

    fn handle_data(&mut self, packet: DataPacket, origin: Address, inner: &[u8], link_src: Address) {
        if self.role().is_root() {
            if packet.up {
                self.ack_origin(origin, link_src);
                self.deliver(packet, origin);
            } else {
                self.drop_data("down packet at gateway");
            }
            return;
        }

        if !self.is_attached() {
            log::debug!("[{}] dropping data from {}: {}", self.address(), origin, Error::NotAttached);
            self.drop_data("not attached");
            return;
        }

        if packet.up {
            if self.role() == NodeRole::Mobile {
                self.drop_data("mobile does not relay");
                return;
            }
            self.forward_up(origin, inner);
            return;
        }

        let dest = packet.dest_or_broadcast();
        let local = dest == self.address() || (dest.is_broadcast() && packet.group == self.group());

        if self.role() == NodeRole::SubGateway && dest != self.address() {
            if let Err(e) = self.route_down(origin, &packet, inner) {
                log::debug!("[{}] down packet for {} not routed: {}", self.address(), dest, e);
                self.drop_data("no route");
            }
        }

        if local {
            self.deliver(packet, origin);
        } else if self.role() != NodeRole::SubGateway {
            self.drop_data("not addressed to this node");
        }
    }

    fn forward_up(&mut self, origin: Address, inner: &[u8]) {
        let Some(parent) = self.parent().copied() else {
            return;
        };
        let frame = match encode_envelope(origin, parent.address, inner) {
            Ok(f) => f,
            Err(_) => {
                self.drop_data("frame too large");
                return;
            }
        };
        if self.transmit(parent.address, frame).is_ok() {
            self.metrics_mut().data_forwarded += 1;
            emit_debug!(
                self,
                crate::debug::DebugEvent::DataForwardedUp {
                    origin,
                    parent: parent.address,
                }
            );
        }
    }

    /// Hand a down packet to the next hop(s) toward its destination.
    /// Returns the number of hops it was queued for.
    fn route_down(
        &mut self,
        origin: Address,
        packet: &DataPacket,
        inner: &[u8],
    ) -> Result<usize, Error> {
        let dest = packet.dest_or_broadcast();
        let mut hops: heapless::Vec<Address, MAX_CHILDREN> = heapless::Vec::new();

        if !dest.is_broadcast() {
            if let Some(hop) = self.children().resolve_next_hop(&dest) {
                let _ = hops.push(hop);
            }
        }
        // Unknown destination in a real group: let the group carry it.
        if hops.is_empty() && (dest.is_broadcast() || !packet.group.is_unicast()) {
            for hop in self.children().next_hops_for(packet.group) {
                if hops.push(hop).is_err() {
                    break;
                }
            }
        }
        if hops.is_empty() {
            return Err(Error::NoRoute);
        }

        let mut queued = 0;
        for next_hop in hops {
            let frame = encode_envelope(origin, next_hop, inner)?;
            if self.transmit(next_hop, frame).is_ok() {
                queued += 1;
                emit_debug!(
                    self,
                    crate::debug::DebugEvent::DataForwardedDown { dest, next_hop }
                );
            }
        }
        if origin == self.address() {
            self.metrics_mut().data_sent += queued as u32;
        } else {
            self.metrics_mut().data_forwarded += queued as u32;
        }
        Ok(queued)
    }

    /// Gateway: acknowledge an up packet toward its originator.
    fn ack_origin(&mut self, origin: Address, link_src: Address) {
        // Unregistered originators are acked through whoever handed us the frame.
        let next_hop = self
            .children()
            .resolve_next_hop(&origin)
            .unwrap_or(link_src);
        emit_debug!(
            self,
            crate::debug::DebugEvent::AckSent {
                dest: origin,
                next_hop,
            }
        );
        if let Err(e) = self.send_control(next_hop, ControlMessage::DataAck { dest: origin }) {
            log::debug!("[{}] ack to {} not sent: {}", self.address(), origin, e);
        }
    }

    fn deliver(&mut self, packet: DataPacket, source: Address) {
        log::debug!(
            "[{}] data from {} ({} byte topic, {} byte value)",
            self.address(),
            source,
            packet.topic.len(),
            packet.data.len()
        );
        emit_debug!(
            self,
            crate::debug::DebugEvent::DataDelivered {
                source,
                topic_len: packet.topic.len(),
            }
        );
        self.push_incoming(IncomingData {
            topic: packet.topic,
            data: packet.data,
            group: packet.group,
            source,
            mobile: packet.mobile,
        });
    }

    fn drop_data(&mut self, reason: &'static str) {
        log::trace!("[{}] data dropped: {}", self.address(), reason);
        emit_debug!(self, crate::debug::DebugEvent::DataDropped { reason });
    }

    /// Send application data.
    ///
    /// Up data goes to the parent; an acked send that crosses the ack
    /// threshold drops the parent instead and returns
    /// [`Error::ParentLost`]. Down data follows the child directory;
    /// `want_ack` is ignored for it.
    pub fn send_data(&mut self, out: OutgoingData) -> Result<(), Error> {
        let now = self.clock().now();
        let me = self.address();

        if out.up {
            let parent = self.parent().copied().ok_or(Error::NotAttached)?;
            let packet = DataPacket {
                up: true,
                group: out.group,
                mobile: out.mobile,
                dest: None,
                topic: out.topic,
                data: out.data,
            };
            let frame = EnvelopeHeader::new(me, parent.address).wrap(&packet)?;

            if out.want_ack && self.acks_mut().record_send() == Liveness::ParentLost {
                self.parent_lost(now);
                return Err(Error::ParentLost);
            }

            if let Err(e) = self.transmit(parent.address, frame) {
                if out.want_ack {
                    self.acks_mut().cancel_send();
                }
                return Err(e);
            }
            self.metrics_mut().data_sent += 1;
            log::debug!("[{}] data up to {}", me, parent.address);
            return Ok(());
        }

        let packet = DataPacket {
            up: false,
            group: out.group,
            mobile: out.mobile,
            dest: Some(out.dest.unwrap_or(Address::BROADCAST)),
            topic: out.topic,
            data: out.data,
        };
        let inner = packet.encode_to_frame()?;
        self.route_down(me, &packet, &inner)?;
        Ok(())
    }

    /// Acked empty-value packet on the keepalive topic.
    pub fn send_keepalive(&mut self) -> Result<(), Error> {
        let topic = Payload::from_slice(KEEPALIVE_TOPIC).map_err(|_| Error::MessageTooLarge)?;
        self.send_data(OutgoingData::up(self.group(), topic, Payload::new()))
    }
}

#[cfg(test)]
mod tests {
    use alloc::boxed::Box;
    use alloc::sync::Arc;
    use alloc::vec::Vec;

    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use embassy_sync::channel::Channel;

    use crate::node::tests::{addr, make_node, rx, sent, TestNode};
    use crate::node::Input;
    use crate::config::{FastConfig, NodeConfig};
    use crate::debug::{DebugEmitter, DebugEvent};
    use crate::traits::{IncomingData, OutgoingData, Received, Transmission, Transport};
    use crate::types::{
        Address, Error, Event, Frame, MobileFlags, MulticastGroup, NodeRole, Payload, KEEPALIVE_TOPIC,
    };
    use crate::wire::{ControlMessage, ControlPacket, DataPacket, Packet};

    const G: MulticastGroup = MulticastGroup::LIGHT_BULB;
    const H: MulticastGroup = MulticastGroup::IRRIGATION;

    fn payload(bytes: &[u8]) -> Payload {
        Payload::from_slice(bytes).unwrap()
    }

    fn attach(node: &mut TestNode, parent: u8, role: NodeRole) {
        node.start();
        let me = node.address();
        node.handle(rx(
            addr(parent),
            me,
            &ControlPacket::new(role, ControlMessage::Response),
            -60,
        ));
        sent(node);
        while node.events().try_receive().is_ok() {}
    }

    fn drain_incoming(node: &TestNode) -> Vec<IncomingData> {
        let mut out = Vec::new();
        while let Ok(d) = node.incoming().try_receive() {
            out.push(d);
        }
        out
    }

    #[test]
    fn test_up_data_forwarded_with_origin_kept() {
        let mut sub = make_node(2, NodeRole::SubGateway, G);
        attach(&mut sub, 1, NodeRole::Gateway);

        let packet = DataPacket::up(G, b"temp", b"21").unwrap();
        sub.handle(rx(addr(3), addr(2), &packet, -50));

        let out = sent(&sub);
        assert_eq!(out.len(), 1);
        let (dest, src, forwarded) = &out[0];
        assert_eq!(*dest, addr(1));
        assert_eq!(*src, addr(3));
        assert_eq!(*forwarded, Packet::Data(packet));
        assert_eq!(sub.metrics().data_forwarded, 1);
    }

    #[test]
    fn test_unattached_node_drops_data() {
        let mut node = make_node(2, NodeRole::SubGateway, G);
        let packet = DataPacket::up(G, b"temp", b"21").unwrap();
        node.handle(rx(addr(3), addr(2), &packet, -50));
        assert!(sent(&node).is_empty());
    }

    #[test]
    fn test_gateway_acks_and_surfaces_up_data() {
        let mut gw = make_node(1, NodeRole::Gateway, MulticastGroup::UNICAST);
        gw.register_child(addr(2), addr(3), G).unwrap();
        sent(&gw);

        let packet = DataPacket::up(G, b"temp", b"21").unwrap();
        gw.handle(rx(addr(3), addr(1), &packet, -50));

        let delivered = drain_incoming(&gw);
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].source, addr(3));
        assert_eq!(delivered[0].topic.as_slice(), b"temp");
        assert_eq!(delivered[0].group, G);

        let out = sent(&gw);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, addr(2));
        assert_eq!(
            out[0].2,
            Packet::Control(ControlPacket::new(
                NodeRole::Gateway,
                ControlMessage::DataAck { dest: addr(3) }
            ))
        );
    }

    #[test]
    fn test_gateway_acks_unknown_origin_via_link_sender() {
        let mut gw = make_node(1, NodeRole::Gateway, MulticastGroup::UNICAST);
        let packet = DataPacket::up(G, b"keepalive", b"").unwrap();
        let frame = crate::wire::EnvelopeHeader::new(addr(7), addr(1))
            .wrap(&packet)
            .unwrap();
        gw.handle(Input::PacketIn(Received {
            data: frame,
            src: addr(4),
            dest: addr(1),
            rssi: None,
        }));

        let out = sent(&gw);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, addr(4));
    }

    #[test]
    fn test_data_query_surfaced_with_flags() {
        let mut gw = make_node(1, NodeRole::Gateway, MulticastGroup::UNICAST);
        let packet = DataPacket::up(G, b"temp", b"")
            .unwrap()
            .with_mobile(MobileFlags::DataQuery);
        gw.handle(rx(addr(5), addr(1), &packet, -50));

        let delivered = drain_incoming(&gw);
        assert_eq!(delivered[0].mobile, MobileFlags::DataQuery);
    }

    #[test]
    fn test_multicast_fans_out_to_distinct_hops() {
        let mut sub = make_node(2, NodeRole::SubGateway, MulticastGroup::UNICAST);
        attach(&mut sub, 1, NodeRole::Gateway);
        sub.register_child(addr(10), addr(20), G).unwrap();
        sub.register_child(addr(11), addr(21), G).unwrap();
        sub.register_child(addr(10), addr(22), G).unwrap();
        sub.register_child(addr(12), addr(23), H).unwrap();
        sent(&sub);

        let packet = DataPacket::down(G, Address::BROADCAST, b"on", b"1").unwrap();
        sub.handle(rx(addr(1), addr(2), &packet, -50));

        let mut dests: Vec<_> = sent(&sub).into_iter().map(|(d, src, _)| {
            assert_eq!(src, addr(1));
            d
        }).collect();
        dests.sort();
        assert_eq!(dests, [addr(10), addr(11)]);
        assert!(drain_incoming(&sub).is_empty());
    }

    #[test]
    fn test_unicast_down_follows_next_hop() {
        let mut sub = make_node(2, NodeRole::SubGateway, G);
        attach(&mut sub, 1, NodeRole::Gateway);
        sub.register_child(addr(10), addr(20), G).unwrap();
        sub.register_child(addr(11), addr(21), G).unwrap();
        sent(&sub);

        let packet = DataPacket::down(MulticastGroup::UNICAST, addr(21), b"set", b"0").unwrap();
        sub.handle(rx(addr(1), addr(2), &packet, -50));

        let out = sent(&sub);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, addr(11));
    }

    struct Trace(Arc<Channel<CriticalSectionRawMutex, DebugEvent, 16>>);

    impl DebugEmitter for Trace {
        fn emit(&mut self, event: DebugEvent) {
            let _ = self.0.try_send(event);
        }
    }

    #[test]
    fn test_sub_gateway_without_route_still_delivers_and_traces_drop() {
        let mut sub = make_node(2, NodeRole::SubGateway, G);
        attach(&mut sub, 1, NodeRole::Gateway);
        let trace = Arc::new(Channel::new());
        sub.set_debug_emitter(Box::new(Trace(Arc::clone(&trace))));

        let packet = DataPacket::down(G, Address::BROADCAST, b"on", b"1").unwrap();
        sub.handle(rx(addr(1), addr(2), &packet, -50));

        assert_eq!(drain_incoming(&sub).len(), 1);
        assert!(sent(&sub).is_empty());

        let mut events = Vec::new();
        while let Ok(event) = trace.try_receive() {
            events.push(event);
        }
        assert!(events.contains(&DebugEvent::DataDropped { reason: "no route" }));
    }

    #[test]
    fn test_leaf_delivers_group_and_own_address() {
        let mut leaf = make_node(3, NodeRole::Node, G);
        attach(&mut leaf, 2, NodeRole::SubGateway);

        let mine = DataPacket::down(G, Address::BROADCAST, b"on", b"1").unwrap();
        let other = DataPacket::down(H, Address::BROADCAST, b"open", b"1").unwrap();
        let direct = DataPacket::down(MulticastGroup::UNICAST, addr(3), b"set", b"2").unwrap();
        for packet in [&mine, &other, &direct] {
            leaf.handle(rx(addr(2), addr(3), packet, -50));
        }

        let delivered = drain_incoming(&leaf);
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[0].topic.as_slice(), b"on");
        assert_eq!(delivered[1].topic.as_slice(), b"set");
        assert!(sent(&leaf).is_empty());
    }

    #[test]
    fn test_overheard_and_echoed_frames_dropped() {
        let mut leaf = make_node(3, NodeRole::Node, G);
        attach(&mut leaf, 2, NodeRole::SubGateway);

        let packet = DataPacket::down(G, Address::BROADCAST, b"on", b"1").unwrap();
        leaf.handle(rx(addr(2), addr(4), &packet, -50));
        leaf.handle(rx(addr(3), addr(3), &packet, -50));
        assert!(drain_incoming(&leaf).is_empty());
    }

    #[test]
    fn test_garbage_counts_decode_error() {
        let mut node = make_node(3, NodeRole::Node, G);
        node.on_packet_received(&[1, 2, 3], addr(2), addr(3), None);

        let bad = crate::wire::encode_envelope(addr(2), addr(3), &[0x03]).unwrap();
        node.on_packet_received(&bad, addr(2), addr(3), None);
        assert_eq!(node.metrics().decode_errors, 2);
        assert!(node.metrics().last_rx.is_some());
    }

    #[test]
    fn test_data_ack_forwarded_toward_child() {
        let mut sub = make_node(2, NodeRole::SubGateway, G);
        attach(&mut sub, 1, NodeRole::Gateway);
        sub.register_child(addr(5), addr(9), G).unwrap();
        sent(&sub);

        let ack = ControlPacket::new(NodeRole::Gateway, ControlMessage::DataAck { dest: addr(9) });
        sub.handle(rx(addr(1), addr(2), &ack, -50));
        let out = sent(&sub);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, addr(5));

        let unknown = ControlPacket::new(NodeRole::Gateway, ControlMessage::DataAck { dest: addr(40) });
        sub.handle(rx(addr(1), addr(2), &unknown, -50));
        assert!(sent(&sub).is_empty());
    }

    #[test]
    fn test_send_requires_parent() {
        let mut node = make_node(3, NodeRole::Node, G);
        let out = OutgoingData::up(G, payload(b"temp"), payload(b"1"));
        assert_eq!(node.send_data(out), Err(Error::NotAttached));
    }

    #[test]
    fn test_second_unacked_send_drops_parent() {
        let mut leaf = make_node(3, NodeRole::Node, G);
        attach(&mut leaf, 2, NodeRole::SubGateway);

        let out = OutgoingData::up(G, payload(b"temp"), payload(b"1"));
        assert_eq!(leaf.send_data(out.clone()), Ok(()));
        assert_eq!(sent(&leaf).len(), 1);
        assert_eq!(leaf.outstanding_acks(), 1);

        assert_eq!(leaf.send_data(out), Err(Error::ParentLost));
        assert!(leaf.parent().is_none());
        assert_eq!(
            leaf.events().try_receive().ok(),
            Some(Event::ParentLost { parent: addr(2) })
        );

        let after = sent(&leaf);
        assert_eq!(after.len(), 1);
        assert!(after[0].0.is_broadcast());
    }

    #[test]
    fn test_send_into_full_queue_keeps_parent() {
        let mut leaf = make_node(3, NodeRole::Node, G);
        attach(&mut leaf, 2, NodeRole::SubGateway);

        let queue = leaf.transport().outgoing();
        while queue
            .try_send(Transmission {
                dest: addr(2),
                frame: Frame::new(),
            })
            .is_ok()
        {}

        let out = OutgoingData::up(G, payload(b"temp"), payload(b"1"));
        assert_eq!(leaf.send_data(out.clone()), Err(Error::QueueFull));
        assert_eq!(leaf.outstanding_acks(), 0);
        assert_eq!(leaf.metrics().dropped, 1);

        while leaf.transport().outgoing().try_receive().is_ok() {}

        assert_eq!(leaf.send_data(out), Ok(()));
        assert_eq!(leaf.outstanding_acks(), 1);
        assert_eq!(leaf.parent().map(|p| p.address), Some(addr(2)));
        assert!(leaf.events().try_receive().is_err());
    }

    #[test]
    fn test_ack_clears_outstanding() {
        let mut leaf = make_node(3, NodeRole::Node, G);
        attach(&mut leaf, 2, NodeRole::SubGateway);

        for _ in 0..3 {
            leaf.send_data(OutgoingData::up(G, payload(b"temp"), payload(b"1")))
                .unwrap();
            let ack =
                ControlPacket::new(NodeRole::SubGateway, ControlMessage::DataAck { dest: addr(3) });
            leaf.handle(rx(addr(2), addr(3), &ack, -50));
            assert_eq!(leaf.outstanding_acks(), 0);
        }
        assert!(leaf.parent().is_some());
    }

    #[test]
    fn test_unacked_sends_never_lose_parent() {
        let mut leaf = make_node(3, NodeRole::Node, G);
        attach(&mut leaf, 2, NodeRole::SubGateway);
        for _ in 0..5 {
            let out = OutgoingData::up(G, payload(b"temp"), payload(b"1")).with_ack(false);
            leaf.send_data(out).unwrap();
        }
        assert!(leaf.parent().is_some());
        assert_eq!(sent(&leaf).len(), 5);
    }

    #[test]
    fn test_down_send_without_route() {
        let mut gw = make_node(1, NodeRole::Gateway, MulticastGroup::UNICAST);
        let out = OutgoingData::down(G, None, payload(b"on"), payload(b"1"));
        assert_eq!(gw.send_data(out), Err(Error::NoRoute));
    }

    #[test]
    fn test_keepalive_sent_on_tick() {
        let mut leaf = make_node(3, NodeRole::Node, G);
        attach(&mut leaf, 2, NodeRole::SubGateway);

        leaf.clock().advance(FastConfig::KEEPALIVE_INTERVAL);
        leaf.handle(Input::Tick);

        let out = sent(&leaf);
        assert_eq!(out.len(), 1);
        match &out[0].2 {
            Packet::Data(d) => {
                assert!(d.up);
                assert_eq!(d.topic.as_slice(), KEEPALIVE_TOPIC);
                assert!(d.data.is_empty());
            }
            other => panic!("expected data, got {:?}", other),
        }
        assert_eq!(leaf.outstanding_acks(), 1);
    }

    /// Shuttle frames between nodes over the given links until quiet.
    fn pump(nodes: &mut [TestNode], links: &[(u8, u8)]) {
        let linked = |a: Address, b: Address| {
            links
                .iter()
                .any(|&(x, y)| (addr(x) == a && addr(y) == b) || (addr(x) == b && addr(y) == a))
        };
        loop {
            let mut frames = Vec::new();
            for node in nodes.iter() {
                let from = node.address();
                for t in node.transport().take_sent() {
                    frames.push((from, t));
                }
            }
            if frames.is_empty() {
                return;
            }
            for (from, t) in frames {
                for node in nodes.iter_mut() {
                    let me = node.address();
                    if me == from || !linked(from, me) {
                        continue;
                    }
                    if t.is_broadcast() || t.dest == me {
                        node.handle(Input::PacketIn(Received {
                            data: t.frame.clone(),
                            src: from,
                            dest: t.dest,
                            rssi: Some(-60),
                        }));
                    }
                }
            }
        }
    }

    #[test]
    fn test_three_tier_exchange() {
        let mut nodes = [
            make_node(1, NodeRole::Gateway, MulticastGroup::UNICAST),
            make_node(2, NodeRole::SubGateway, MulticastGroup::UNICAST),
            make_node(3, NodeRole::Node, G),
        ];
        let links = [(1, 2), (2, 3)];

        for node in nodes.iter_mut() {
            node.start();
        }
        pump(&mut nodes, &links);

        // Let any due setup retries fire.
        for node in nodes.iter_mut() {
            node.clock().advance(FastConfig::SETUP_RETRY_INTERVAL);
            node.handle(Input::Tick);
        }
        pump(&mut nodes, &links);

        assert_eq!(nodes[1].parent().unwrap().address, addr(1));
        assert_eq!(nodes[2].parent().unwrap().address, addr(2));
        assert_eq!(nodes[0].children().resolve_next_hop(&addr(3)), Some(addr(2)));
        assert_eq!(nodes[1].children().resolve_next_hop(&addr(3)), Some(addr(3)));

        nodes[2]
            .send_data(OutgoingData::up(G, payload(b"lux"), payload(b"300")))
            .unwrap();
        pump(&mut nodes, &links);

        let at_gateway = drain_incoming(&nodes[0]);
        assert_eq!(at_gateway.len(), 1);
        assert_eq!(at_gateway[0].source, addr(3));
        assert_eq!(at_gateway[0].data.as_slice(), b"300");
        assert_eq!(nodes[2].outstanding_acks(), 0);

        nodes[0]
            .send_data(OutgoingData::down(G, None, payload(b"on"), payload(b"1")))
            .unwrap();
        pump(&mut nodes, &links);

        let at_leaf = drain_incoming(&nodes[2]);
        assert_eq!(at_leaf.len(), 1);
        assert_eq!(at_leaf[0].topic.as_slice(), b"on");
        assert_eq!(at_leaf[0].source, addr(1));
        assert!(nodes.iter().all(|n| n.is_attached()));
    }
}
