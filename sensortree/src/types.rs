//! Core types and constants for the sensortree protocol.

use core::fmt;

use crate::time::Timestamp;

/// Width of a link-layer address in bytes.
pub const ADDR_LEN: usize = 8;

/// Maximum entries in the child directory.
pub const MAX_CHILDREN: usize = 16;

/// Largest frame the link layer carries (one IEEE 802.15.4 PSDU).
pub const MAX_FRAME_SIZE: usize = 127;

/// Envelope header: source and destination addresses.
pub const ENVELOPE_LEN: usize = 2 * ADDR_LEN;

/// Fixed part of a data header: byte0, len_topic, len_data.
pub const DATA_HEADER_LEN: usize = 5;

/// Upper bound for topic or data in a single packet.
pub const MAX_PAYLOAD: usize = MAX_FRAME_SIZE - ENVELOPE_LEN - DATA_HEADER_LEN;

/// Topic used by periodic keepalive sends.
pub const KEEPALIVE_TOPIC: &[u8] = b"keepalive";

/// A single link frame (envelope plus inner packet).
pub type Frame = heapless::Vec<u8, MAX_FRAME_SIZE>;

/// Topic or data bytes of a data packet.
pub type Payload = heapless::Vec<u8, MAX_PAYLOAD>;

/// 8-byte link-layer address. All-zero is the broadcast/unset sentinel.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(pub [u8; ADDR_LEN]);

impl Address {
    /// Broadcast destination; also used as "no address".
    pub const BROADCAST: Address = Address([0u8; ADDR_LEN]);

    pub const fn new(bytes: [u8; ADDR_LEN]) -> Self {
        Address(bytes)
    }

    /// Address whose last byte is `id`, matching the short ids sensor motes boot with.
    pub const fn from_short(id: u8) -> Self {
        let mut bytes = [0u8; ADDR_LEN];
        bytes[ADDR_LEN - 1] = id;
        Address(bytes)
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    pub fn as_bytes(&self) -> &[u8; ADDR_LEN] {
        &self.0
    }
}

// Rendered as four dotted 16-bit words, e.g. `0000.0000.0000.0001`.
impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, pair) in self.0.chunks(2).enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{:02x}{:02x}", pair[0], pair[1])?;
        }
        Ok(())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

/// Role of a node in the tree. Fixed for the lifetime of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRole {
    Node,
    SubGateway,
    Gateway,
    Mobile,
}

impl NodeRole {
    /// 2-bit wire value. Mobile nodes announce themselves as plain nodes.
    pub const fn wire_bits(self) -> u8 {
        match self {
            NodeRole::Node | NodeRole::Mobile => 0b00,
            NodeRole::SubGateway => 0b01,
            NodeRole::Gateway => 0b10,
        }
    }

    /// Inverse of `wire_bits`; `0b11` is reserved.
    pub const fn from_wire_bits(bits: u8) -> Option<Self> {
        match bits {
            0b00 => Some(NodeRole::Node),
            0b01 => Some(NodeRole::SubGateway),
            0b10 => Some(NodeRole::Gateway),
            _ => None,
        }
    }

    /// Authority used when comparing parent candidates. Mobile nodes never parent.
    pub const fn rank(self) -> u8 {
        match self {
            NodeRole::Gateway => 2,
            NodeRole::SubGateway => 1,
            NodeRole::Node | NodeRole::Mobile => 0,
        }
    }

    /// Whether a node of this role may adopt `candidate` as its parent.
    pub const fn accepts_parent(self, candidate: NodeRole) -> bool {
        match self {
            NodeRole::Node | NodeRole::Mobile => {
                matches!(candidate, NodeRole::SubGateway | NodeRole::Gateway)
            }
            NodeRole::SubGateway => matches!(candidate, NodeRole::Gateway),
            NodeRole::Gateway => false,
        }
    }

    /// Roots never look for a parent.
    pub const fn is_root(self) -> bool {
        matches!(self, NodeRole::Gateway)
    }
}

/// 4-bit multicast interest group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MulticastGroup(u8);

impl MulticastGroup {
    /// Control-only / point-to-point traffic.
    pub const UNICAST: MulticastGroup = MulticastGroup(0);
    pub const LIGHT_BULB: MulticastGroup = MulticastGroup(1);
    pub const IRRIGATION: MulticastGroup = MulticastGroup(2);
    pub const LIGHT_SENSOR: MulticastGroup = MulticastGroup(3);

    /// Largest representable group tag.
    pub const MAX: u8 = 0x0F;

    pub const fn new(tag: u8) -> Option<Self> {
        if tag <= Self::MAX {
            Some(MulticastGroup(tag))
        } else {
            None
        }
    }

    pub const fn tag(self) -> u8 {
        self.0
    }

    pub fn is_unicast(self) -> bool {
        self == Self::UNICAST
    }
}

/// Mobile-node marker carried in the low bits of a data header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MobileFlags {
    #[default]
    NotMobile,
    /// Mobile node asking the gateway for a group's latest values.
    DataQuery,
    /// Gateway answer travelling down to a mobile node.
    DataResponse,
}

impl MobileFlags {
    pub const fn bits(self) -> u8 {
        match self {
            MobileFlags::NotMobile => 0,
            MobileFlags::DataQuery => 1,
            MobileFlags::DataResponse => 2,
        }
    }

    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(MobileFlags::NotMobile),
            1 => Some(MobileFlags::DataQuery),
            2 => Some(MobileFlags::DataResponse),
            _ => None,
        }
    }
}

/// Kind of a control packet (3-bit wire field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
    Setup,
    Response,
    SetupAck,
    DataAck,
    ChildRemove,
}

impl ControlKind {
    pub const fn bits(self) -> u8 {
        match self {
            ControlKind::Setup => 0,
            ControlKind::Response => 1,
            ControlKind::SetupAck => 2,
            ControlKind::DataAck => 3,
            ControlKind::ChildRemove => 4,
        }
    }

    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(ControlKind::Setup),
            1 => Some(ControlKind::Response),
            2 => Some(ControlKind::SetupAck),
            3 => Some(ControlKind::DataAck),
            4 => Some(ControlKind::ChildRemove),
            _ => None,
        }
    }
}

/// The node this node forwards up-traffic to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parent {
    pub address: Address,
    pub rssi: i8,
    pub role: NodeRole,
}

impl Parent {
    /// Strict "better than" ordering: role first, rssi as tie-break.
    pub fn is_worse_than(&self, candidate: &Parent) -> bool {
        match candidate.role.rank().cmp(&self.role.rank()) {
            core::cmp::Ordering::Greater => true,
            core::cmp::Ordering::Less => false,
            core::cmp::Ordering::Equal => candidate.rssi > self.rssi,
        }
    }
}

/// A directly or indirectly attached descendant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Child {
    pub address: Address,
    /// Neighbor through which `address` is reached; equals `address` for direct children.
    pub next_hop: Address,
    pub group: MulticastGroup,
}

impl Child {
    pub fn is_direct(&self) -> bool {
        self.address == self.next_hop
    }
}

/// Static identity of a running node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub address: Address,
    pub role: NodeRole,
    pub group: MulticastGroup,
}

impl Identity {
    pub const fn new(address: Address, role: NodeRole, group: MulticastGroup) -> Self {
        Self {
            address,
            role,
            group,
        }
    }
}

/// Position in the setup state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeState {
    /// No Setup broadcast yet.
    Unset,
    /// Setup broadcast, waiting for a Response.
    SettingUp,
    /// Parent known (or root).
    Attached,
}

/// Protocol events surfaced to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// First parent adopted after setup.
    Attached { parent: Address, role: NodeRole },
    /// A strictly better parent replaced the previous one.
    ParentChanged { old: Address, new: Address },
    /// Too many unacknowledged sends; back to setup.
    ParentLost { parent: Address },
    /// A child (direct or relayed) was registered.
    ChildJoined { child: Address, group: MulticastGroup },
    /// A child entry was removed.
    ChildLeft { child: Address },
}

/// Traffic counters kept per node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportMetrics {
    pub control_sent: u32,
    pub control_received: u32,
    pub data_sent: u32,
    pub data_received: u32,
    pub data_forwarded: u32,
    /// Frames rejected by a full transport queue.
    pub dropped: u32,
    pub decode_errors: u32,
    pub last_rx: Option<Timestamp>,
}

/// Error type for node operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// Send or forward attempted without a parent.
    NotAttached,
    /// Child directory has no room for another address.
    DirectoryFull,
    /// Destination not present in the child directory.
    NoRoute,
    /// Packet does not fit one link frame.
    MessageTooLarge,
    /// The send crossed the ack threshold; parent dropped.
    ParentLost,
    /// Transport queue full.
    QueueFull,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotAttached => write!(f, "node is not attached to a parent"),
            Error::DirectoryFull => write!(f, "child directory is full"),
            Error::NoRoute => write!(f, "no route to destination"),
            Error::MessageTooLarge => write!(f, "message too large"),
            Error::ParentLost => write!(f, "parent link lost"),
            Error::QueueFull => write!(f, "transport queue full"),
        }
    }
}
