//! Wire format serialization and deserialization.
//!
//! Every frame is an envelope wrapping exactly one control or data packet.
//! Multi-byte integers are big-endian.
//!
//! ## Envelope
//!
//! ```text
//! src (8) || dest (8) || inner...
//! ```
//!
//! ## Control packet
//!
//! ```text
//! byte0 || payload
//!
//! byte0:
//! - bit 7:    packet type (0 = control)
//! - bits 6-5: sender role (Node 00, SubGateway 01, Gateway 10)
//! - bits 4-2: kind (Setup 0, Response 1, SetupAck 2, DataAck 3, ChildRemove 4)
//! - bits 1-0: reserved, zero
//!
//! payload:
//! - Setup, Response:      empty
//! - SetupAck:             group (1) || child (8)
//! - DataAck, ChildRemove: address (8)
//! ```
//!
//! ## Data packet
//!
//! ```text
//! byte0 || len_topic (2) || len_data (2) || [dest (8)] || topic || data
//!
//! byte0:
//! - bit 7:    packet type (1 = data)
//! - bit 6:    up (toward the gateway)
//! - bits 5-2: multicast group
//! - bits 1-0: mobile flags (NotMobile 0, DataQuery 1, DataResponse 2)
//!
//! dest is present iff up == 0.
//! ```
//!
//! Nothing here allocates: frames and payloads are fixed-capacity
//! `heapless` buffers bounded by [`MAX_FRAME_SIZE`].

use core::fmt;

use crate::types::{
    Address, ControlKind, Error, Frame, MobileFlags, MulticastGroup, NodeRole, Payload, ADDR_LEN,
    ENVELOPE_LEN, MAX_FRAME_SIZE,
};

const TYPE_DATA: u8 = 0x80;

const ROLE_SHIFT: u8 = 5;
const ROLE_MASK: u8 = 0b11;
const KIND_SHIFT: u8 = 2;
const KIND_MASK: u8 = 0b111;
const CONTROL_RESERVED_MASK: u8 = 0b11;

const UP_BIT: u8 = 0x40;
const GROUP_SHIFT: u8 = 2;
const GROUP_MASK: u8 = 0x0F;
const MOBILE_MASK: u8 = 0b11;

/// Decoding error types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// Buffer shorter than the header or declared lengths demand.
    Truncated,
    /// Reserved role pattern.
    UnknownRole,
    /// Reserved control kind pattern.
    UnknownResponseKind,
    /// Reserved mobile flag pattern.
    UnknownMobileFlags,
    /// Reserved bits set, or a group byte out of range.
    ReservedBits,
    /// Control decoder given a data packet or vice versa.
    WrongPacketType,
    /// Bytes left over after a complete packet.
    TrailingBytes,
    /// Declared length exceeds the link payload cap.
    TooLarge,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Truncated => write!(f, "truncated packet"),
            DecodeError::UnknownRole => write!(f, "unknown node role"),
            DecodeError::UnknownResponseKind => write!(f, "unknown control kind"),
            DecodeError::UnknownMobileFlags => write!(f, "unknown mobile flags"),
            DecodeError::ReservedBits => write!(f, "reserved bits set"),
            DecodeError::WrongPacketType => write!(f, "unexpected packet type"),
            DecodeError::TrailingBytes => write!(f, "trailing bytes"),
            DecodeError::TooLarge => write!(f, "declared length too large"),
        }
    }
}

/// Encoding error types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncodeError {
    /// Result would not fit one link frame.
    TooLarge,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::TooLarge => write!(f, "packet exceeds frame size"),
        }
    }
}

impl From<EncodeError> for Error {
    fn from(e: EncodeError) -> Self {
        match e {
            EncodeError::TooLarge => Error::MessageTooLarge,
        }
    }
}

/// Zero-copy reader over a byte slice.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let v = *self.buf.get(self.pos).ok_or(DecodeError::Truncated)?;
        self.pos += 1;
        Ok(v)
    }

    /// Read exactly `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if len > self.remaining() {
            return Err(DecodeError::Truncated);
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_u16_be(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_address(&mut self) -> Result<Address, DecodeError> {
        let bytes = self.read_bytes(ADDR_LEN)?;
        let mut addr = [0u8; ADDR_LEN];
        addr.copy_from_slice(bytes);
        Ok(Address(addr))
    }

    /// Everything not yet consumed.
    pub fn rest(&mut self) -> &'a [u8] {
        let slice = &self.buf[self.pos.min(self.buf.len())..];
        self.pos = self.buf.len();
        slice
    }
}

/// Writer into a single link frame.
#[derive(Default)]
pub struct Writer {
    buf: Frame,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_u8(&mut self, v: u8) -> Result<(), EncodeError> {
        self.buf.push(v).map_err(|_| EncodeError::TooLarge)
    }

    pub fn write_bytes(&mut self, v: &[u8]) -> Result<(), EncodeError> {
        self.buf
            .extend_from_slice(v)
            .map_err(|_| EncodeError::TooLarge)
    }

    pub fn write_u16_be(&mut self, v: u16) -> Result<(), EncodeError> {
        self.write_bytes(&v.to_be_bytes())
    }

    pub fn write_address(&mut self, addr: &Address) -> Result<(), EncodeError> {
        self.write_bytes(addr.as_bytes())
    }

    pub fn finish(self) -> Frame {
        self.buf
    }
}

/// Trait for types that can be encoded to wire format.
pub trait Encode {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError>;

    fn encode_to_frame(&self) -> Result<Frame, EncodeError> {
        let mut w = Writer::new();
        self.encode(&mut w)?;
        Ok(w.finish())
    }
}

/// Trait for types that can be decoded from wire format.
pub trait Decode: Sized {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError>;

    /// Decode a complete packet, rejecting trailing bytes.
    fn decode_from_slice(data: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(data);
        let result = Self::decode(&mut r)?;
        if !r.is_empty() {
            return Err(DecodeError::TrailingBytes);
        }
        Ok(result)
    }
}

/// Control message body; the kind is implied by the variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlMessage {
    /// Looking for a parent.
    Setup,
    /// Offer to be the receiver's parent.
    Response,
    /// Announces `child` (with its group) to the receiver.
    SetupAck {
        group: MulticastGroup,
        child: Address,
    },
    /// Acknowledges data originated by `dest`.
    DataAck { dest: Address },
    /// `child` is no longer reachable through the receiver.
    ChildRemove { child: Address },
}

impl ControlMessage {
    pub fn kind(&self) -> ControlKind {
        match self {
            ControlMessage::Setup => ControlKind::Setup,
            ControlMessage::Response => ControlKind::Response,
            ControlMessage::SetupAck { .. } => ControlKind::SetupAck,
            ControlMessage::DataAck { .. } => ControlKind::DataAck,
            ControlMessage::ChildRemove { .. } => ControlKind::ChildRemove,
        }
    }
}

/// Control packet: sender role plus message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControlPacket {
    pub role: NodeRole,
    pub message: ControlMessage,
}

impl ControlPacket {
    pub fn new(role: NodeRole, message: ControlMessage) -> Self {
        Self { role, message }
    }

    pub fn kind(&self) -> ControlKind {
        self.message.kind()
    }
}

impl Encode for ControlPacket {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        let head =
            (self.role.wire_bits() << ROLE_SHIFT) | (self.kind().bits() << KIND_SHIFT);
        w.write_u8(head)?;
        match self.message {
            ControlMessage::Setup | ControlMessage::Response => Ok(()),
            ControlMessage::SetupAck { group, child } => {
                w.write_u8(group.tag())?;
                w.write_address(&child)
            }
            ControlMessage::DataAck { dest: addr } | ControlMessage::ChildRemove { child: addr } => {
                w.write_address(&addr)
            }
        }
    }
}

impl Decode for ControlPacket {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let head = r.read_u8()?;
        if head & TYPE_DATA != 0 {
            return Err(DecodeError::WrongPacketType);
        }
        let role = NodeRole::from_wire_bits((head >> ROLE_SHIFT) & ROLE_MASK)
            .ok_or(DecodeError::UnknownRole)?;
        let kind = ControlKind::from_bits((head >> KIND_SHIFT) & KIND_MASK)
            .ok_or(DecodeError::UnknownResponseKind)?;
        if head & CONTROL_RESERVED_MASK != 0 {
            return Err(DecodeError::ReservedBits);
        }

        let message = match kind {
            ControlKind::Setup => ControlMessage::Setup,
            ControlKind::Response => ControlMessage::Response,
            ControlKind::SetupAck => {
                let group = MulticastGroup::new(r.read_u8()?).ok_or(DecodeError::ReservedBits)?;
                let child = r.read_address()?;
                ControlMessage::SetupAck { group, child }
            }
            ControlKind::DataAck => ControlMessage::DataAck {
                dest: r.read_address()?,
            },
            ControlKind::ChildRemove => ControlMessage::ChildRemove {
                child: r.read_address()?,
            },
        };
        Ok(ControlPacket { role, message })
    }
}

/// Topic/value packet travelling up or down the tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataPacket {
    pub up: bool,
    pub group: MulticastGroup,
    pub mobile: MobileFlags,
    /// Final destination; `Some` iff `up == false`.
    pub dest: Option<Address>,
    pub topic: Payload,
    pub data: Payload,
}

impl DataPacket {
    /// Packet toward the gateway.
    pub fn up(group: MulticastGroup, topic: &[u8], data: &[u8]) -> Result<Self, EncodeError> {
        Ok(Self {
            up: true,
            group,
            mobile: MobileFlags::NotMobile,
            dest: None,
            topic: Payload::from_slice(topic).map_err(|_| EncodeError::TooLarge)?,
            data: Payload::from_slice(data).map_err(|_| EncodeError::TooLarge)?,
        })
    }

    /// Packet toward `dest`, or every member of `group` when `dest` is broadcast.
    pub fn down(
        group: MulticastGroup,
        dest: Address,
        topic: &[u8],
        data: &[u8],
    ) -> Result<Self, EncodeError> {
        let mut packet = Self::up(group, topic, data)?;
        packet.up = false;
        packet.dest = Some(dest);
        Ok(packet)
    }

    pub fn with_mobile(mut self, mobile: MobileFlags) -> Self {
        self.mobile = mobile;
        self
    }

    /// Destination of a down packet, broadcast when absent.
    pub fn dest_or_broadcast(&self) -> Address {
        self.dest.unwrap_or(Address::BROADCAST)
    }
}

impl Encode for DataPacket {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        let dest = if self.up {
            None
        } else {
            Some(self.dest_or_broadcast())
        };
        write_data(w, self.group, self.mobile, dest, &self.topic, &self.data)
    }
}

impl Decode for DataPacket {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let head = r.read_u8()?;
        if head & TYPE_DATA == 0 {
            return Err(DecodeError::WrongPacketType);
        }
        let up = head & UP_BIT != 0;
        let group = MulticastGroup::new((head >> GROUP_SHIFT) & GROUP_MASK)
            .ok_or(DecodeError::ReservedBits)?;
        let mobile =
            MobileFlags::from_bits(head & MOBILE_MASK).ok_or(DecodeError::UnknownMobileFlags)?;
        let len_topic = r.read_u16_be()? as usize;
        let len_data = r.read_u16_be()? as usize;
        let dest = if up { None } else { Some(r.read_address()?) };

        let topic = Payload::from_slice(r.read_bytes(len_topic)?).map_err(|_| DecodeError::TooLarge)?;
        let data = Payload::from_slice(r.read_bytes(len_data)?).map_err(|_| DecodeError::TooLarge)?;

        Ok(DataPacket {
            up,
            group,
            mobile,
            dest,
            topic,
            data,
        })
    }
}

/// Shared by `DataPacket::encode` and `encode_data`; `dest` decides the up bit.
fn write_data(
    w: &mut Writer,
    group: MulticastGroup,
    mobile: MobileFlags,
    dest: Option<Address>,
    topic: &[u8],
    data: &[u8],
) -> Result<(), EncodeError> {
    let len_topic = u16::try_from(topic.len()).map_err(|_| EncodeError::TooLarge)?;
    let len_data = u16::try_from(data.len()).map_err(|_| EncodeError::TooLarge)?;

    let mut head = TYPE_DATA | ((group.tag() & GROUP_MASK) << GROUP_SHIFT) | mobile.bits();
    if dest.is_none() {
        head |= UP_BIT;
    }
    w.write_u8(head)?;
    w.write_u16_be(len_topic)?;
    w.write_u16_be(len_data)?;
    if let Some(dest) = dest {
        w.write_address(&dest)?;
    }
    w.write_bytes(topic)?;
    w.write_bytes(data)
}

/// Either packet type, dispatched on bit 7 of the first byte.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Packet {
    Control(ControlPacket),
    Data(DataPacket),
}

impl Encode for Packet {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        match self {
            Packet::Control(c) => c.encode(w),
            Packet::Data(d) => d.encode(w),
        }
    }
}

impl Decode for Packet {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let head = *r.buf.get(r.pos).ok_or(DecodeError::Truncated)?;
        if head & TYPE_DATA != 0 {
            DataPacket::decode(r).map(Packet::Data)
        } else {
            ControlPacket::decode(r).map(Packet::Control)
        }
    }
}

impl From<ControlPacket> for Packet {
    fn from(p: ControlPacket) -> Self {
        Packet::Control(p)
    }
}

impl From<DataPacket> for Packet {
    fn from(p: DataPacket) -> Self {
        Packet::Data(p)
    }
}

/// Source and destination wrapped around every packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnvelopeHeader {
    pub src: Address,
    pub dest: Address,
}

impl EnvelopeHeader {
    pub fn new(src: Address, dest: Address) -> Self {
        Self { src, dest }
    }

    /// Encode this header followed by `packet` into one frame.
    pub fn wrap<P: Encode>(&self, packet: &P) -> Result<Frame, EncodeError> {
        let mut w = Writer::new();
        w.write_address(&self.src)?;
        w.write_address(&self.dest)?;
        packet.encode(&mut w)?;
        Ok(w.finish())
    }

    /// Encode this header followed by already-encoded inner bytes.
    pub fn wrap_raw(&self, inner: &[u8]) -> Result<Frame, EncodeError> {
        let mut w = Writer::new();
        w.write_address(&self.src)?;
        w.write_address(&self.dest)?;
        w.write_bytes(inner)?;
        Ok(w.finish())
    }
}

/// `src || dest || inner`.
pub fn encode_envelope(src: Address, dest: Address, inner: &[u8]) -> Result<Frame, EncodeError> {
    EnvelopeHeader::new(src, dest).wrap_raw(inner)
}

/// Split a frame into (src, dest, inner bytes) without copying.
pub fn decode_envelope(buf: &[u8]) -> Result<(Address, Address, &[u8]), DecodeError> {
    if buf.len() > MAX_FRAME_SIZE {
        return Err(DecodeError::TooLarge);
    }
    if buf.len() < ENVELOPE_LEN {
        return Err(DecodeError::Truncated);
    }
    let mut r = Reader::new(buf);
    let src = r.read_address()?;
    let dest = r.read_address()?;
    Ok((src, dest, r.rest()))
}

/// Encode a control packet for `role`.
pub fn encode_control(role: NodeRole, message: ControlMessage) -> Result<Frame, EncodeError> {
    ControlPacket::new(role, message).encode_to_frame()
}

pub fn decode_control(buf: &[u8]) -> Result<ControlPacket, DecodeError> {
    ControlPacket::decode_from_slice(buf)
}

/// Encode a data packet. `up` packets carry no destination; down packets
/// default to broadcast when `dest` is `None`.
pub fn encode_data(
    up: bool,
    group: MulticastGroup,
    mobile: MobileFlags,
    dest: Option<Address>,
    topic: &[u8],
    data: &[u8],
) -> Result<Frame, EncodeError> {
    let dest = if up {
        None
    } else {
        Some(dest.unwrap_or(Address::BROADCAST))
    };
    let mut w = Writer::new();
    write_data(&mut w, group, mobile, dest, topic, data)?;
    Ok(w.finish())
}

pub fn decode_data(buf: &[u8]) -> Result<DataPacket, DecodeError> {
    DataPacket::decode_from_slice(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DATA_HEADER_LEN, MAX_PAYLOAD};

    fn addr(id: u8) -> Address {
        Address::from_short(id)
    }

    #[test]
    fn test_control_byte_layout() {
        let setup = encode_control(NodeRole::SubGateway, ControlMessage::Setup).unwrap();
        assert_eq!(setup.as_slice(), &[0x20]);

        let response = encode_control(NodeRole::Gateway, ControlMessage::Response).unwrap();
        assert_eq!(response.as_slice(), &[0b0100_0100]);

        let ack = encode_control(
            NodeRole::Node,
            ControlMessage::SetupAck {
                group: MulticastGroup::IRRIGATION,
                child: addr(7),
            },
        )
        .unwrap();
        assert_eq!(ack.as_slice(), &[0x08, 0x02, 0, 0, 0, 0, 0, 0, 0, 7]);
    }

    #[test]
    fn test_control_roundtrip_all_kinds() {
        let messages = [
            ControlMessage::Setup,
            ControlMessage::Response,
            ControlMessage::SetupAck {
                group: MulticastGroup::LIGHT_BULB,
                child: addr(3),
            },
            ControlMessage::DataAck { dest: addr(4) },
            ControlMessage::ChildRemove { child: addr(5) },
        ];
        for role in [NodeRole::Node, NodeRole::SubGateway, NodeRole::Gateway] {
            for message in messages {
                let bytes = encode_control(role, message).unwrap();
                let decoded = decode_control(&bytes).unwrap();
                assert_eq!(decoded, ControlPacket::new(role, message));
            }
        }
    }

    #[test]
    fn test_control_rejects_reserved_patterns() {
        assert_eq!(decode_control(&[0b0110_0000]), Err(DecodeError::UnknownRole));
        assert_eq!(
            decode_control(&[0b0001_0100]),
            Err(DecodeError::UnknownResponseKind)
        );
        assert_eq!(decode_control(&[0b0000_0001]), Err(DecodeError::ReservedBits));
        assert_eq!(decode_control(&[0x80]), Err(DecodeError::WrongPacketType));
        assert_eq!(decode_control(&[0x00, 0xff]), Err(DecodeError::TrailingBytes));
        assert_eq!(decode_control(&[]), Err(DecodeError::Truncated));
    }

    #[test]
    fn test_setup_ack_rejects_out_of_range_group() {
        let mut bytes = [0u8; 10];
        bytes[0] = 0x08;
        bytes[1] = 0x10;
        assert_eq!(decode_control(&bytes), Err(DecodeError::ReservedBits));
    }

    #[test]
    fn test_data_byte_layout() {
        let bytes = encode_data(
            true,
            MulticastGroup::IRRIGATION,
            MobileFlags::DataQuery,
            None,
            b"t",
            b"vv",
        )
        .unwrap();
        assert_eq!(bytes.as_slice(), &[0xC9, 0, 1, 0, 2, b't', b'v', b'v']);

        let down = encode_data(
            false,
            MulticastGroup::LIGHT_BULB,
            MobileFlags::NotMobile,
            Some(addr(9)),
            b"on",
            b"",
        )
        .unwrap();
        assert_eq!(down[0], 0x84);
        assert_eq!(down.len(), DATA_HEADER_LEN + ADDR_LEN + 2);
        assert_eq!(&down[5..13], addr(9).as_bytes());
    }

    #[test]
    fn test_data_roundtrip_up_and_down() {
        let up = DataPacket::up(MulticastGroup::LIGHT_SENSOR, b"light", b"312").unwrap();
        let decoded = decode_data(&up.encode_to_frame().unwrap()).unwrap();
        assert_eq!(decoded, up);
        assert_eq!(decoded.dest, None);

        let down = DataPacket::down(MulticastGroup::UNICAST, addr(12), b"mobile", b"\x03")
            .unwrap()
            .with_mobile(MobileFlags::DataResponse);
        let decoded = decode_data(&down.encode_to_frame().unwrap()).unwrap();
        assert_eq!(decoded, down);
        assert_eq!(decoded.dest, Some(addr(12)));
    }

    #[test]
    fn test_up_packet_drops_stray_dest() {
        let mut packet = DataPacket::up(MulticastGroup::UNICAST, b"a", b"b").unwrap();
        packet.dest = Some(addr(1));
        let decoded = decode_data(&packet.encode_to_frame().unwrap()).unwrap();
        assert_eq!(decoded.dest, None);
    }

    #[test]
    fn test_data_roundtrip_max_payload() {
        let topic = [b'x'; 40];
        let data = [0xAB; MAX_PAYLOAD - 40 - ADDR_LEN];
        let packet = DataPacket::down(MulticastGroup::LIGHT_BULB, addr(2), &topic, &data).unwrap();
        let frame = EnvelopeHeader::new(addr(1), addr(2)).wrap(&packet).unwrap();
        assert_eq!(frame.len(), MAX_FRAME_SIZE);

        let (_, _, inner) = decode_envelope(&frame).unwrap();
        assert_eq!(decode_data(inner).unwrap(), packet);
    }

    #[test]
    fn test_oversized_packet_rejected() {
        let topic = [b'x'; 60];
        let data = [0u8; 60];
        let packet = DataPacket::up(MulticastGroup::UNICAST, &topic, &data).unwrap();
        let result = EnvelopeHeader::new(addr(1), addr(2)).wrap(&packet);
        assert_eq!(result, Err(EncodeError::TooLarge));
        assert!(DataPacket::up(MulticastGroup::UNICAST, &[0u8; MAX_PAYLOAD + 1], b"").is_err());
    }

    #[test]
    fn test_every_prefix_is_truncated() {
        let packet = DataPacket::down(MulticastGroup::IRRIGATION, addr(5), b"irrigation", b"on")
            .unwrap();
        let bytes = packet.encode_to_frame().unwrap();
        for cut in 0..bytes.len() {
            assert_eq!(
                decode_data(&bytes[..cut]),
                Err(DecodeError::Truncated),
                "prefix of {} bytes",
                cut
            );
        }

        let ack = encode_control(NodeRole::Node, ControlMessage::DataAck { dest: addr(5) })
            .unwrap();
        for cut in 0..ack.len() {
            assert_eq!(decode_control(&ack[..cut]), Err(DecodeError::Truncated));
        }
    }

    #[test]
    fn test_declared_length_beyond_buffer() {
        // len_topic claims 0xFFFF bytes.
        let bytes = [0xC0, 0xFF, 0xFF, 0x00, 0x00, b'a'];
        assert_eq!(decode_data(&bytes), Err(DecodeError::Truncated));
    }

    #[test]
    fn test_data_rejects_mobile_pattern() {
        let bytes = [0xC3, 0, 0, 0, 0];
        assert_eq!(decode_data(&bytes), Err(DecodeError::UnknownMobileFlags));
    }

    #[test]
    fn test_envelope_split() {
        let inner = encode_control(NodeRole::Gateway, ControlMessage::Setup).unwrap();
        let frame = encode_envelope(addr(1), Address::BROADCAST, &inner).unwrap();
        let (src, dest, rest) = decode_envelope(&frame).unwrap();
        assert_eq!(src, addr(1));
        assert_eq!(dest, Address::BROADCAST);
        assert_eq!(rest, inner.as_slice());

        assert_eq!(decode_envelope(&frame[..15]), Err(DecodeError::Truncated));
    }

    #[test]
    fn test_packet_dispatch_on_type_bit() {
        let control = ControlPacket::new(NodeRole::Node, ControlMessage::Response);
        let data = DataPacket::up(MulticastGroup::UNICAST, b"keepalive", b"").unwrap();

        let c = Packet::decode_from_slice(&control.encode_to_frame().unwrap()).unwrap();
        assert_eq!(c, Packet::Control(control));
        let d = Packet::decode_from_slice(&data.encode_to_frame().unwrap()).unwrap();
        assert_eq!(d, Packet::Data(data));
        assert_eq!(Packet::decode_from_slice(&[]), Err(DecodeError::Truncated));
    }
}
