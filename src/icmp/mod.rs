use std::{borrow::Cow, fmt, net::IpAddr};

use pnet_packet::{icmp::IcmpTypes, icmpv6::Icmpv6Types};
use tokio::time::Instant;

use crate::error::{PingError, Result};

pub mod icmpv4;
pub mod icmpv6;

/// Identify which ICMP version a socket or packet speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ICMP {
    #[default]
    V4,
    V6,
}

impl From<IpAddr> for ICMP {
    fn from(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => ICMP::V4,
            IpAddr::V6(_) => ICMP::V6,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct PingIdentifier(pub u16);

impl PingIdentifier {
    pub fn into_u16(self) -> u16 {
        self.0
    }
}

impl fmt::Display for PingIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u16> for PingIdentifier {
    fn from(ident: u16) -> Self {
        Self(ident)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, PartialOrd, Ord)]
pub struct PingSequence(pub u16);

impl PingSequence {
    pub fn into_u16(self) -> u16 {
        self.0
    }
}

impl fmt::Display for PingSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u16> for PingSequence {
    fn from(seq_cnt: u16) -> Self {
        Self(seq_cnt)
    }
}

/// One outgoing probe. `send_time` is taken at construction and taken again by
/// [`IcmpSocket::send`](crate::IcmpSocket::send) right before the packet is handed to the kernel.
#[derive(Debug, Clone)]
pub struct EchoRequest {
    destination: IpAddr,
    identifier: PingIdentifier,
    sequence: PingSequence,
    payload: Vec<u8>,
    send_time: Instant,
}

impl EchoRequest {
    pub fn new(
        destination: IpAddr,
        identifier: PingIdentifier,
        sequence: PingSequence,
        payload: Vec<u8>,
    ) -> Self {
        EchoRequest {
            destination,
            identifier,
            sequence,
            payload,
            send_time: Instant::now(),
        }
    }

    pub fn destination(&self) -> IpAddr {
        self.destination
    }

    pub fn identifier(&self) -> PingIdentifier {
        self.identifier
    }

    pub fn sequence(&self) -> PingSequence {
        self.sequence
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn send_time(&self) -> Instant {
        self.send_time
    }

    pub(crate) fn stamp_send_time(&mut self) {
        self.send_time = Instant::now();
    }
}

/// What an inbound ICMP message means for the probe it answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    EchoReply,
    DestinationUnreachable,
    TimeExceeded,
    Other,
}

/// A decoded ICMP message, either an echo reply or an error quoting one of our requests.
#[derive(Debug, Clone)]
pub struct EchoReply {
    pub source: IpAddr,
    pub identifier: PingIdentifier,
    pub sequence: PingSequence,
    pub icmp_type: u8,
    pub icmp_code: u8,
    pub size: usize,
    pub ttl: Option<u8>,
    pub receive_time: Instant,
}

impl EchoReply {
    pub fn kind(&self) -> ReplyKind {
        match (ICMP::from(self.source), self.icmp_type) {
            (ICMP::V4, t) if t == IcmpTypes::EchoReply.0 => ReplyKind::EchoReply,
            (ICMP::V4, t) if t == IcmpTypes::DestinationUnreachable.0 => {
                ReplyKind::DestinationUnreachable
            }
            (ICMP::V4, t) if t == IcmpTypes::TimeExceeded.0 => ReplyKind::TimeExceeded,
            (ICMP::V6, t) if t == Icmpv6Types::EchoReply.0 => ReplyKind::EchoReply,
            (ICMP::V6, t) if t == Icmpv6Types::DestinationUnreachable.0 => {
                ReplyKind::DestinationUnreachable
            }
            (ICMP::V6, t) if t == Icmpv6Types::TimeExceeded.0 => ReplyKind::TimeExceeded,
            _ => ReplyKind::Other,
        }
    }

    /// Turn an error-carrying reply into the matching `PingError`.
    pub fn raise_for_status(&self) -> Result<()> {
        match self.kind() {
            ReplyKind::EchoReply => Ok(()),
            ReplyKind::DestinationUnreachable => Err(PingError::DestinationUnreachable {
                host: self.source,
                code: self.icmp_code,
            }),
            ReplyKind::TimeExceeded => Err(PingError::TimeExceeded {
                host: self.source,
                code: self.icmp_code,
            }),
            ReplyKind::Other => Err(PingError::UnexpectedReply {
                icmp_type: self.icmp_type,
                icmp_code: self.icmp_code,
            }),
        }
    }

    /// Whether this reply carries the identifier and sequence a request went out with. The
    /// identifier is the one seen on the wire, which datagram sockets may have rewritten.
    pub fn answers(&self, identifier: PingIdentifier, sequence: PingSequence) -> bool {
        self.identifier == identifier && self.sequence == sequence
    }
}

/// Builds request bytes and parses inbound datagrams.
pub trait PacketCodec: Send + Sync {
    fn encode(&self, request: &EchoRequest) -> Result<Vec<u8>>;

    /// Returns `None` for anything that is not an echo reply or an ICMP error quoting an echo
    /// request, including our own echo requests looped back on raw sockets.
    fn decode(&self, buf: &[u8], source: IpAddr, receive_time: Instant) -> Option<EchoReply>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IcmpCodec;

impl PacketCodec for IcmpCodec {
    fn encode(&self, request: &EchoRequest) -> Result<Vec<u8>> {
        let ident = request.identifier().into_u16();
        let seq_cnt = request.sequence().into_u16();
        match request.destination() {
            IpAddr::V4(_) => icmpv4::make_icmpv4_echo_packet(ident, seq_cnt, request.payload()),
            IpAddr::V6(_) => icmpv6::make_icmpv6_echo_packet(ident, seq_cnt, request.payload()),
        }
    }

    fn decode(&self, buf: &[u8], source: IpAddr, receive_time: Instant) -> Option<EchoReply> {
        match source {
            IpAddr::V4(_) => icmpv4::decode(buf, source, receive_time),
            IpAddr::V6(_) => icmpv6::decode(buf, source, receive_time),
        }
    }
}

/// Put back `stripped` zero bytes in front of a datagram whose IP header the kernel removed,
/// so the decoder sees the same offsets for every socket type.
pub fn restore_ip_header(buf: &[u8], stripped: usize) -> Cow<'_, [u8]> {
    if stripped == 0 {
        return Cow::Borrowed(buf);
    }
    let mut padded = vec![0u8; stripped + buf.len()];
    padded[stripped..].copy_from_slice(buf);
    Cow::Owned(padded)
}

pub(crate) fn read_u16(buf: &[u8], at: usize) -> Option<u16> {
    let bytes = buf.get(at..at + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}
