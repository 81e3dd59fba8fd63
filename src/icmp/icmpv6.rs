use std::net::IpAddr;

use pnet_packet::icmpv6::{self, Icmpv6Types};
use pnet_packet::Packet;
use tokio::time::Instant;

use super::{read_u16, EchoReply, PingIdentifier, PingSequence};
use crate::error::{PingError, Result};

/// ICMPv6 sockets never hand the IPv6 header to userspace.
pub const IPV6_HEADER_OFFSET: usize = 0;

const IPV6_HEADER_LEN: usize = 40;
const ICMP_HEADER_LEN: usize = 8;
const MAX_PAYLOAD: usize = 65_527 - ICMP_HEADER_LEN;

pub fn make_icmpv6_echo_packet(ident: u16, seq_cnt: u16, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD {
        return Err(PingError::IncorrectBufferSize);
    }
    let mut buf = vec![0u8; ICMP_HEADER_LEN + payload.len()];
    let mut packet =
        icmpv6::MutableIcmpv6Packet::new(&mut buf[..]).ok_or(PingError::IncorrectBufferSize)?;
    packet.set_icmpv6_type(Icmpv6Types::EchoRequest);

    // identifier and sequence lead the echo body
    let mut body = Vec::with_capacity(4 + payload.len());
    body.extend_from_slice(&ident.to_be_bytes());
    body.extend_from_slice(&seq_cnt.to_be_bytes());
    body.extend_from_slice(payload);
    packet.set_payload(&body);

    // Per https://tools.ietf.org/html/rfc3542#section-3.1 the checksum is
    // omitted, the kernel will insert it.

    Ok(packet.packet().to_vec())
}

pub(crate) fn decode(buf: &[u8], source: IpAddr, receive_time: Instant) -> Option<EchoReply> {
    let icmp_buf = buf.get(IPV6_HEADER_OFFSET..)?;
    let icmpv6_packet = icmpv6::Icmpv6Packet::new(icmp_buf)?;
    let icmp_type = icmpv6_packet.get_icmpv6_type();
    let (identifier, sequence) = match icmp_type {
        Icmpv6Types::EchoReply => (read_u16(icmp_buf, 4)?, read_u16(icmp_buf, 6)?),
        Icmpv6Types::EchoRequest => return None,
        // informational messages (>= 128) never quote a request
        t if t.0 < 128 => quoted_echo_request(icmp_buf)?,
        _ => return None,
    };

    Some(EchoReply {
        source,
        identifier: PingIdentifier(identifier),
        sequence: PingSequence(sequence),
        icmp_type: icmp_type.0,
        icmp_code: icmpv6_packet.get_icmpv6_code().0,
        size: icmp_buf.len(),
        ttl: None,
        receive_time,
    })
}

// error header(8) + original ipv6 header(40) + original echo header
fn quoted_echo_request(icmp_buf: &[u8]) -> Option<(u16, u16)> {
    let quoted_icmp = icmp_buf.get(ICMP_HEADER_LEN + IPV6_HEADER_LEN..)?;
    if *quoted_icmp.first()? != Icmpv6Types::EchoRequest.0 {
        return None;
    }
    Some((read_u16(quoted_icmp, 4)?, read_u16(quoted_icmp, 6)?))
}
