use std::net::IpAddr;

use pnet_packet::icmp::{self, echo_reply::EchoReplyPacket, echo_request, IcmpTypes};
use pnet_packet::{ipv4, Packet};
use tokio::time::Instant;

use super::{read_u16, EchoReply, PingIdentifier, PingSequence};
use crate::error::{PingError, Result};

/// Length of an IPv4 header without options.
pub const IPV4_HEADER_LEN: usize = 20;

const ICMP_HEADER_LEN: usize = 8;
const MAX_PAYLOAD: usize = 65_507 - ICMP_HEADER_LEN;

pub fn make_icmpv4_echo_packet(ident: u16, seq_cnt: u16, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD {
        return Err(PingError::IncorrectBufferSize);
    }
    let mut buf = vec![0; ICMP_HEADER_LEN + payload.len()];
    let mut packet = echo_request::MutableEchoRequestPacket::new(&mut buf[..])
        .ok_or(PingError::IncorrectBufferSize)?;
    packet.set_icmp_type(IcmpTypes::EchoRequest);
    packet.set_identifier(ident);
    packet.set_sequence_number(seq_cnt);
    packet.set_payload(payload);

    let icmp_packet = icmp::IcmpPacket::new(packet.packet()).ok_or(PingError::IncorrectBufferSize)?;
    let checksum = icmp::checksum(&icmp_packet);
    packet.set_checksum(checksum);

    Ok(packet.packet().to_vec())
}

/// Decode a datagram that starts with an IPv4 header, real or zero-filled.
pub(crate) fn decode(buf: &[u8], source: IpAddr, receive_time: Instant) -> Option<EchoReply> {
    let (icmp_buf, ttl) = match ipv4::Ipv4Packet::new(buf) {
        Some(ip) if ip.get_version() == 4 => {
            let header_len = ip.get_header_length() as usize * 4;
            if header_len < IPV4_HEADER_LEN {
                return None;
            }
            (buf.get(header_len..)?, Some(ip.get_ttl()))
        }
        _ => (buf.get(IPV4_HEADER_LEN..)?, None),
    };

    let icmp_packet = icmp::IcmpPacket::new(icmp_buf)?;
    let icmp_type = icmp_packet.get_icmp_type();
    let (identifier, sequence) = match icmp_type {
        IcmpTypes::EchoReply => {
            let echo = EchoReplyPacket::new(icmp_buf)?;
            (echo.get_identifier(), echo.get_sequence_number())
        }
        IcmpTypes::EchoRequest => return None,
        _ => quoted_echo_request(icmp_buf)?,
    };

    Some(EchoReply {
        source,
        identifier: PingIdentifier(identifier),
        sequence: PingSequence(sequence),
        icmp_type: icmp_type.0,
        icmp_code: icmp_packet.get_icmp_code().0,
        size: icmp_buf.len(),
        ttl,
        receive_time,
    })
}

// ICMP error header(8) + original IP header + original echo header.
fn quoted_echo_request(icmp_buf: &[u8]) -> Option<(u16, u16)> {
    let quoted_ip = icmp_buf.get(ICMP_HEADER_LEN..)?;
    let quoted_header_len = (*quoted_ip.first()? & 0x0f) as usize * 4;
    if quoted_header_len < IPV4_HEADER_LEN {
        return None;
    }
    let quoted_icmp = quoted_ip.get(quoted_header_len..)?;
    if *quoted_icmp.first()? != IcmpTypes::EchoRequest.0 {
        return None;
    }
    Some((read_u16(quoted_icmp, 4)?, read_u16(quoted_icmp, 6)?))
}
