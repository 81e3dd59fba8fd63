use std::{
    future::Future,
    io,
    net::SocketAddr,
    time::Duration,
};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::{
    net::UdpSocket,
    time::{timeout_at, Instant},
};
use tracing::{debug, trace};

use crate::{
    config::Config,
    error::{PingError, Result},
    icmp::{
        icmpv4::IPV4_HEADER_LEN, icmpv6::IPV6_HEADER_OFFSET, restore_ip_header, EchoReply,
        EchoRequest, IcmpCodec, PacketCodec, PingIdentifier, ICMP,
    },
};

const RECV_BUFFER_LEN: usize = 65_536;

/// The datagram channel an [`IcmpSocket`] drives. Implemented for tokio's `UdpSocket`, which
/// wraps the raw or datagram ICMP socket and registers it with the reactor.
pub trait Transport: Send + Sync {
    fn send_to(
        &self,
        buf: &[u8],
        target: SocketAddr,
    ) -> impl Future<Output = io::Result<usize>> + Send;

    fn recv_from(
        &self,
        buf: &mut [u8],
    ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl Transport for UdpSocket {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, target).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }
}

/// Address family and privilege mode of a socket, fixed for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketVariant {
    RawV4,
    DgramV4,
    RawV6,
    DgramV6,
}

impl SocketVariant {
    pub fn select(kind: ICMP, privileged: bool) -> Self {
        match (kind, privileged) {
            (ICMP::V4, true) => SocketVariant::RawV4,
            (ICMP::V4, false) => SocketVariant::DgramV4,
            (ICMP::V6, true) => SocketVariant::RawV6,
            (ICMP::V6, false) => SocketVariant::DgramV6,
        }
    }

    pub fn kind(self) -> ICMP {
        match self {
            SocketVariant::RawV4 | SocketVariant::DgramV4 => ICMP::V4,
            SocketVariant::RawV6 | SocketVariant::DgramV6 => ICMP::V6,
        }
    }

    pub fn is_privileged(self) -> bool {
        matches!(self, SocketVariant::RawV4 | SocketVariant::RawV6)
    }

    fn domain(self) -> Domain {
        match self.kind() {
            ICMP::V4 => Domain::IPV4,
            ICMP::V6 => Domain::IPV6,
        }
    }

    fn sock_type(self) -> Type {
        if self.is_privileged() {
            Type::RAW
        } else {
            Type::DGRAM
        }
    }

    fn protocol(self) -> Protocol {
        match self.kind() {
            ICMP::V4 => Protocol::ICMPV4,
            ICMP::V6 => Protocol::ICMPV6,
        }
    }

    /// Length of the IP header the decoder expects in front of every ICMP message.
    pub fn header_offset(self) -> usize {
        match self.kind() {
            ICMP::V4 => IPV4_HEADER_LEN,
            ICMP::V6 => IPV6_HEADER_OFFSET,
        }
    }

    /// Header bytes the kernel removed from inbound datagrams, which decoding has to put back.
    pub fn stripped_header_len(self) -> usize {
        if self.is_linux_datagram() {
            self.header_offset()
        } else {
            0
        }
    }

    /// Linux ICMP datagram sockets replace the echo identifier with the socket's local port.
    pub fn rewrites_identifier(self) -> bool {
        self.is_linux_datagram()
    }

    fn is_linux_datagram(self) -> bool {
        cfg!(target_os = "linux") && !self.is_privileged()
    }
}

/// One OS socket carrying ICMP echo traffic for a single measurement round.
///
/// Matching assumes a single consumer: at most one `receive` should be waiting at a time.
pub struct IcmpSocket<T: Transport = UdpSocket, C: PacketCodec = IcmpCodec> {
    transport: Option<T>,
    variant: SocketVariant,
    codec: C,
}

impl IcmpSocket<UdpSocket> {
    /// Open a non-blocking ICMP socket for `kind`, raw or datagram depending on
    /// `config.privileged`. Must be called from within a tokio runtime.
    pub fn new(kind: ICMP, config: &Config) -> Result<Self> {
        let variant = SocketVariant::select(kind, config.privileged);
        let socket = Socket::new(variant.domain(), variant.sock_type(), Some(variant.protocol()))
            .map_err(PingError::from_construction)?;
        socket
            .set_nonblocking(true)
            .map_err(PingError::SocketConstruction)?;
        configure(&socket, variant, config).map_err(PingError::from_construction)?;

        let socket = UdpSocket::from_std(std::net::UdpSocket::from(socket))
            .map_err(PingError::SocketConstruction)?;
        debug!(?variant, source = ?config.source, "opened icmp socket");
        Ok(Self::from_transport(socket, variant))
    }
}

fn configure(socket: &Socket, variant: SocketVariant, config: &Config) -> io::Result<()> {
    if let Some(source) = config.source {
        socket.bind(&SockAddr::from(SocketAddr::new(source, 0)))?;
    }
    #[cfg(any(target_os = "android", target_os = "fuchsia", target_os = "linux"))]
    if let Some(interface) = &config.interface {
        socket.bind_device(Some(interface.as_bytes()))?;
    }
    if let Some(ttl) = config.ttl {
        match variant.kind() {
            ICMP::V4 => socket.set_ttl(ttl)?,
            ICMP::V6 => socket.set_unicast_hops_v6(ttl)?,
        }
    }
    Ok(())
}

impl<T: Transport> IcmpSocket<T> {
    pub fn from_transport(transport: T, variant: SocketVariant) -> Self {
        Self::with_codec(transport, variant, IcmpCodec)
    }
}

impl<T: Transport, C: PacketCodec> IcmpSocket<T, C> {
    pub fn with_codec(transport: T, variant: SocketVariant, codec: C) -> Self {
        IcmpSocket {
            transport: Some(transport),
            variant,
            codec,
        }
    }

    pub fn variant(&self) -> SocketVariant {
        self.variant
    }

    pub fn is_closed(&self) -> bool {
        self.transport.is_none()
    }

    fn transport(&self) -> Result<&T> {
        self.transport.as_ref().ok_or(PingError::SocketUnavailable)
    }

    /// Encode and transmit `request`, stamping its send time just before the write. Success
    /// means the packet left this host, nothing more.
    pub async fn send(&self, request: &mut EchoRequest) -> Result<()> {
        let transport = self.transport()?;
        let packet = self.codec.encode(request)?;
        request.stamp_send_time();
        transport
            .send_to(&packet, SocketAddr::new(request.destination(), 0))
            .await
            .map_err(PingError::Socket)?;
        trace!(
            destination = %request.destination(),
            ident = %request.identifier(),
            seq = %request.sequence(),
            "sent echo request"
        );
        Ok(())
    }

    /// Wait for a reply to `expected`, or for any decodable ICMP message when `expected` is
    /// `None`. Replies to other requests are dropped and the wait goes on against the same
    /// deadline, taken once on entry.
    pub async fn receive(
        &self,
        expected: Option<&EchoRequest>,
        timeout: Duration,
    ) -> Result<EchoReply> {
        let transport = self.transport()?;
        let deadline = Instant::now() + timeout;
        match timeout_at(deadline, self.recv_matching(transport, expected)).await {
            Ok(result) => result,
            Err(_) => Err(PingError::Timeout { timeout }),
        }
    }

    async fn recv_matching(
        &self,
        transport: &T,
        expected: Option<&EchoRequest>,
    ) -> Result<EchoReply> {
        let wanted = expected
            .map(|request| (self.wire_identifier(transport, request), request.sequence()));
        let mut buf = vec![0u8; RECV_BUFFER_LEN];
        loop {
            let (size, addr) = transport
                .recv_from(&mut buf)
                .await
                .map_err(PingError::Socket)?;
            let receive_time = Instant::now();
            let packet = restore_ip_header(&buf[..size], self.variant.stripped_header_len());
            let reply = match self.codec.decode(&packet, addr.ip(), receive_time) {
                Some(reply) => reply,
                None => {
                    trace!(%addr, size, "discarding undecodable datagram");
                    continue;
                }
            };
            if let Some((ident, seq)) = wanted {
                if !reply.answers(ident, seq) {
                    trace!(
                        source = %reply.source,
                        ident = %reply.identifier,
                        seq = %reply.sequence,
                        "discarding reply to another request"
                    );
                    continue;
                }
            }
            return Ok(reply);
        }
    }

    fn wire_identifier(&self, transport: &T, request: &EchoRequest) -> PingIdentifier {
        if self.variant.rewrites_identifier() {
            if let Ok(addr) = transport.local_addr() {
                return PingIdentifier(addr.port());
            }
        }
        request.identifier()
    }

    /// Release the OS socket. Calling it again does nothing.
    pub fn close(&mut self) {
        if self.transport.take().is_some() {
            trace!(variant = ?self.variant, "closed icmp socket");
        }
    }
}

impl<T: Transport, C: PacketCodec> Drop for IcmpSocket<T, C> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens the socket a round runs on.
pub trait SocketOpener {
    type Transport: Transport;

    fn open(&self, kind: ICMP, config: &Config) -> Result<IcmpSocket<Self::Transport>>;
}

/// Opens real OS sockets.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemOpener;

impl SocketOpener for SystemOpener {
    type Transport = UdpSocket;

    fn open(&self, kind: ICMP, config: &Config) -> Result<IcmpSocket<UdpSocket>> {
        IcmpSocket::new(kind, config)
    }
}


#[cfg(test)]
mod tests {
    use std::net::IpAddr;

    use super::mock::{Counters, MockTransport, Plan};
    use super::*;
    use crate::icmp::tests::{echo_reply_v4, ipv4_datagram};
    use crate::icmp::{PingSequence, ReplyKind};

    fn host() -> IpAddr {
        "192.0.2.10".parse().unwrap()
    }

    fn reply(ident: u16, seq: u16) -> Vec<u8> {
        ipv4_datagram(&echo_reply_v4(ident, seq, &[0; 8]))
    }

    fn request(ident: u16, seq: u16) -> EchoRequest {
        EchoRequest::new(host(), PingIdentifier(ident), PingSequence(seq), vec![0; 8])
    }

    fn socket(transport: MockTransport) -> IcmpSocket<MockTransport> {
        IcmpSocket::from_transport(transport, SocketVariant::RawV4)
    }

    #[test]
    fn variant_selection() {
        assert_eq!(SocketVariant::select(ICMP::V4, true), SocketVariant::RawV4);
        assert_eq!(SocketVariant::select(ICMP::V4, false), SocketVariant::DgramV4);
        assert_eq!(SocketVariant::select(ICMP::V6, true), SocketVariant::RawV6);
        assert_eq!(SocketVariant::select(ICMP::V6, false), SocketVariant::DgramV6);
        assert_eq!(SocketVariant::DgramV6.kind(), ICMP::V6);
        assert!(!SocketVariant::DgramV4.is_privileged());
    }

    #[test]
    fn header_restoration_per_variant() {
        assert_eq!(SocketVariant::RawV4.stripped_header_len(), 0);
        assert_eq!(SocketVariant::RawV6.stripped_header_len(), 0);
        assert_eq!(SocketVariant::DgramV6.stripped_header_len(), 0);
        if cfg!(target_os = "linux") {
            assert_eq!(SocketVariant::DgramV4.stripped_header_len(), 20);
            assert!(SocketVariant::DgramV4.rewrites_identifier());
        } else {
            assert_eq!(SocketVariant::DgramV4.stripped_header_len(), 0);
        }
        assert!(!SocketVariant::RawV4.rewrites_identifier());
    }

    #[tokio::test(start_paused = true)]
    async fn closed_socket_fails_before_io() {
        let transport = MockTransport::new(vec![]);
        let counters = transport.counters();
        let mut socket = socket(transport);
        socket.close();

        assert!(matches!(
            socket.receive(None, Duration::from_secs(1)).await,
            Err(PingError::SocketUnavailable)
        ));
        assert!(matches!(
            socket.send(&mut request(1, 0)).await,
            Err(PingError::SocketUnavailable)
        ));
        assert_eq!(Counters::get(&counters.recvs), 0);
        assert_eq!(Counters::get(&counters.sends), 0);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let transport = MockTransport::new(vec![]);
        let counters = transport.counters();
        let mut socket = socket(transport);
        assert!(!socket.is_closed());
        socket.close();
        assert!(socket.is_closed());
        assert_eq!(Counters::get(&counters.live), 0);
        socket.close();
        assert!(socket.is_closed());
        drop(socket);
        assert_eq!(Counters::get(&counters.live), 0);
    }

    #[tokio::test]
    async fn drop_releases_transport() {
        let transport = MockTransport::new(vec![]);
        let counters = transport.counters();
        drop(socket(transport));
        assert_eq!(Counters::get(&counters.live), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unconstrained_receive_returns_first_reply() {
        let transport = MockTransport::new(vec![]);
        transport.inject(Duration::from_millis(5), reply(1234, 77), host());
        transport.inject(Duration::from_millis(6), reply(1, 0), host());
        let socket = socket(transport);

        let reply = socket.receive(None, Duration::from_secs(1)).await.unwrap();
        assert_eq!(reply.identifier, PingIdentifier(1234));
        assert_eq!(reply.sequence, PingSequence(77));
        assert_eq!(reply.source, host());
    }

    #[tokio::test(start_paused = true)]
    async fn mismatched_replies_do_not_end_the_wait() {
        let transport = MockTransport::new(vec![]);
        transport.inject(Duration::from_millis(50), reply(7, 1), host());
        transport.inject(Duration::from_millis(60), reply(8, 0), host());
        transport.inject(Duration::from_millis(100), reply(7, 0), host());
        let socket = socket(transport);

        let expected = request(7, 0);
        let start = Instant::now();
        let reply = socket
            .receive(Some(&expected), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(reply.identifier, PingIdentifier(7));
        assert_eq!(reply.sequence, PingSequence(0));
        assert_eq!(reply.receive_time - start, Duration::from_millis(100));
        assert_eq!(start.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn mismatch_does_not_push_back_the_deadline() {
        let transport = MockTransport::new(vec![]);
        transport.inject(Duration::from_millis(1500), reply(7, 9), host());
        transport.inject(Duration::from_millis(2500), reply(7, 0), host());
        let socket = socket(transport);

        let expected = request(7, 0);
        let start = Instant::now();
        let result = socket.receive(Some(&expected), Duration::from_secs(2)).await;
        match result {
            Err(PingError::Timeout { timeout }) => assert_eq!(timeout, Duration::from_secs(2)),
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn unrelated_traffic_cannot_starve_the_timeout() {
        let transport = MockTransport::new(vec![]);
        for i in 1..500 {
            transport.inject(Duration::from_millis(i * 10), reply(99, i as u16), host());
        }
        let socket = socket(transport);

        let start = Instant::now();
        let result = socket
            .receive(Some(&request(7, 0)), Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(PingError::Timeout { .. })));
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_datagrams_are_skipped() {
        let transport = MockTransport::new(vec![]);
        transport.inject(Duration::from_millis(1), vec![0xde, 0xad], host());
        transport.inject(Duration::from_millis(2), reply(3, 3), host());
        let socket = socket(transport);

        let reply = socket.receive(None, Duration::from_secs(1)).await.unwrap();
        assert_eq!(reply.sequence, PingSequence(3));
    }

    #[tokio::test(start_paused = true)]
    async fn read_errors_surface_as_socket_errors() {
        let transport = MockTransport::new(vec![]);
        transport.inject_error(Duration::from_millis(5), io::ErrorKind::ConnectionRefused);
        let socket = socket(transport);

        match socket.receive(None, Duration::from_secs(1)).await {
            Err(PingError::Socket(err)) => {
                assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
            }
            other => panic!("expected socket error, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn send_then_receive_round_trip() {
        let transport = MockTransport::new(vec![Plan::Reply(Duration::from_millis(12))]);
        let counters = transport.counters();
        let socket = socket(transport);

        let mut request = request(5, 0);
        let built_at = request.send_time();
        tokio::time::sleep(Duration::from_millis(40)).await;
        socket.send(&mut request).await.unwrap();
        assert_eq!(request.send_time() - built_at, Duration::from_millis(40));
        let reply = socket
            .receive(Some(&request), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(reply.kind(), ReplyKind::EchoReply);
        assert_eq!(
            reply.receive_time - request.send_time(),
            Duration::from_millis(12)
        );
        assert_eq!(Counters::get(&counters.sends), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn send_errors_surface_as_socket_errors() {
        let socket = socket(MockTransport::new(vec![Plan::FailSend]));
        assert!(matches!(
            socket.send(&mut request(5, 0)).await,
            Err(PingError::Socket(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn error_replies_are_returned_not_raised() {
        let socket = socket(MockTransport::new(vec![Plan::Unreachable(Duration::from_millis(3))]));
        let mut request = request(5, 2);
        socket.send(&mut request).await.unwrap();
        let reply = socket
            .receive(Some(&request), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(reply.kind(), ReplyKind::DestinationUnreachable);
        assert!(matches!(
            reply.raise_for_status(),
            Err(PingError::DestinationUnreachable { code: 1, .. })
        ));
    }
}
