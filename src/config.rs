use std::{net::IpAddr, time::Duration};

use crate::icmp::PingIdentifier;

const DEFAULT_PAYLOAD_SIZE: usize = 56;

/// Config is the packaging of one measurement round: how many probes, how they are paced,
/// and how the socket carrying them is set up.
#[derive(Debug, Clone)]
pub struct Config {
    pub count: u16,
    pub interval: Duration,
    pub timeout: Duration,
    pub identifier: PingIdentifier,
    pub source: Option<IpAddr>,
    pub privileged: bool,
    pub payload_size: usize,
    pub payload: Option<Vec<u8>>,
    pub ttl: Option<u32>,
    pub interface: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            count: 4,
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(2),
            identifier: PingIdentifier(0),
            source: None,
            privileged: true,
            payload_size: DEFAULT_PAYLOAD_SIZE,
            payload: None,
            ttl: None,
            interface: None,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Bytes carried by every echo request of the round.
    pub fn payload(&self) -> Vec<u8> {
        match &self.payload {
            Some(payload) => payload.clone(),
            None => vec![0; self.payload_size],
        }
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Number of echo requests sent in the round. (default: 4)
    pub fn count(mut self, count: u16) -> Self {
        self.config.count = count;
        self
    }

    /// Pause between two consecutive probes. (default: 1s)
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// How long each probe waits for its reply. (default: 2s)
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn identifier(mut self, identifier: PingIdentifier) -> Self {
        self.config.identifier = identifier;
        self
    }

    /// Pick a random identifier so concurrent rounds on one host do not share replies.
    pub fn random_identifier(mut self) -> Self {
        self.config.identifier = PingIdentifier(rand::random());
        self
    }

    /// Binds the socket to this local address before sending.
    ///
    /// This function directly corresponds to the `bind(2)` function on Windows
    /// and Unix.
    pub fn source(mut self, source: IpAddr) -> Self {
        self.config.source = Some(source);
        self
    }

    /// Use a raw socket (`true`, needs elevated privileges) or an unprivileged
    /// datagram ICMP socket (`false`). (default: true)
    pub fn privileged(mut self, privileged: bool) -> Self {
        self.config.privileged = privileged;
        self
    }

    /// Number of data bytes sent after the ICMP header. (default: 56)
    pub fn payload_size(mut self, size: usize) -> Self {
        self.config.payload_size = size;
        self
    }

    /// Exact data bytes to send; takes precedence over `payload_size`.
    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.config.payload = Some(payload.to_vec());
        self
    }

    /// Set the value of the `IP_TTL` option (or the IPv6 unicast hop limit) for the socket.
    pub fn ttl(mut self, ttl: u32) -> Self {
        self.config.ttl = Some(ttl);
        self
    }

    /// Sets the value for the `SO_BINDTODEVICE` option on this socket.
    ///
    /// If a socket is bound to an interface, only packets received from that
    /// particular interface are processed by the socket. Only honored on Linux,
    /// Android and Fuchsia.
    pub fn interface(mut self, interface: &str) -> Self {
        self.config.interface = Some(interface.to_string());
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
