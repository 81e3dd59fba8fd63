//! Asynchronous ICMP echo engine.
//!
//! One call measures one host: the name is resolved, a single raw or datagram ICMP socket is
//! opened for its address family, `count` echo requests are sent one at a time and every reply
//! is matched to its request by identifier and sequence before its round-trip time is counted.
//!
//! ```no_run
//! use std::time::Duration;
//! use ping_round::{ping, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ping_round::PingError> {
//!     let config = Config::builder()
//!         .count(4)
//!         .timeout(Duration::from_secs(1))
//!         .privileged(false)
//!         .build();
//!     let host = ping("1.1.1.1", &config).await?;
//!     println!("{} alive={} avg={:.2}ms", host.address, host.is_alive(), host.stats.avg_rtt);
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod host;
mod icmp;
mod ping;
mod resolver;
mod socket;

pub use config::{Config, ConfigBuilder};
pub use error::{PingError, Result};
pub use host::{HostResult, RoundStats};
pub use icmp::icmpv4::make_icmpv4_echo_packet;
pub use icmp::icmpv6::make_icmpv6_echo_packet;
pub use icmp::{
    restore_ip_header, EchoReply, EchoRequest, IcmpCodec, PacketCodec, PingIdentifier,
    PingSequence, ReplyKind, ICMP,
};
pub use ping::Pinger;
pub use resolver::{Resolver, SystemResolver};
pub use socket::{IcmpSocket, SocketOpener, SocketVariant, SystemOpener, Transport};

/// Measure one round against `address` with the system resolver and real sockets.
pub async fn ping(address: &str, config: &Config) -> Result<HostResult> {
    Pinger::new().measure(address, config).await
}
