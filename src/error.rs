use std::{io, net::IpAddr, time::Duration};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PingError>;

/// An error resulting from resolving a host, building a socket or running a probe.
///
/// Only the variants reported by [`PingError::is_probe_loss`] are recovered inside a
/// measurement round; every other variant aborts it.
#[derive(Error, Debug)]
pub enum PingError {
    #[error("failed to resolve host `{0}`")]
    NameLookup(String),
    #[error("insufficient privileges to open an icmp socket: {0}")]
    Permission(#[source] io::Error),
    #[error("failed to create icmp socket: {0}")]
    SocketConstruction(#[source] io::Error),
    #[error("no reply received within {timeout:?}")]
    Timeout { timeout: Duration },
    #[error("icmp socket error: {0}")]
    Socket(#[source] io::Error),
    #[error("destination unreachable reported by {host} (code {code})")]
    DestinationUnreachable { host: IpAddr, code: u8 },
    #[error("time exceeded reported by {host} (code {code})")]
    TimeExceeded { host: IpAddr, code: u8 },
    #[error("unexpected icmp reply (type {icmp_type}, code {icmp_code})")]
    UnexpectedReply { icmp_type: u8, icmp_code: u8 },
    #[error("icmp socket is closed")]
    SocketUnavailable,
    #[error("buffer size was too small")]
    IncorrectBufferSize,
}

impl PingError {
    /// Whether this error only costs the current probe.
    pub fn is_probe_loss(&self) -> bool {
        matches!(
            self,
            PingError::Timeout { .. }
                | PingError::Socket(_)
                | PingError::DestinationUnreachable { .. }
                | PingError::TimeExceeded { .. }
                | PingError::UnexpectedReply { .. }
        )
    }

    pub(crate) fn from_construction(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::PermissionDenied {
            PingError::Permission(err)
        } else {
            PingError::SocketConstruction(err)
        }
    }
}
