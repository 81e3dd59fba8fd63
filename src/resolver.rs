use std::{future::Future, net::IpAddr};

use tokio::net::lookup_host;
use tracing::debug;

use crate::error::{PingError, Result};

/// Turns a user supplied host into the address a round is measured against.
pub trait Resolver {
    fn resolve(&self, name: &str) -> impl Future<Output = Result<IpAddr>> + Send;
}

/// Resolves through the system resolver, preferring IPv4 over IPv6.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    async fn resolve(&self, name: &str) -> Result<IpAddr> {
        if let Ok(addr) = name.parse::<IpAddr>() {
            return Ok(addr);
        }

        let addrs: Vec<IpAddr> = match lookup_host((name, 0)).await {
            Ok(addrs) => addrs.map(|addr| addr.ip()).collect(),
            Err(err) => {
                debug!(name, %err, "host lookup failed");
                return Err(PingError::NameLookup(name.to_string()));
            }
        };
        let addr = addrs
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| PingError::NameLookup(name.to_string()))?;
        debug!(name, %addr, "resolved host");
        Ok(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn numeric_addresses_skip_lookup() {
        let resolver = SystemResolver;
        assert_eq!(
            resolver.resolve("192.0.2.1").await.unwrap(),
            "192.0.2.1".parse::<IpAddr>().unwrap()
        );
        assert_eq!(
            resolver.resolve("2001:db8::5").await.unwrap(),
            "2001:db8::5".parse::<IpAddr>().unwrap()
        );
    }

    #[tokio::test]
    async fn localhost_resolves() {
        let addr = SystemResolver.resolve("localhost").await.unwrap();
        assert!(addr.is_loopback());
    }

    #[tokio::test]
    async fn garbage_fails_with_name_lookup() {
        match SystemResolver.resolve("no-such-host.invalid").await {
            Err(PingError::NameLookup(name)) => assert_eq!(name, "no-such-host.invalid"),
            other => panic!("expected lookup failure, got {:?}", other),
        }
    }
}
