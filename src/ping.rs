use std::{net::IpAddr, time::Duration};

use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::{
    config::Config,
    error::{PingError, Result},
    host::HostResult,
    icmp::{EchoRequest, PingSequence, ICMP},
    resolver::{Resolver, SystemResolver},
    socket::{IcmpSocket, SocketOpener, SystemOpener, Transport},
};

/// A Pinger runs measurement rounds: resolve the host, open one socket, send `count` probes
/// one after another and summarize what came back.
#[derive(Debug, Clone, Default)]
pub struct Pinger<R = SystemResolver, O = SystemOpener> {
    resolver: R,
    opener: O,
}

impl Pinger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<R: Resolver, O: SocketOpener> Pinger<R, O> {
    /// Use a custom resolver and socket opener.
    pub fn with(resolver: R, opener: O) -> Self {
        Pinger { resolver, opener }
    }

    /// Measure one round against `address`.
    ///
    /// Lost probes (timeouts, socket errors, ICMP error replies) only show up in the returned
    /// statistics. Resolution and socket construction failures, or a closed socket, abort the
    /// round. The socket is released on every path, including when this future is dropped.
    pub async fn measure(&self, address: &str, config: &Config) -> Result<HostResult> {
        let host = self.resolver.resolve(address).await?;
        let mut socket = self.opener.open(ICMP::from(host), config)?;
        let result = run_round(&socket, host, config).await;
        socket.close();

        let result = result?;
        debug!(
            %host,
            sent = result.stats.packets_sent,
            received = result.stats.packets_received,
            min = result.stats.min_rtt,
            avg = result.stats.avg_rtt,
            max = result.stats.max_rtt,
            "round finished"
        );
        Ok(result)
    }
}

async fn run_round<T: Transport>(
    socket: &IcmpSocket<T>,
    host: IpAddr,
    config: &Config,
) -> Result<HostResult> {
    let payload = config.payload();
    let mut packets_sent = 0u32;
    let mut rtts = Vec::with_capacity(config.count as usize);

    for seq in 0..config.count {
        let mut request =
            EchoRequest::new(host, config.identifier, PingSequence(seq), payload.clone());
        match probe(socket, &mut request, config.timeout, &mut packets_sent).await {
            Ok(rtt) => {
                let rtt = rtt.as_nanos() as f64 / 1_000_000.0;
                debug!(%host, %seq, rtt, "probe answered");
                rtts.push(rtt);
            }
            Err(PingError::Socket(err)) => warn!(%host, %seq, %err, "probe lost"),
            Err(err) if err.is_probe_loss() => debug!(%host, %seq, %err, "probe lost"),
            Err(err) => return Err(err),
        }

        if seq + 1 < config.count {
            sleep(config.interval).await;
        }
    }

    Ok(HostResult::new(host, packets_sent, rtts))
}

async fn probe<T: Transport>(
    socket: &IcmpSocket<T>,
    request: &mut EchoRequest,
    wait: Duration,
    packets_sent: &mut u32,
) -> Result<Duration> {
    match timeout(wait, socket.send(request)).await {
        Ok(sent) => sent?,
        Err(_) => return Err(PingError::Timeout { timeout: wait }),
    }
    *packets_sent += 1;

    let reply = socket.receive(Some(&*request), wait).await?;
    reply.raise_for_status()?;
    Ok(reply
        .receive_time
        .saturating_duration_since(request.send_time()))
}
