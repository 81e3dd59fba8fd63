use std::net::IpAddr;

/// Packet counters and round-trip times of one measurement round, in milliseconds.
///
/// All three RTT figures are `0.0` when nothing came back.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RoundStats {
    pub packets_sent: u32,
    pub packets_received: u32,
    pub min_rtt: f64,
    pub avg_rtt: f64,
    pub max_rtt: f64,
}

/// Outcome of measuring one host. An unreachable host is a result with no replies, not an error.
#[derive(Debug, Clone, PartialEq)]
pub struct HostResult {
    pub address: IpAddr,
    pub stats: RoundStats,
    /// Round-trip time of every answered probe, in sending order.
    pub rtts: Vec<f64>,
}

impl HostResult {
    pub(crate) fn new(address: IpAddr, packets_sent: u32, rtts: Vec<f64>) -> Self {
        let packets_received = rtts.len() as u32;
        let mut stats = RoundStats {
            packets_sent,
            packets_received,
            ..RoundStats::default()
        };
        if !rtts.is_empty() {
            let min = rtts.iter().copied().fold(f64::INFINITY, f64::min);
            let max = rtts.iter().copied().fold(0.0, f64::max);
            let avg = rtts.iter().sum::<f64>() / rtts.len() as f64;
            stats.min_rtt = min;
            stats.max_rtt = max;
            // summation error must not push the mean outside the observed range
            stats.avg_rtt = avg.clamp(min, max);
        }
        HostResult {
            address,
            stats,
            rtts,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.stats.packets_received > 0
    }

    /// Share of sent probes left unanswered, between 0 and 1.
    pub fn packet_loss(&self) -> f64 {
        if self.stats.packets_sent == 0 {
            return 0.0;
        }
        1.0 - f64::from(self.stats.packets_received) / f64::from(self.stats.packets_sent)
    }

    /// Mean absolute difference between consecutive round-trip times.
    pub fn jitter(&self) -> f64 {
        if self.rtts.len() < 2 {
            return 0.0;
        }
        let total: f64 = self
            .rtts
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).abs())
            .sum();
        total / (self.rtts.len() - 1) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> IpAddr {
        "198.51.100.4".parse().unwrap()
    }

    #[test]
    fn empty_round_is_all_zero() {
        let host = HostResult::new(addr(), 3, vec![]);
        assert_eq!(
            host.stats,
            RoundStats {
                packets_sent: 3,
                packets_received: 0,
                min_rtt: 0.0,
                avg_rtt: 0.0,
                max_rtt: 0.0,
            }
        );
        assert!(!host.is_alive());
        assert_eq!(host.packet_loss(), 1.0);
        assert_eq!(host.jitter(), 0.0);
    }

    #[test]
    fn stats_from_samples() {
        let host = HostResult::new(addr(), 4, vec![10.0, 20.0, 15.0, 5.0]);
        assert_eq!(host.stats.packets_received, 4);
        assert_eq!(host.stats.min_rtt, 5.0);
        assert_eq!(host.stats.avg_rtt, 12.5);
        assert_eq!(host.stats.max_rtt, 20.0);
        assert_eq!(host.packet_loss(), 0.0);
        // |20-10| + |15-20| + |5-15| over three gaps
        assert!((host.jitter() - 25.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn mean_stays_within_bounds() {
        let host = HostResult::new(addr(), 3, vec![0.1, 0.1, 0.1]);
        assert!(host.stats.min_rtt <= host.stats.avg_rtt);
        assert!(host.stats.avg_rtt <= host.stats.max_rtt);
    }

    #[test]
    fn nothing_sent_means_no_loss() {
        let host = HostResult::new(addr(), 0, vec![]);
        assert_eq!(host.packet_loss(), 0.0);
    }
}
