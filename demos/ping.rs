use std::net::IpAddr;
use std::time::Duration;

use ping_round::{Config, PingIdentifier, Pinger};
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(name = "ping-round")]
struct Opt {
    #[structopt(short = "h", long)]
    host: String,

    /// Wait interval seconds between sending each packet.  The default is to wait for one second
    /// between each packet.
    #[structopt(short = "i", long, default_value = "1.0")]
    interval: f64,

    /// Time to wait for each response, in seconds.
    #[structopt(short = "W", long, default_value = "2.0")]
    timeout: f64,

    /// Specify the number of data bytes to be sent.  The default is 56, which translates into 64 ICMP
    /// data bytes when combined with the 8 bytes of ICMP header data.
    #[structopt(short = "s", long, default_value = "56")]
    size: usize,

    /// Stop after sending count ECHO_REQUEST packets.
    #[structopt(short = "c", long, default_value = "4")]
    count: u16,

    /// Identifier carried by every request of the round.
    #[structopt(long, default_value = "0")]
    ident: u16,

    /// Send from this local address.
    #[structopt(short = "S", long)]
    source: Option<IpAddr>,

    /// Bind the socket to this interface (Linux only).
    #[structopt(short = "I", long)]
    iface: Option<String>,

    /// Use an unprivileged datagram ICMP socket instead of a raw one.
    #[structopt(short = "u", long)]
    unprivileged: bool,
}

#[tokio::main]
async fn main() {
    pretty_env_logger::init();
    let opt = Opt::from_args();

    let mut config_builder = Config::builder()
        .count(opt.count)
        .interval(Duration::from_secs_f64(opt.interval))
        .timeout(Duration::from_secs_f64(opt.timeout))
        .payload_size(opt.size)
        .identifier(PingIdentifier(opt.ident))
        .privileged(!opt.unprivileged);
    if let Some(source) = opt.source {
        config_builder = config_builder.source(source);
    }
    if let Some(interface) = &opt.iface {
        config_builder = config_builder.interface(interface);
    }
    let config = config_builder.build();

    match Pinger::new().measure(&opt.host, &config).await {
        Ok(host) => {
            println!("\n--- {} ({}) ping statistics ---", opt.host, host.address);
            println!(
                "{} packets transmitted, {} packets received, {:.2}% packet loss",
                host.stats.packets_sent,
                host.stats.packets_received,
                host.packet_loss() * 100_f64
            );
            if host.is_alive() {
                println!(
                    "round-trip min/avg/max/jitter = {:.3}/{:.3}/{:.3}/{:.3} ms",
                    host.stats.min_rtt,
                    host.stats.avg_rtt,
                    host.stats.max_rtt,
                    host.jitter()
                );
            }
        }
        Err(e) => println!("{}", e),
    }
}
