//! rudp Sender - reliable stream sender
//!
//! Streams a file, stdin, or synthetic data to a receiver over UDP.

use clap::Parser;
use rudp::{ByteSource, DummySource, ReaderSource, Sender};
use rudp_cli::{init_logging, Config, ThroughputReporter};
use rudp_io::UdpConnection;
use std::fs::File;
use std::io::{self, BufReader};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "rudp-sender")]
#[command(about = "Reliable ordered streaming over UDP: sender", long_about = None)]
struct Args {
    /// Receiver IP address
    receiver_ip: IpAddr,

    /// Receiver UDP port
    receiver_port: u16,

    /// Input file ('-' for stdin); streams dummy data when omitted
    #[arg(short, long)]
    file: Option<String>,

    /// Stop after this many packets
    #[arg(short = 'n', long)]
    max_packets: Option<u32>,

    /// Sliding window size in packets
    #[arg(short, long)]
    window: Option<u16>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    debug: bool,

    /// Print throughput statistics
    #[arg(short, long)]
    statistics: bool,
}

fn open_source(input: Option<&str>) -> anyhow::Result<Box<dyn ByteSource>> {
    match input {
        None => {
            tracing::info!("Streaming dummy data");
            Ok(Box::new(DummySource::new()))
        }
        Some("-") => {
            tracing::info!("Streaming stdin");
            Ok(Box::new(ReaderSource::new(io::stdin().lock())))
        }
        Some(path) => {
            tracing::info!("Streaming {}", path);
            Ok(Box::new(ReaderSource::new(BufReader::new(File::open(path)?))))
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let config = Config::load(args.config.as_deref())?;
    let sender_config = config.sender.clone().unwrap_or_default();

    let mut engine = config.transport.to_engine_config()?;
    if let Some(window) = args.window {
        engine.window_size = window;
    }
    if let Some(max_packets) = args.max_packets.or(sender_config.max_packets) {
        engine.max_packets = max_packets;
    }

    let input = args.file.or(sender_config.input);
    let source = open_source(input.as_deref())?;

    let peer = SocketAddr::new(args.receiver_ip, args.receiver_port);
    tracing::info!("rudp sender starting, receiver {}", peer);

    let stats = ThroughputReporter::new(args.statistics, config.transport.stats_interval(), "sent");
    let mut sender = Sender::with_stats(UdpConnection::connect_to(peer), source, engine, stats)?;
    sender.run()?;

    tracing::info!(
        "Sent {} packets ({} retransmits)",
        sender.stats().counters().packets,
        sender.stats().counters().retransmits
    );
    Ok(())
}
