//! rudp Receiver - reliable stream receiver
//!
//! Listens on a UDP port, reassembles the stream in order and writes it to a
//! file or stdout. Can simulate a noisy channel by corrupting received
//! datagrams.

use clap::Parser;
use rudp::{ByteSink, NullSink, Receiver, WriterSink};
use rudp_cli::{init_logging, Config, ThroughputReporter};
use rudp_io::{FaultyConnection, NetworkConnection, UdpConnection};
use std::fs::File;
use std::io::{self, BufWriter};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "rudp-receiver")]
#[command(about = "Reliable ordered streaming over UDP: receiver", long_about = None)]
struct Args {
    /// UDP port to listen on
    port: u16,

    /// Output file ('-' for stdout); discarded when omitted unless --debug
    #[arg(short, long)]
    file: Option<String>,

    /// Sliding window size in packets
    #[arg(short, long)]
    window: Option<u16>,

    /// Corrupt this proportion (0.0 to 1.0) of received datagrams
    #[arg(short, long)]
    perror: Option<f32>,

    /// Seed for reproducible corruption
    #[arg(long)]
    seed: Option<u64>,

    /// Only corrupt DATA packets
    #[arg(long)]
    data_only: bool,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Debug logging; also writes the stream to stdout when no file is given
    #[arg(short, long)]
    debug: bool,

    /// Print throughput statistics
    #[arg(short, long)]
    statistics: bool,
}

fn open_sink(output: Option<&str>, debug: bool) -> anyhow::Result<Box<dyn ByteSink>> {
    match output {
        Some("-") => Ok(Box::new(WriterSink::new(io::stdout().lock()))),
        Some(path) => {
            tracing::info!("Writing stream to {}", path);
            Ok(Box::new(WriterSink::new(BufWriter::new(File::create(path)?))))
        }
        None if debug => Ok(Box::new(WriterSink::new(io::stdout().lock()))),
        None => Ok(Box::new(NullSink::new())),
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let config = Config::load(args.config.as_deref())?;
    let receiver_config = config.receiver.clone().unwrap_or_default();

    let mut engine = config.transport.to_engine_config()?;
    if let Some(window) = args.window {
        engine.window_size = window;
    }

    let output = args.file.or(receiver_config.output);
    let sink = open_sink(output.as_deref(), args.debug)?;

    let bind_addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let mut udp = UdpConnection::listen_on(bind_addr);
    if let Some(size) = receiver_config.recv_buffer_size {
        udp = udp.with_recv_buffer_size(size);
    }

    let error_rate = args.perror.unwrap_or(receiver_config.error_rate);
    let conn: Box<dyn NetworkConnection> = if error_rate > 0.0 {
        let data_only = args.data_only || receiver_config.data_only;
        let seed = args.seed.or(receiver_config.seed);
        tracing::warn!(
            "Corrupting {:.1}% of received datagrams (data only: {}, seed: {:?})",
            error_rate * 100.0,
            data_only,
            seed
        );
        Box::new(FaultyConnection::new(udp, error_rate, data_only, seed))
    } else {
        Box::new(udp)
    };

    tracing::info!("rudp receiver starting on port {}", args.port);

    let stats = ThroughputReporter::new(
        args.statistics,
        config.transport.stats_interval(),
        "received",
    );
    let mut receiver = Receiver::with_stats(conn, sink, engine, stats)?;
    receiver.run()?;

    let counters = receiver.stats().counters();
    tracing::info!(
        "Received {} packets ({} corrupted, {} ignored)",
        counters.packets,
        counters.corrupted,
        counters.ignored
    );
    Ok(())
}
