//! flowwatch-produce: synthetic flow events as JSON lines on stdout, for
//! feeding the consumer.

use clap::Parser;
use flowwatch::{config::AppConfig, flow::FlowGenerator, logging::StructuredLogger};
use std::io::Write;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "flowwatch-produce")]
#[command(about = "Emit synthetic flow events as JSON lines", long_about = None)]
struct Args {
    /// Number of events; runs until interrupted when omitted
    #[arg(short, long)]
    count: Option<u64>,

    /// Delay between events
    #[arg(long, default_value = "100")]
    interval_ms: u64,

    /// Probability that an event is anomalous
    #[arg(long, default_value = "0.05")]
    anomaly_rate: f64,

    /// RNG seed
    #[arg(long, default_value = "42")]
    seed: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    let config = AppConfig::from_env();
    StructuredLogger::init(config.log.json, &config.log.level);

    static STOP: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);
    let _ = ctrlc::set_handler(|| {
        STOP.store(true, std::sync::atomic::Ordering::Relaxed);
    });

    info!(count = ?args.count, anomaly_rate = args.anomaly_rate, "producing flow events");
    let mut generator = FlowGenerator::new(args.seed);
    let stdout = std::io::stdout();
    let mut sent: u64 = 0;
    while !STOP.load(std::sync::atomic::Ordering::Relaxed) {
        if args.count.is_some_and(|n| sent >= n) {
            break;
        }
        let flow = generator.next_flow(args.anomaly_rate);
        StructuredLogger::emit_json(&flow, &mut stdout.lock())?;
        stdout.lock().flush()?;
        sent += 1;
        if args.interval_ms > 0 {
            std::thread::sleep(Duration::from_millis(args.interval_ms));
        }
    }
    info!(sent, "producer stopped");
    Ok(())
}
