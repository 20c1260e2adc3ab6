//! Tracing setup shared by every binary, plus a one-line JSON emitter for reports.

use serde::Serialize;
use std::io::Write;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub struct StructuredLogger;

impl StructuredLogger {
    /// Install the global subscriber writing to stderr, so stdout stays free
    /// for reports and produced events. `RUST_LOG` overrides `default_level`.
    pub fn init(json: bool, default_level: &str) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        if json {
            let fmt = tracing_subscriber::fmt::layer()
                .json()
                .with_span_events(FmtSpan::NONE)
                .with_writer(std::io::stderr);
            tracing_subscriber::registry().with(filter).with(fmt).init();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    /// Write `value` as a single JSON line.
    pub fn emit_json(value: &impl Serialize, w: &mut impl Write) -> std::io::Result<()> {
        let line = serde_json::to_string(value)?;
        writeln!(w, "{}", line)
    }
}
