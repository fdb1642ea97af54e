//! Structured JSON tracing, written to a side file so the terminal stays
//! reserved for transcripts.

use crate::config::AppConfig;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_subscriber::fmt::time::UtcTime;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Trace file destination; overridable for tooling that tails it.
pub fn trace_log_path() -> PathBuf {
    match std::env::var("UTTERCAP_TRACE_LOG") {
        Ok(path) => PathBuf::from(path),
        Err(_) => std::env::temp_dir().join("uttercap_trace.jsonl"),
    }
}

/// Install the JSON subscriber once, gated by the same flags as the debug
/// log. Failure to open the trace file disables tracing silently; telemetry
/// must never take the listener down.
pub fn init_tracing(config: &AppConfig) {
    if config.no_logs || !(config.logs || config.log_timings) {
        return;
    }
    TRACING_INIT.get_or_init(|| {
        let Ok(file) = OpenOptions::new()
            .create(true)
            .append(true)
            .open(trace_log_path())
        else {
            return;
        };
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_timer(UtcTime::rfc_3339())
            .with_writer(file)
            .with_target(false)
            .with_current_span(false)
            .with_span_list(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
