//! Rotating temp-file debug log.
//!
//! Transcripts own stdout, so diagnostics never go to the terminal; they
//! land in a temp file that is truncated once it grows past a size cap.
//! Lines that may carry user content (transcript snippets) are gated behind
//! a separate opt-in flag.

use crate::config::AppConfig;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::panic::PanicHookInfo;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

const MAX_LOG_BYTES: u64 = 5 * 1024 * 1024;

static LOG_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_CONTENT_ENABLED: AtomicBool = AtomicBool::new(false);
static WRITER: OnceLock<Mutex<Option<RotatingLog>>> = OnceLock::new();

/// Path of the debug log, shared across runs.
pub fn log_file_path() -> PathBuf {
    std::env::temp_dir().join("uttercap_debug.log")
}

struct RotatingLog {
    path: PathBuf,
    file: File,
    written: u64,
}

impl RotatingLog {
    fn open(path: PathBuf) -> Option<Self> {
        let mut written = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        if written > MAX_LOG_BYTES {
            let _ = fs::remove_file(&path);
            written = 0;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path).ok()?;
        Some(Self {
            path,
            file,
            written,
        })
    }

    fn append(&mut self, line: &str) {
        if self.written.saturating_add(line.len() as u64) > MAX_LOG_BYTES {
            match OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.path)
            {
                Ok(fresh) => {
                    self.file = fresh;
                    self.written = 0;
                }
                Err(_) => return,
            }
        }
        if self.file.write_all(line.as_bytes()).is_ok() {
            self.written = self.written.saturating_add(line.len() as u64);
        }
    }
}

fn writer() -> &'static Mutex<Option<RotatingLog>> {
    WRITER.get_or_init(|| Mutex::new(None))
}

/// Apply the logging flags. `--no-logs` wins over everything else.
pub fn init_logging(config: &AppConfig) {
    let enabled = (config.logs || config.log_timings) && !config.no_logs;
    LOG_ENABLED.store(enabled, Ordering::Relaxed);
    LOG_CONTENT_ENABLED.store(enabled && config.log_content, Ordering::Relaxed);

    let mut guard = writer().lock().unwrap_or_else(|e| e.into_inner());
    *guard = if enabled {
        RotatingLog::open(log_file_path())
    } else {
        None
    };
}

/// Append one diagnostic line to the debug log.
pub fn log_debug(msg: &str) {
    if !LOG_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let mut guard = writer().lock().unwrap_or_else(|e| e.into_inner());
    if let Some(log) = guard.as_mut() {
        log.append(&format!("[{now}] {msg}\n"));
    }
}

/// Like [`log_debug`] but for lines carrying user content; dropped unless
/// content logging was opted into.
pub fn log_debug_content(msg: &str) {
    if LOG_CONTENT_ENABLED.load(Ordering::Relaxed) {
        log_debug(msg);
    }
}

/// Panic hook target: record the location, and the payload only when
/// content logging is on.
pub fn log_panic(info: &PanicHookInfo<'_>) {
    if !LOG_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    let location = match info.location() {
        Some(loc) => format!("{}:{}", loc.file(), loc.line()),
        None => "unknown".to_string(),
    };
    let payload = if !LOG_CONTENT_ENABLED.load(Ordering::Relaxed) {
        "panic payload omitted (log-content disabled)".to_string()
    } else if let Some(text) = info.payload().downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = info.payload().downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    };
    log_debug(&format!(
        "panic at {location}: {payload} (v{})",
        env!("CARGO_PKG_VERSION")
    ));
}
