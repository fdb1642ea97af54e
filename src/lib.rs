pub mod app;
pub mod audio;
pub mod config;
pub mod stt;
pub mod telemetry;
pub mod voice;

pub use app::logging::{init_logging, log_debug, log_debug_content, log_panic};
pub use voice::{start_listener, ListenerJob, ListenerMessage};
