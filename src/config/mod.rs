//! Command-line parsing and validation helpers.

mod defaults;
#[cfg(test)]
mod tests;
mod validation;

use clap::Parser;
use std::path::PathBuf;

pub use defaults::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_CHUNK_DURATION_MS, DEFAULT_PADDING_MS, DEFAULT_SAMPLE_RATE,
    DEFAULT_SILENCE_TIMEOUT_MS, DEFAULT_VAD_AGGRESSIVENESS, MAX_SILENCE_TIMEOUT_MS,
    SUPPORTED_CHUNK_DURATIONS_MS, SUPPORTED_SAMPLE_RATES,
};

/// CLI options for the uttercap listener. Validated values keep the capture
/// loop and the whisper collaborator safe.
#[derive(Debug, Parser, Clone)]
#[command(
    about = "uttercap: VAD-gated microphone listener that emits one WAV per utterance",
    author,
    version
)]
pub struct AppConfig {
    /// Preferred audio input device name
    #[arg(long = "input-device")]
    pub input_device: Option<String>,

    /// Print detected audio input devices and exit
    #[arg(long = "list-input-devices", default_value_t = false)]
    pub list_input_devices: bool,

    /// Capture sample rate in Hz (8000, 16000, 32000, or 48000)
    #[arg(long = "sample-rate", default_value_t = DEFAULT_SAMPLE_RATE)]
    pub sample_rate: u32,

    /// Frame duration fed to the VAD (10, 20, or 30 ms)
    #[arg(long = "chunk-duration-ms", default_value_t = DEFAULT_CHUNK_DURATION_MS)]
    pub chunk_duration_ms: u64,

    /// VAD aggressiveness, 0 (most permissive) through 3 (strictest)
    #[arg(long = "vad-aggressiveness", default_value_t = DEFAULT_VAD_AGGRESSIVENESS)]
    pub vad_aggressiveness: u8,

    /// Pre-roll retained before the triggering speech frame (milliseconds)
    #[arg(long = "padding-ms", default_value_t = DEFAULT_PADDING_MS)]
    pub padding_ms: u64,

    /// Trailing silence that closes an utterance (milliseconds)
    #[arg(long = "silence-timeout-ms", default_value_t = DEFAULT_SILENCE_TIMEOUT_MS)]
    pub silence_timeout_ms: u64,

    /// Frame channel capacity between the device callback and the capture loop
    #[arg(long = "channel-capacity", default_value_t = DEFAULT_CHANNEL_CAPACITY)]
    pub channel_capacity: usize,

    /// Directory for utterance WAV files (defaults to the OS temp dir)
    #[arg(long = "utterance-dir")]
    pub utterance_dir: Option<PathBuf>,

    /// Append finished transcripts to this file
    #[arg(long = "transcript-file")]
    pub transcript_file: Option<PathBuf>,

    /// Whisper model path (GGML format); omit to save WAVs without transcribing
    #[arg(long = "whisper-model-path", env = "UTTERCAP_WHISPER_MODEL")]
    pub whisper_model_path: Option<String>,

    /// Transcription language hint ("auto" enables language detection)
    #[arg(long, default_value = "auto")]
    pub lang: String,

    /// Whisper beam size (>1 enables beam search)
    #[arg(long = "whisper-beam-size", default_value_t = 0)]
    pub whisper_beam_size: u32,

    /// Whisper temperature
    #[arg(long = "whisper-temperature", default_value_t = 0.0)]
    pub whisper_temperature: f32,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "UTTERCAP_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "UTTERCAP_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Allow logging transcript snippets (debug log only)
    #[arg(
        long = "log-content",
        env = "UTTERCAP_LOG_CONTENT",
        default_value_t = false
    )]
    pub log_content: bool,

    /// Enable verbose timing logs
    #[arg(long)]
    pub log_timings: bool,
}
