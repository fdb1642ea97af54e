//! Default values shared by the CLI definition and validation.

/// Capture rate the WebRTC-style VAD and whisper both handle well.
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

/// Frame duration handed to the VAD per classification.
pub const DEFAULT_CHUNK_DURATION_MS: u64 = 30;

/// Strictest VAD profile; fewest false speech positives.
pub const DEFAULT_VAD_AGGRESSIVENESS: u8 = 3;

/// Pre-roll window kept ahead of the trigger so the first phoneme survives
/// classifier lag.
pub const DEFAULT_PADDING_MS: u64 = 300;

/// Trailing silence that closes an utterance. The single most consequential
/// tuning knob: shorter cuts latency, longer avoids splitting a sentence on
/// a breath pause.
pub const DEFAULT_SILENCE_TIMEOUT_MS: u64 = 1_500;

/// Bounded frame channel between the device callback and the capture loop.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

pub const MAX_SILENCE_TIMEOUT_MS: u64 = 30_000;
pub const MAX_PADDING_MS: u64 = 5_000;

/// Rates the earshot detector accepts.
pub const SUPPORTED_SAMPLE_RATES: [u32; 4] = [8_000, 16_000, 32_000, 48_000];

/// Frame durations the earshot detector accepts.
pub const SUPPORTED_CHUNK_DURATIONS_MS: [u64; 3] = [10, 20, 30];
