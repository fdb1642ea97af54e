//! VAD-gated microphone capture pipeline.
//!
//! Captures fixed-duration mono 16-bit PCM frames via CPAL, classifies each
//! frame as speech or silence, and assembles complete utterances with a
//! pre-roll ring buffer and a trailing-silence timeout. Finished utterances
//! are persisted as WAV files for the transcription collaborator.

mod capture;
mod dispatch;
mod meter;
mod recorder;
mod segmenter;
mod sink;
#[cfg(test)]
mod tests;
mod vad;

pub use capture::{
    segment_pcm, CaptureConfig, CaptureError, CaptureMetrics, CaptureOutcome, StopReason,
};
pub use meter::LevelMeter;
pub use recorder::{DeviceInfo, Recorder};
pub use segmenter::{Utterance, UtteranceSegmenter};
pub use sink::{write_wav, UtteranceSink};
pub use vad::{Aggressiveness, EarshotVad, VadEngine};
