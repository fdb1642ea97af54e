//! Voice activity classification.
//!
//! Wraps the earshot port of the WebRTC VAD behind a small trait so the
//! segmenter and the offline harness can swap in scripted classifiers. The
//! classifier itself is stateless across frames from the segmenter's point
//! of view; all temporal state lives in the segmenter.

use super::capture::{CaptureConfig, CaptureError};
use earshot::{VoiceActivityDetector, VoiceActivityProfile};

/// WebRTC-style VAD tuning: 0 admits the most audio as speech, 3 the least.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Aggressiveness {
    Quality,
    LowBitrate,
    Aggressive,
    VeryAggressive,
}

impl Aggressiveness {
    /// Clamp an integer level into the four supported profiles.
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => Aggressiveness::Quality,
            1 => Aggressiveness::LowBitrate,
            2 => Aggressiveness::Aggressive,
            _ => Aggressiveness::VeryAggressive,
        }
    }

    fn profile(self) -> VoiceActivityProfile {
        match self {
            Aggressiveness::Quality => VoiceActivityProfile::QUALITY,
            Aggressiveness::LowBitrate => VoiceActivityProfile::LBR,
            Aggressiveness::Aggressive => VoiceActivityProfile::AGGRESSIVE,
            Aggressiveness::VeryAggressive => VoiceActivityProfile::VERY_AGGRESSIVE,
        }
    }
}

/// Per-frame speech/non-speech classifier.
///
/// # Frame Size Contract
/// Frames must span 10, 20, or 30 ms at the configured sample rate
/// (`samples = sample_rate * duration_ms / 1000`). The contract is enforced
/// once at session-open time, never per frame.
pub trait VadEngine: Send {
    fn classify(&mut self, frame: &[i16]) -> bool;
    fn reset(&mut self);
    fn name(&self) -> &'static str {
        "unknown_vad"
    }
}

/// Earshot-backed classifier.
pub struct EarshotVad {
    detector: VoiceActivityDetector,
    sample_rate: u32,
}

impl std::fmt::Debug for EarshotVad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EarshotVad")
            .field("sample_rate", &self.sample_rate)
            .finish_non_exhaustive()
    }
}

impl EarshotVad {
    /// Build a classifier for the session, rejecting configurations the
    /// detector cannot accept. Fail-fast half of the frame size contract:
    /// a mismatch here is a configuration bug, not a runtime condition.
    pub fn new(cfg: &CaptureConfig) -> Result<Self, CaptureError> {
        if !matches!(cfg.chunk_duration_ms, 10 | 20 | 30) {
            return Err(CaptureError::InvalidFrameSize {
                chunk_ms: cfg.chunk_duration_ms,
            });
        }
        if !matches!(cfg.sample_rate, 8_000 | 16_000 | 32_000 | 48_000) {
            return Err(CaptureError::UnsupportedSampleRate {
                rate: cfg.sample_rate,
            });
        }
        let profile = Aggressiveness::from_level(cfg.vad_aggressiveness).profile();
        Ok(Self {
            detector: VoiceActivityDetector::new(profile),
            sample_rate: cfg.sample_rate,
        })
    }
}

impl VadEngine for EarshotVad {
    fn classify(&mut self, frame: &[i16]) -> bool {
        let verdict = match self.sample_rate {
            8_000 => self.detector.predict_8khz(frame),
            16_000 => self.detector.predict_16khz(frame),
            32_000 => self.detector.predict_32khz(frame),
            _ => self.detector.predict_48khz(frame),
        };
        // Frame sizes were validated at open time, so a predictor error can
        // only mean a short final frame; treat it as silence.
        verdict.unwrap_or(false)
    }

    fn reset(&mut self) {
        self.detector.reset();
    }

    fn name(&self) -> &'static str {
        "earshot_vad"
    }
}
