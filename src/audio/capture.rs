//! Capture loop: read one frame, classify it, feed the segmenter.
//!
//! The loop returns as soon as one utterance completes or the stop flag is
//! observed. The flag is polled once per iteration, so cancellation latency
//! is bounded by a single frame duration; an in-flight blocking read always
//! runs to completion first.

use super::meter::{rms_db, LevelMeter};
use super::segmenter::{Utterance, UtteranceSegmenter};
use super::vad::VadEngine;
use crate::config::AppConfig;
use crate::log_debug;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

/// Validated knobs for one capture session.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    pub chunk_duration_ms: u64,
    pub vad_aggressiveness: u8,
    pub padding_ms: u64,
    pub silence_timeout_ms: u64,
    pub channel_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            chunk_duration_ms: 30,
            vad_aggressiveness: 3,
            padding_ms: 300,
            silence_timeout_ms: 1_500,
            channel_capacity: 64,
        }
    }
}

impl From<&AppConfig> for CaptureConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            sample_rate: cfg.sample_rate,
            chunk_duration_ms: cfg.chunk_duration_ms,
            vad_aggressiveness: cfg.vad_aggressiveness,
            padding_ms: cfg.padding_ms,
            silence_timeout_ms: cfg.silence_timeout_ms,
            channel_capacity: cfg.channel_capacity,
        }
    }
}

impl CaptureConfig {
    /// Samples in one frame at the configured rate and duration.
    pub fn frame_samples(&self) -> usize {
        (u64::from(self.sample_rate) * self.chunk_duration_ms / 1000) as usize
    }

    /// Pre-roll ring capacity in frames.
    ///
    /// A zero chunk duration is rejected by CLI validation and by
    /// `EarshotVad::new`, but hand-built configs must not divide by it.
    pub fn padding_frames(&self) -> usize {
        (self.padding_ms / self.chunk_duration_ms.max(1)).max(1) as usize
    }

    /// Silent frames tolerated while triggered before the utterance closes.
    pub fn max_silent_chunks(&self) -> usize {
        (self.silence_timeout_ms / self.chunk_duration_ms.max(1)) as usize
    }

    pub fn frame_duration(&self) -> Duration {
        Duration::from_millis(self.chunk_duration_ms)
    }
}

/// Errors that end a capture session.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Device missing, busy, or without input channels at open time.
    #[error("input device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Frame duration the classifier cannot accept; caught at open time,
    /// never per frame.
    #[error("frame duration {chunk_ms} ms is not a supported VAD frame size (10, 20, or 30 ms)")]
    InvalidFrameSize { chunk_ms: u64 },

    /// Sample rate the classifier cannot accept.
    #[error("sample rate {rate} Hz is not supported by the VAD (8, 16, 32, or 48 kHz)")]
    UnsupportedSampleRate { rate: u32 },

    /// The device stream died mid-session.
    #[error("audio stream failed: {0}")]
    Stream(String),
}

/// Why the capture loop returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The trailing-silence timeout closed an utterance.
    UtteranceComplete,
    /// The stop flag was raised.
    Cancelled,
    /// The device stream disconnected.
    StreamClosed,
}

impl StopReason {
    pub fn label(&self) -> &'static str {
        match self {
            StopReason::UtteranceComplete => "utterance_complete",
            StopReason::Cancelled => "cancelled",
            StopReason::StreamClosed => "stream_closed",
        }
    }
}

/// Observability counters for one listening pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureMetrics {
    pub frames_processed: usize,
    pub speech_frames: usize,
    pub frames_dropped: usize,
    pub capture_ms: u64,
    pub trailing_silence_ms: u64,
    pub stop_reason: StopReason,
}

impl Default for CaptureMetrics {
    fn default() -> Self {
        Self {
            frames_processed: 0,
            speech_frames: 0,
            frames_dropped: 0,
            capture_ms: 0,
            trailing_silence_ms: 0,
            stop_reason: StopReason::Cancelled,
        }
    }
}

/// One finished listening pass: at most one utterance, plus metrics.
#[derive(Debug)]
pub struct CaptureOutcome {
    pub utterance: Option<Utterance>,
    pub metrics: CaptureMetrics,
}

/// Drive the read -> classify -> segment loop over a live frame channel.
///
/// `stream_error` is filled by the device error callback; the senders live
/// inside the stream's callbacks, so a dead device shows up here as a quiet
/// channel, not as a disconnect. Both signals mean the stream died: fatal
/// when idle, but a partially accumulated utterance is flushed first so
/// speech already captured is not lost. The same flush applies on
/// cancellation.
pub(super) fn run_capture_loop(
    frames: &Receiver<Vec<i16>>,
    cfg: &CaptureConfig,
    vad: &mut dyn VadEngine,
    stop_flag: &AtomicBool,
    stream_error: &Mutex<Option<String>>,
    meter: Option<&LevelMeter>,
) -> Result<CaptureOutcome, CaptureError> {
    let mut segmenter = UtteranceSegmenter::new(cfg);
    let mut metrics = CaptureMetrics::default();
    let wait = cfg.frame_duration();

    loop {
        if stop_flag.load(Ordering::Relaxed) {
            metrics.stop_reason = StopReason::Cancelled;
            metrics.trailing_silence_ms =
                segmenter.silent_run_chunks() as u64 * cfg.chunk_duration_ms;
            metrics.capture_ms = metrics.frames_processed as u64 * cfg.chunk_duration_ms;
            return Ok(CaptureOutcome {
                utterance: segmenter.flush(),
                metrics,
            });
        }

        match frames.recv_timeout(wait) {
            Ok(frame) => {
                if let Some(meter) = meter {
                    meter.set_db(rms_db(&frame));
                }
                let is_speech = vad.classify(&frame);
                metrics.frames_processed += 1;
                if is_speech {
                    metrics.speech_frames += 1;
                }
                if let Some(utterance) = segmenter.push(frame, is_speech) {
                    metrics.stop_reason = StopReason::UtteranceComplete;
                    // Emission fires on the first silent frame past the
                    // timeout, so the tail is exactly one chunk longer.
                    metrics.trailing_silence_ms =
                        (cfg.max_silent_chunks() as u64 + 1) * cfg.chunk_duration_ms;
                    metrics.capture_ms = metrics.frames_processed as u64 * cfg.chunk_duration_ms;
                    return Ok(CaptureOutcome {
                        utterance: Some(utterance),
                        metrics,
                    });
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                // Queued frames drain first, so nothing classified before
                // the failure is lost.
                let failure = stream_error
                    .lock()
                    .map(|mut slot| slot.take())
                    .unwrap_or(None);
                match failure {
                    Some(reason) => {
                        return close_dead_stream(&mut segmenter, cfg, metrics, reason)
                    }
                    // The device is running behind; nothing to classify yet.
                    None => continue,
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                return close_dead_stream(
                    &mut segmenter,
                    cfg,
                    metrics,
                    "audio stream disconnected".into(),
                )
            }
        }
    }
}

/// Shared exit for both dead-stream signals: flush a partial utterance when
/// one was being captured, otherwise surface the failure.
fn close_dead_stream(
    segmenter: &mut UtteranceSegmenter,
    cfg: &CaptureConfig,
    mut metrics: CaptureMetrics,
    reason: String,
) -> Result<CaptureOutcome, CaptureError> {
    metrics.stop_reason = StopReason::StreamClosed;
    metrics.trailing_silence_ms = segmenter.silent_run_chunks() as u64 * cfg.chunk_duration_ms;
    metrics.capture_ms = metrics.frames_processed as u64 * cfg.chunk_duration_ms;
    if let Some(utterance) = segmenter.flush() {
        log_debug(&format!(
            "capture: stream died mid-utterance ({reason}); flushing partial segment"
        ));
        return Ok(CaptureOutcome {
            utterance: Some(utterance),
            metrics,
        });
    }
    Err(CaptureError::Stream(reason))
}

/// Run the segmentation state machine over prerecorded PCM without a device.
///
/// Returns every utterance the segmenter emits for the input, flushing any
/// partial segment at end of input. Lets tests and benchmarks exercise the
/// exact production state machine against synthetic audio.
pub fn segment_pcm(
    samples: &[i16],
    cfg: &CaptureConfig,
    vad: &mut dyn VadEngine,
) -> Vec<Utterance> {
    let frame_samples = cfg.frame_samples().max(1);
    let mut segmenter = UtteranceSegmenter::new(cfg);
    let mut utterances = Vec::new();
    for chunk in samples.chunks(frame_samples) {
        let mut frame = chunk.to_vec();
        frame.resize(frame_samples, 0);
        let is_speech = vad.classify(&frame);
        if let Some(utterance) = segmenter.push(frame, is_speech) {
            utterances.push(utterance);
        }
    }
    if let Some(utterance) = segmenter.flush() {
        utterances.push(utterance);
    }
    utterances
}
