//! Utterance segmentation state machine.
//!
//! Sits between the VAD and the sink: buffers a short pre-roll window while
//! idle, triggers on the first speech frame seen inside that window, and
//! closes the utterance once enough consecutive silent frames arrive.
//! Trailing silence stays in the emitted audio; the transcriber copes better
//! with a soft tail than with a hard cut at the last speech frame.

use super::capture::CaptureConfig;
use std::collections::VecDeque;

/// One finished utterance: mono samples at the capture rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub sample_rate: u32,
    pub samples: Vec<i16>,
}

impl Utterance {
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / u64::from(self.sample_rate)
    }
}

struct ClassifiedFrame {
    samples: Vec<i16>,
    is_speech: bool,
}

enum Phase {
    Idle,
    Triggered,
}

/// VAD-gated segmentation.
///
/// While `Idle`, classified frames go into a bounded pre-roll ring (oldest
/// evicted on overflow). Any speech frame inside the window triggers capture
/// and the whole window is replayed into the utterance, so speech onset is
/// not clipped by classifier reaction lag. While `Triggered`, every frame is
/// appended regardless of classification; a run of more than
/// `max_silent_chunks` silent frames ends the utterance and resets to idle.
///
/// All state is touched from the capture thread only.
pub struct UtteranceSegmenter {
    phase: Phase,
    ring: VecDeque<ClassifiedFrame>,
    padding_frames: usize,
    voiced: Vec<i16>,
    silent_chunks: usize,
    max_silent_chunks: usize,
    sample_rate: u32,
}

impl UtteranceSegmenter {
    pub fn new(cfg: &CaptureConfig) -> Self {
        let padding_frames = cfg.padding_frames();
        Self {
            phase: Phase::Idle,
            ring: VecDeque::with_capacity(padding_frames),
            padding_frames,
            voiced: Vec::new(),
            silent_chunks: 0,
            max_silent_chunks: cfg.max_silent_chunks(),
            sample_rate: cfg.sample_rate,
        }
    }

    pub fn is_triggered(&self) -> bool {
        matches!(self.phase, Phase::Triggered)
    }

    /// Frames currently held in the pre-roll window.
    pub fn buffered_frames(&self) -> usize {
        self.ring.len()
    }

    /// Length of the current run of trailing silent frames.
    pub fn silent_run_chunks(&self) -> usize {
        self.silent_chunks
    }

    /// Feed one classified frame. Returns a finished utterance when the
    /// trailing-silence timeout elapses.
    pub fn push(&mut self, frame: Vec<i16>, is_speech: bool) -> Option<Utterance> {
        match self.phase {
            Phase::Idle => {
                if self.ring.len() == self.padding_frames {
                    self.ring.pop_front();
                }
                self.ring.push_back(ClassifiedFrame {
                    samples: frame,
                    is_speech,
                });
                if self.ring.iter().any(|f| f.is_speech) {
                    self.phase = Phase::Triggered;
                    self.silent_chunks = 0;
                    for buffered in self.ring.drain(..) {
                        self.voiced.extend_from_slice(&buffered.samples);
                    }
                }
                None
            }
            Phase::Triggered => {
                // Trailing silence is retained, not discarded.
                self.voiced.extend_from_slice(&frame);
                if is_speech {
                    self.silent_chunks = 0;
                    None
                } else {
                    self.silent_chunks += 1;
                    if self.silent_chunks > self.max_silent_chunks {
                        Some(self.take_utterance())
                    } else {
                        None
                    }
                }
            }
        }
    }

    /// Flush a partially captured utterance on cancellation or device loss.
    ///
    /// Returns `None` when idle: nothing was being captured, so nothing is
    /// lost. When triggered, the accumulated audio is emitted as a (possibly
    /// short) utterance instead of being discarded.
    pub fn flush(&mut self) -> Option<Utterance> {
        if self.is_triggered() && !self.voiced.is_empty() {
            Some(self.take_utterance())
        } else {
            self.reset();
            None
        }
    }

    fn take_utterance(&mut self) -> Utterance {
        let samples = std::mem::take(&mut self.voiced);
        let utterance = Utterance {
            sample_rate: self.sample_rate,
            samples,
        };
        self.reset();
        utterance
    }

    fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.ring.clear();
        self.voiced.clear();
        self.silent_chunks = 0;
    }
}
