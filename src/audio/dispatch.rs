//! Frame assembly between the CPAL callback and the capture loop.
//!
//! The device callback delivers interleaved samples in whatever format and
//! channel layout the hardware uses. The dispatcher brings them to mono i16,
//! carves the stream into exact frame-sized chunks, and pushes each frame
//! through a bounded channel. When the channel is full the frame is dropped
//! and counted; overflow must never block or kill the device callback.

use crossbeam_channel::{Sender, TrySendError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// Scale by 32768 so i16 input round-trips exactly through the shared
// float path; the saturating cast keeps +1.0 at i16::MAX.
fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32_768.0) as i16
}

/// Downmix interleaved input to mono i16. `convert` maps each raw sample
/// into [-1.0, 1.0] before channels are averaged.
pub(super) fn append_downmixed_samples<T, F>(
    buf: &mut Vec<i16>,
    data: &[T],
    channels: usize,
    mut convert: F,
) where
    T: Copy,
    F: FnMut(T) -> f32,
{
    if channels <= 1 {
        buf.extend(data.iter().map(|&s| to_i16(convert(s))));
        return;
    }
    let mut groups = data.chunks_exact(channels);
    for group in groups.by_ref() {
        let sum: f32 = group.iter().map(|&s| convert(s)).sum();
        buf.push(to_i16(sum / channels as f32));
    }
    // A trailing partial group can only come from a short final callback.
    let tail = groups.remainder();
    if !tail.is_empty() {
        let sum: f32 = tail.iter().map(|&s| convert(s)).sum();
        buf.push(to_i16(sum / tail.len() as f32));
    }
}

pub(super) struct FrameDispatcher {
    frame_samples: usize,
    pending: Vec<i16>,
    scratch: Vec<i16>,
    sender: Sender<Vec<i16>>,
    dropped: Arc<AtomicUsize>,
}

impl FrameDispatcher {
    pub(super) fn new(
        frame_samples: usize,
        sender: Sender<Vec<i16>>,
        dropped: Arc<AtomicUsize>,
    ) -> Self {
        let frame_samples = frame_samples.max(1);
        Self {
            frame_samples,
            pending: Vec::with_capacity(frame_samples * 2),
            scratch: Vec::new(),
            sender,
            dropped,
        }
    }

    /// Accept one callback's worth of samples and ship every complete frame.
    pub(super) fn push<T, F>(&mut self, data: &[T], channels: usize, convert: F)
    where
        T: Copy,
        F: FnMut(T) -> f32,
    {
        self.scratch.clear();
        append_downmixed_samples(&mut self.scratch, data, channels, convert);
        self.pending.extend_from_slice(&self.scratch);

        while self.pending.len() >= self.frame_samples {
            let frame: Vec<i16> = self.pending.drain(..self.frame_samples).collect();
            match self.sender.try_send(frame) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
                // Receiver gone: the capture loop already returned.
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}
