//! Live input level shared between the capture thread and the caller.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

const METER_FLOOR_DB: f32 = -60.0;

/// Lock-free dB level the capture loop updates once per frame.
#[derive(Clone, Debug)]
pub struct LevelMeter {
    level_bits: Arc<AtomicU32>,
}

impl Default for LevelMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl LevelMeter {
    pub fn new() -> Self {
        Self {
            level_bits: Arc::new(AtomicU32::new(METER_FLOOR_DB.to_bits())),
        }
    }

    pub fn set_db(&self, db: f32) {
        self.level_bits.store(db.to_bits(), Ordering::Relaxed);
    }

    pub fn level_db(&self) -> f32 {
        f32::from_bits(self.level_bits.load(Ordering::Relaxed))
    }
}

/// RMS level of a PCM frame in decibels relative to full scale.
pub(crate) fn rms_db(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return METER_FLOOR_DB;
    }
    let energy: f32 = samples
        .iter()
        .map(|&s| {
            let x = f32::from(s) / 32_768.0;
            x * x
        })
        .sum::<f32>()
        / samples.len() as f32;
    let rms = energy.sqrt().max(1e-6);
    20.0 * rms.log10()
}
