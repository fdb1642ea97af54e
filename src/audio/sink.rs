//! Utterance persistence.
//!
//! Writes each finished utterance as an uncompressed mono 16-bit WAV file
//! and returns the path. The file is fully flushed and closed before the
//! path is handed out, so a concurrent reader never sees a partial write.
//! The sink never deletes artifacts; the transcription collaborator owns
//! deletion once it has consumed the audio.

use super::segmenter::Utterance;
use anyhow::{Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub struct UtteranceSink {
    dir: PathBuf,
    sequence: u64,
}

impl Default for UtteranceSink {
    fn default() -> Self {
        Self::new()
    }
}

impl UtteranceSink {
    /// Sink writing into the OS temp directory.
    pub fn new() -> Self {
        Self::with_dir(env::temp_dir())
    }

    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            sequence: 0,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist one utterance, returning the finalized file's path.
    pub fn persist(&mut self, utterance: &Utterance) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create utterance dir {}", self.dir.display()))?;
        self.sequence += 1;
        let path = self.dir.join(format!("utterance-{:05}.wav", self.sequence));
        write_wav(&path, utterance)?;
        Ok(path)
    }
}

/// Serialize an utterance to `path`. Deterministic: the same utterance
/// always produces a byte-identical file.
pub fn write_wav(path: &Path, utterance: &Utterance) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: utterance.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for &sample in &utterance.samples {
        writer
            .write_sample(sample)
            .with_context(|| format!("failed to write samples to {}", path.display()))?;
    }
    writer
        .finalize()
        .with_context(|| format!("failed to finalize {}", path.display()))?;
    Ok(())
}
