use super::defaults::{
    MAX_PADDING_MS, MAX_SILENCE_TIMEOUT_MS, SUPPORTED_CHUNK_DURATIONS_MS, SUPPORTED_SAMPLE_RATES,
};
use super::AppConfig;
use anyhow::{bail, Result};
use clap::Parser;

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values before any device or model is touched.
    pub fn validate(&mut self) -> Result<()> {
        if !SUPPORTED_SAMPLE_RATES.contains(&self.sample_rate) {
            bail!(
                "--sample-rate must be one of 8000, 16000, 32000, or 48000 Hz, got {}",
                self.sample_rate
            );
        }
        if !SUPPORTED_CHUNK_DURATIONS_MS.contains(&self.chunk_duration_ms) {
            bail!(
                "--chunk-duration-ms must be 10, 20, or 30, got {}",
                self.chunk_duration_ms
            );
        }
        if self.vad_aggressiveness > 3 {
            bail!(
                "--vad-aggressiveness must be between 0 and 3, got {}",
                self.vad_aggressiveness
            );
        }
        if self.padding_ms < self.chunk_duration_ms || self.padding_ms > MAX_PADDING_MS {
            bail!(
                "--padding-ms must be between {} and {MAX_PADDING_MS} ms, got {}",
                self.chunk_duration_ms,
                self.padding_ms
            );
        }
        if self.silence_timeout_ms < self.chunk_duration_ms
            || self.silence_timeout_ms > MAX_SILENCE_TIMEOUT_MS
        {
            bail!(
                "--silence-timeout-ms must be between {} and {MAX_SILENCE_TIMEOUT_MS} ms, got {}",
                self.chunk_duration_ms,
                self.silence_timeout_ms
            );
        }
        if !(8..=1024).contains(&self.channel_capacity) {
            bail!(
                "--channel-capacity must be between 8 and 1024, got {}",
                self.channel_capacity
            );
        }
        if self.whisper_beam_size > 10 {
            bail!(
                "--whisper-beam-size must be between 0 and 10, got {}",
                self.whisper_beam_size
            );
        }
        if !(0.0..=5.0).contains(&self.whisper_temperature) {
            bail!(
                "--whisper-temperature must be between 0.0 and 5.0, got {}",
                self.whisper_temperature
            );
        }
        validate_lang(&self.lang)?;
        Ok(())
    }
}

/// Accept "auto" or a bare ISO-639 code; whisper rejects anything fancier.
fn validate_lang(lang: &str) -> Result<()> {
    if lang.eq_ignore_ascii_case("auto") {
        return Ok(());
    }
    let ok = (2..=3).contains(&lang.len()) && lang.chars().all(|c| c.is_ascii_lowercase());
    if !ok {
        bail!("--lang must be \"auto\" or a lowercase ISO-639 code, got {lang:?}");
    }
    Ok(())
}
