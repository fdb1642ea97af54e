//! Whisper speech-to-text collaborator.
//!
//! Wraps `whisper_rs` behind a file-based interface: the capture side hands
//! over the path of a finished utterance WAV, and this module owns the
//! artifact from that point on, removing it once the audio has been read.
//! The model is loaded once and reused across utterances.

use crate::log_debug;
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

/// Read an utterance WAV and take ownership of the artifact.
///
/// The file is removed whether or not decoding succeeds; a handed-over
/// utterance is consumed exactly once.
pub(crate) fn load_utterance(path: &Path) -> Result<Vec<f32>> {
    let samples = read_wav_samples(path);
    if let Err(err) = fs::remove_file(path) {
        log_debug(&format!(
            "stt: failed to remove utterance file {}: {err}",
            path.display()
        ));
    }
    samples
}

fn read_wav_samples(path: &Path) -> Result<Vec<f32>> {
    let mut reader = hound::WavReader::open(path)
        .with_context(|| format!("failed to open utterance wav {}", path.display()))?;
    let spec = reader.spec();
    if spec.channels != 1 || spec.bits_per_sample != 16 {
        bail!(
            "expected mono 16-bit wav, got {} channel(s) at {} bits",
            spec.channels,
            spec.bits_per_sample
        );
    }
    let samples: std::result::Result<Vec<i16>, _> = reader.samples::<i16>().collect();
    let samples = samples.with_context(|| format!("failed to decode {}", path.display()))?;
    Ok(samples
        .into_iter()
        .map(|s| f32::from(s) / 32_768.0)
        .collect())
}

#[cfg(unix)]
mod platform {
    use super::load_utterance;
    use crate::config::AppConfig;
    use crate::log_debug;
    use anyhow::{anyhow, Context, Result};
    use std::io;
    use std::os::raw::{c_char, c_uint, c_void};
    use std::os::unix::io::AsRawFd;
    use std::path::Path;
    use std::sync::Once;
    use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

    /// Redirects stderr to /dev/null for its lifetime and restores it on
    /// drop, so whisper.cpp's load-time chatter never reaches the terminal.
    struct StderrGate {
        saved_fd: i32,
        _null: std::fs::File,
    }

    impl StderrGate {
        fn close() -> Result<Self> {
            let null = std::fs::OpenOptions::new()
                .write(true)
                .open("/dev/null")
                .context("failed to open /dev/null")?;
            // SAFETY: we duplicate fd 2 before redirecting it and keep the
            // duplicate alive until drop restores it.
            let saved_fd = unsafe { libc::dup(2) };
            if saved_fd < 0 {
                return Err(anyhow!(
                    "failed to dup stderr: {}",
                    io::Error::last_os_error()
                ));
            }
            if unsafe { libc::dup2(null.as_raw_fd(), 2) } < 0 {
                unsafe { libc::close(saved_fd) };
                return Err(anyhow!(
                    "failed to redirect stderr: {}",
                    io::Error::last_os_error()
                ));
            }
            Ok(Self {
                saved_fd,
                _null: null,
            })
        }
    }

    impl Drop for StderrGate {
        fn drop(&mut self) {
            // SAFETY: saved_fd is a live duplicate of the original stderr.
            unsafe {
                libc::dup2(self.saved_fd, 2);
                libc::close(self.saved_fd);
            }
        }
    }

    /// Whisper model context. Create once at startup and reuse for every
    /// utterance; loading the GGML model is by far the slowest step.
    pub struct Transcriber {
        ctx: WhisperContext,
    }

    impl Transcriber {
        /// Load the model from disk with stderr gated for the duration.
        pub fn new(model_path: &str) -> Result<Self> {
            install_whisper_log_silencer();

            let ctx_result = {
                let _gate = StderrGate::close()?;
                WhisperContext::new_with_params(model_path, WhisperContextParameters::default())
            };
            let ctx = ctx_result.context("failed to load whisper model")?;
            Ok(Self { ctx })
        }

        /// Transcribe a finished utterance WAV, consuming the file.
        pub fn transcribe_file(&self, path: &Path, config: &AppConfig) -> Result<String> {
            let samples = load_utterance(path)?;
            self.transcribe(&samples, config)
        }

        /// Run whisper over normalized mono samples and stitch the segment
        /// texts together.
        pub fn transcribe(&self, samples: &[f32], config: &AppConfig) -> Result<String> {
            let mut state = self
                .ctx
                .create_state()
                .context("failed to create whisper state")?;
            state.full(build_params(config), samples)?;

            let segment_count = match state.full_n_segments() {
                Ok(count) if count >= 0 => count,
                Ok(_) => {
                    log_debug("whisper returned a negative segment count");
                    return Ok(String::new());
                }
                Err(err) => {
                    log_debug(&format!("whisper failed to read segment count: {err}"));
                    return Ok(String::new());
                }
            };
            let mut transcript = String::new();
            for i in 0..segment_count {
                match state.full_get_segment_text_lossy(i) {
                    Ok(text) => transcript.push_str(&text),
                    Err(err) => log_debug(&format!("failed to read whisper segment {i}: {err}")),
                }
            }
            Ok(transcript)
        }
    }

    fn build_params(config: &AppConfig) -> FullParams<'_, '_> {
        let strategy = if config.whisper_beam_size > 1 {
            SamplingStrategy::BeamSearch {
                beam_size: config.whisper_beam_size as i32,
                patience: -1.0,
            }
        } else {
            SamplingStrategy::Greedy { best_of: 1 }
        };
        let mut params = FullParams::new(strategy);
        let auto_lang = config.lang.eq_ignore_ascii_case("auto");
        params.set_language(if auto_lang { None } else { Some(&config.lang) });
        params.set_detect_language(auto_lang);
        params.set_temperature(config.whisper_temperature);
        // Cap thread count so transcription does not starve the capture
        // thread on small machines.
        params.set_n_threads(num_cpus::get().min(8) as i32);
        params.set_translate(false);
        params.set_token_timestamps(false);
        params.set_print_progress(false);
        params.set_print_special(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params
    }

    fn install_whisper_log_silencer() {
        static INSTALL_LOG_CALLBACK: Once = Once::new();
        INSTALL_LOG_CALLBACK.call_once(|| unsafe {
            whisper_rs::set_log_callback(Some(whisper_log_callback), std::ptr::null_mut());
        });
    }

    unsafe extern "C" fn whisper_log_callback(
        _level: c_uint,
        _text: *const c_char,
        _user_data: *mut c_void,
    ) {
        // Keep whisper.cpp's default logger off the terminal.
    }
}

#[cfg(unix)]
pub use platform::Transcriber;

#[cfg(not(unix))]
mod platform {
    use super::load_utterance;
    use crate::config::AppConfig;
    use anyhow::{anyhow, Result};
    use std::path::Path;

    /// Stub for targets without whisper support; still consumes the
    /// artifact so capture-side cleanup behaves identically.
    pub struct Transcriber;

    impl Transcriber {
        pub fn new(_: &str) -> Result<Self> {
            Err(anyhow!(
                "whisper transcription is currently supported only on Unix-like platforms"
            ))
        }

        pub fn transcribe_file(&self, path: &Path, _: &AppConfig) -> Result<String> {
            let _ = load_utterance(path)?;
            Err(anyhow!(
                "whisper transcription is currently supported only on Unix-like platforms"
            ))
        }

        pub fn transcribe(&self, _: &[f32], _: &AppConfig) -> Result<String> {
            Err(anyhow!(
                "whisper transcription is currently supported only on Unix-like platforms"
            ))
        }
    }
}

#[cfg(not(unix))]
pub use platform::Transcriber;
