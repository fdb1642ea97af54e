//! Background listener thread: capture, persist, transcribe, repeat.
//!
//! Runs the blocking capture loop off the caller's thread and reports each
//! finished utterance over a channel. A stop request is cooperative: the
//! capture loop observes it within one frame duration, and any utterance in
//! progress at that moment is flushed and processed rather than discarded.

use crate::audio::{
    CaptureConfig, CaptureMetrics, EarshotVad, LevelMeter, Recorder, UtteranceSink,
};
use crate::config::AppConfig;
use crate::stt::Transcriber;
use crate::{log_debug, log_debug_content};
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, OnceLock};
use std::thread;
use std::time::Instant;

/// Handle the caller uses to poll the listener thread.
pub struct ListenerJob {
    pub receiver: mpsc::Receiver<ListenerMessage>,
    pub handle: Option<thread::JoinHandle<()>>,
    stop_flag: Arc<AtomicBool>,
}

impl ListenerJob {
    /// Ask the listener to stop; the in-flight frame read still completes.
    pub fn request_stop(&self) {
        self.stop_flag.store(true, Ordering::Relaxed);
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop_flag.clone()
    }
}

/// Messages sent from the listener thread back to the caller.
#[derive(Debug)]
pub enum ListenerMessage {
    /// An utterance was transcribed to usable text.
    Transcript {
        text: String,
        metrics: CaptureMetrics,
    },
    /// No transcriber is configured; the WAV was kept for the caller.
    Saved {
        path: PathBuf,
        metrics: CaptureMetrics,
    },
    /// An utterance completed but produced no text (silence-only audio or a
    /// skipped transcription failure).
    Empty { metrics: CaptureMetrics },
    /// Something went wrong; fatal errors are followed by `Stopped`.
    Error(String),
    /// The listener thread is done.
    Stopped,
}

/// Spawn the listener thread.
///
/// The loop runs until the stop flag is raised or a fatal capture error
/// occurs; a `Stopped` message is always the last one sent.
pub fn start_listener(
    recorder: Arc<Mutex<Recorder>>,
    transcriber: Option<Arc<Mutex<Transcriber>>>,
    config: AppConfig,
    meter: Option<LevelMeter>,
) -> ListenerJob {
    let (tx, rx) = mpsc::channel();
    let stop_flag = Arc::new(AtomicBool::new(false));
    let worker_flag = stop_flag.clone();

    let handle = thread::spawn(move || {
        run_listener(recorder, transcriber, &config, &worker_flag, meter, &tx);
        let _ = tx.send(ListenerMessage::Stopped);
    });

    ListenerJob {
        receiver: rx,
        handle: Some(handle),
        stop_flag,
    }
}

fn run_listener(
    recorder: Arc<Mutex<Recorder>>,
    transcriber: Option<Arc<Mutex<Transcriber>>>,
    config: &AppConfig,
    stop_flag: &Arc<AtomicBool>,
    meter: Option<LevelMeter>,
    tx: &mpsc::Sender<ListenerMessage>,
) {
    let capture_cfg = CaptureConfig::from(config);
    let mut sink = match &config.utterance_dir {
        Some(dir) => UtteranceSink::with_dir(dir.clone()),
        None => UtteranceSink::new(),
    };

    while !stop_flag.load(Ordering::Relaxed) {
        match capture_one(
            &recorder,
            transcriber.as_ref(),
            config,
            &capture_cfg,
            &mut sink,
            stop_flag,
            meter.as_ref(),
        ) {
            Ok(Some(message)) => {
                let _ = tx.send(message);
            }
            // Cancelled while idle: nothing captured, nothing to report.
            Ok(None) => {}
            Err(err) => {
                let _ = tx.send(ListenerMessage::Error(format!("{err:#}")));
                break;
            }
        }
    }
}

/// One listening pass: at most one utterance in, at most one message out.
///
/// Fatal capture errors propagate as `Err` and end the session; a failed
/// transcription is reported as a message and the session keeps listening.
fn capture_one(
    recorder: &Arc<Mutex<Recorder>>,
    transcriber: Option<&Arc<Mutex<Transcriber>>>,
    config: &AppConfig,
    capture_cfg: &CaptureConfig,
    sink: &mut UtteranceSink,
    stop_flag: &Arc<AtomicBool>,
    meter: Option<&LevelMeter>,
) -> Result<Option<ListenerMessage>> {
    let mut vad = EarshotVad::new(capture_cfg)?;
    let capture_start = Instant::now();
    let outcome = {
        let recorder = recorder
            .lock()
            .map_err(|_| anyhow!("audio recorder lock poisoned"))?;
        recorder.listen_for_utterance(capture_cfg, &mut vad, stop_flag, meter)?
    };
    let metrics = outcome.metrics;
    log_capture_metrics(&metrics);

    let Some(utterance) = outcome.utterance else {
        return Ok(None);
    };
    tracing::info!(
        duration_ms = utterance.duration_ms(),
        frames = metrics.frames_processed,
        stop = metrics.stop_reason.label(),
        "utterance captured"
    );

    let path = sink
        .persist(&utterance)
        .context("failed to persist utterance")?;

    let Some(transcriber) = transcriber else {
        log_debug(&format!(
            "listener: no transcriber configured; utterance kept at {}",
            path.display()
        ));
        return Ok(Some(ListenerMessage::Saved { path, metrics }));
    };

    let stt_start = Instant::now();
    let transcript = {
        let transcriber = transcriber
            .lock()
            .map_err(|_| anyhow!("transcriber lock poisoned"))?;
        transcriber.transcribe_file(&path, config)
    };
    match transcript {
        Ok(raw) => {
            let cleaned = sanitize_transcript(&raw);
            if config.log_timings {
                log_debug(&format!(
                    "timing|phase=utterance|capture_s={:.3}|stt_s={:.3}|chars={}",
                    capture_start.elapsed().as_secs_f64(),
                    stt_start.elapsed().as_secs_f64(),
                    cleaned.len()
                ));
            }
            if cleaned.is_empty() {
                Ok(Some(ListenerMessage::Empty { metrics }))
            } else {
                log_debug_content(&format!("listener: transcript: {cleaned}"));
                Ok(Some(ListenerMessage::Transcript {
                    text: cleaned,
                    metrics,
                }))
            }
        }
        // Transcription failures never stop the listening session.
        Err(err) => {
            log_debug(&format!("listener: transcription failed: {err:#}"));
            Ok(Some(ListenerMessage::Error(format!(
                "transcription failed, still listening: {err:#}"
            ))))
        }
    }
}

/// Strip whisper's non-speech markers and collapse whitespace.
fn sanitize_transcript(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    static NON_SPEECH_RE: OnceLock<Regex> = OnceLock::new();
    let re = NON_SPEECH_RE.get_or_init(|| {
        Regex::new(
            r"(?i)\[\s*\]|\(\s*\)|\[(?:\s*(?:silence|noise|inaudible|blank_audio|blank audio|music|laughter|applause|cough|breath(?:ing)?|wind|background)\s*)\]|\((?:\s*(?:silence|noise|inaudible|blank audio|music|laughter|applause|cough|breath(?:ing)?|wind|background|wind blowing)\s*)\)",
        )
        .expect("non-speech regex should compile")
    });
    let without_markers = re.replace_all(trimmed, " ");
    without_markers
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// One parseable line per finished pass for perf tooling.
fn log_capture_metrics(metrics: &CaptureMetrics) {
    log_debug(&format!(
        "utterance_metrics|capture_ms={}|frames_processed={}|speech_frames={}|frames_dropped={}|trailing_silence_ms={}|stop={}",
        metrics.capture_ms,
        metrics.frames_processed,
        metrics.speech_frames,
        metrics.frames_dropped,
        metrics.trailing_silence_ms,
        metrics.stop_reason.label()
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_non_speech_markers() {
        assert_eq!(sanitize_transcript(" [BLANK_AUDIO] "), "");
        assert_eq!(sanitize_transcript("[silence] hello (noise) there"), "hello there");
        assert_eq!(sanitize_transcript("ok  then"), "ok then");
    }

    #[test]
    fn sanitize_keeps_bracketed_words_that_are_not_markers() {
        assert_eq!(sanitize_transcript("[unknown] word"), "[unknown] word");
    }

    #[test]
    fn sanitize_handles_empty_input() {
        assert_eq!(sanitize_transcript("   "), "");
    }

    #[test]
    fn request_stop_raises_the_shared_flag() {
        let (_, rx) = mpsc::channel();
        let job = ListenerJob {
            receiver: rx,
            handle: None,
            stop_flag: Arc::new(AtomicBool::new(false)),
        };
        assert!(!job.stop_flag().load(Ordering::Relaxed));
        job.request_stop();
        assert!(job.stop_flag().load(Ordering::Relaxed));
    }
}
