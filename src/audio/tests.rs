use super::capture::run_capture_loop;
use super::dispatch::{append_downmixed_samples, FrameDispatcher};
use super::recorder::ensure_input_channels;
use super::{
    segment_pcm, write_wav, Aggressiveness, CaptureConfig, CaptureError, EarshotVad, LevelMeter,
    StopReason, Utterance, UtteranceSegmenter, UtteranceSink, VadEngine,
};
use crossbeam_channel::bounded;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Replays a canned speech/silence script regardless of frame content, so
/// the state machine can be tested without a microphone.
struct ScriptedVad {
    decisions: Vec<bool>,
    cursor: usize,
}

impl ScriptedVad {
    fn new(decisions: Vec<bool>) -> Self {
        Self {
            decisions,
            cursor: 0,
        }
    }
}

impl VadEngine for ScriptedVad {
    fn classify(&mut self, _frame: &[i16]) -> bool {
        let decision = self.decisions.get(self.cursor).copied().unwrap_or(false);
        self.cursor += 1;
        decision
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }

    fn name(&self) -> &'static str {
        "scripted_vad"
    }
}

/// 30 ms frames at 16 kHz, 300 ms pre-roll (ring of 10), 300 ms silence
/// timeout (10 tolerated silent chunks).
fn short_timeout_config() -> CaptureConfig {
    CaptureConfig {
        silence_timeout_ms: 300,
        ..CaptureConfig::default()
    }
}

fn frame(cfg: &CaptureConfig, value: i16) -> Vec<i16> {
    vec![value; cfg.frame_samples()]
}

#[test]
fn capture_config_derives_frame_geometry() {
    let cfg = CaptureConfig::default();
    assert_eq!(cfg.frame_samples(), 480);
    assert_eq!(cfg.padding_frames(), 10);
    assert_eq!(cfg.max_silent_chunks(), 50);

    let cfg = short_timeout_config();
    assert_eq!(cfg.max_silent_chunks(), 10);
}

#[test]
fn capture_config_survives_zero_chunk_duration() {
    // CLI validation and EarshotVad::new both reject a zero chunk, but a
    // hand-built config must not divide by it either.
    let cfg = CaptureConfig {
        chunk_duration_ms: 0,
        ..CaptureConfig::default()
    };
    assert_eq!(cfg.frame_samples(), 0);
    assert_eq!(cfg.padding_frames(), 300);
    assert_eq!(cfg.max_silent_chunks(), 1_500);

    let mut vad = ScriptedVad::new(vec![true]);
    let utterances = segment_pcm(&[1, 2, 3], &cfg, &mut vad);
    assert_eq!(utterances.len(), 1);
}

#[test]
fn devices_without_input_channels_are_rejected() {
    let err = ensure_input_channels(0, "Loopback Monitor")
        .expect_err("a zero-channel device can never capture");
    match err {
        CaptureError::DeviceUnavailable(reason) => {
            assert!(reason.contains("Loopback Monitor"));
            assert!(reason.contains("no input channels"));
        }
        other => panic!("expected DeviceUnavailable, got {other:?}"),
    }
    assert!(ensure_input_channels(1, "Built-in Microphone").is_ok());
}

#[test]
fn segmenter_emits_one_utterance_for_speech_between_silence() {
    // 5 silence, 3 speech, then 12 silence. The trigger fires on the first
    // speech frame (flushing the 5 buffered silence frames), and the
    // utterance closes when the 11th trailing silent frame exceeds the
    // 10-chunk timeout: 5 pre-roll + 3 speech + 11 trailing = 19 frames.
    let cfg = short_timeout_config();
    let mut segmenter = UtteranceSegmenter::new(&cfg);
    let mut emitted = Vec::new();

    for i in 0..20 {
        let is_speech = (5..8).contains(&i);
        if let Some(utterance) = segmenter.push(frame(&cfg, i as i16), is_speech) {
            emitted.push((i, utterance));
        }
        if i == 5 {
            assert!(segmenter.is_triggered(), "first speech frame must trigger");
        }
    }

    assert_eq!(emitted.len(), 1);
    let (at, utterance) = &emitted[0];
    assert_eq!(*at, 18, "emission on the 11th trailing silent frame");
    assert_eq!(utterance.samples.len(), 19 * cfg.frame_samples());
    assert_eq!(utterance.sample_rate, cfg.sample_rate);

    // Back to idle: the 20th frame landed in a fresh pre-roll window.
    assert!(!segmenter.is_triggered());
    assert_eq!(segmenter.buffered_frames(), 1);
}

#[test]
fn segmenter_without_speech_emits_nothing() {
    let cfg = short_timeout_config();
    let mut segmenter = UtteranceSegmenter::new(&cfg);
    for i in 0..50 {
        assert!(segmenter.push(frame(&cfg, i), false).is_none());
        assert!(
            segmenter.buffered_frames() <= cfg.padding_frames(),
            "ring must never exceed its capacity"
        );
    }
    assert_eq!(segmenter.buffered_frames(), cfg.padding_frames());
    assert!(segmenter.flush().is_none());
}

#[test]
fn pre_roll_ring_evicts_oldest_frames() {
    // 15 silent frames overflow the 10-frame ring; the trigger frame joins
    // the 9 survivors, so the utterance starts with exactly 10 frames.
    let cfg = short_timeout_config();
    let mut segmenter = UtteranceSegmenter::new(&cfg);
    for i in 0..15 {
        assert!(segmenter.push(frame(&cfg, i), false).is_none());
    }
    assert_eq!(segmenter.buffered_frames(), 10);

    assert!(segmenter.push(frame(&cfg, 100), true).is_none());
    assert!(segmenter.is_triggered());

    let mut utterance = None;
    for i in 0..11 {
        utterance = segmenter.push(frame(&cfg, i), false);
    }
    let utterance = utterance.expect("timeout should close the utterance");
    assert_eq!(utterance.samples.len(), (10 + 11) * cfg.frame_samples());
}

#[test]
fn speech_resets_the_silent_run() {
    let cfg = short_timeout_config();
    let mut segmenter = UtteranceSegmenter::new(&cfg);
    assert!(segmenter.push(frame(&cfg, 1), true).is_none());

    // 10 silent frames stay under the timeout, then speech resets the run.
    for _ in 0..10 {
        assert!(segmenter.push(frame(&cfg, 0), false).is_none());
    }
    assert_eq!(segmenter.silent_run_chunks(), 10);
    assert!(segmenter.push(frame(&cfg, 2), true).is_none());
    assert_eq!(segmenter.silent_run_chunks(), 0);

    let mut utterance = None;
    for _ in 0..11 {
        utterance = segmenter.push(frame(&cfg, 0), false);
    }
    let utterance = utterance.expect("second silent run closes the utterance");
    assert_eq!(utterance.samples.len(), (1 + 10 + 1 + 11) * cfg.frame_samples());
}

#[test]
fn flush_while_idle_returns_none() {
    let cfg = short_timeout_config();
    let mut segmenter = UtteranceSegmenter::new(&cfg);
    segmenter.push(frame(&cfg, 0), false);
    assert!(segmenter.flush().is_none());
    assert_eq!(segmenter.buffered_frames(), 0);
}

#[test]
fn flush_while_triggered_returns_partial_utterance() {
    let cfg = short_timeout_config();
    let mut segmenter = UtteranceSegmenter::new(&cfg);
    segmenter.push(frame(&cfg, 1), true);
    segmenter.push(frame(&cfg, 2), true);

    let utterance = segmenter.flush().expect("captured speech must survive");
    assert_eq!(utterance.samples.len(), 2 * cfg.frame_samples());

    // The segmenter is reusable after a flush.
    assert!(!segmenter.is_triggered());
    assert!(segmenter.push(frame(&cfg, 3), true).is_none());
    assert!(segmenter.is_triggered());
}

#[test]
fn segment_pcm_flushes_partial_segment_at_end_of_input() {
    let cfg = short_timeout_config();
    let mut vad = ScriptedVad::new(vec![true, false, false]);
    let samples = vec![1i16; 3 * cfg.frame_samples()];

    let utterances = segment_pcm(&samples, &cfg, &mut vad);
    assert_eq!(utterances.len(), 1);
    assert_eq!(utterances[0].samples.len(), 3 * cfg.frame_samples());
}

#[test]
fn segment_pcm_emits_consecutive_utterances() {
    let cfg = short_timeout_config();
    // Two spoken bursts separated by a full timeout each.
    let mut script = Vec::new();
    script.extend([true, true]);
    script.extend(vec![false; 11]);
    script.extend([true]);
    script.extend(vec![false; 11]);
    let frames = script.len();
    let mut vad = ScriptedVad::new(script);
    let samples = vec![1i16; frames * cfg.frame_samples()];

    let utterances = segment_pcm(&samples, &cfg, &mut vad);
    assert_eq!(utterances.len(), 2);
    assert_eq!(utterances[0].samples.len(), 13 * cfg.frame_samples());
    assert_eq!(utterances[1].samples.len(), 12 * cfg.frame_samples());
}

#[test]
fn capture_loop_returns_completed_utterance() {
    let cfg = short_timeout_config();
    let (tx, rx) = bounded(64);
    let mut script = vec![true];
    script.extend(vec![false; 11]);
    for _ in 0..script.len() {
        tx.send(frame(&cfg, 1)).unwrap();
    }
    let mut vad = ScriptedVad::new(script);
    let stop_flag = AtomicBool::new(false);

    let outcome =
        run_capture_loop(&rx, &cfg, &mut vad, &stop_flag, &Mutex::new(None), None).unwrap();
    let utterance = outcome.utterance.expect("one utterance expected");
    assert_eq!(utterance.samples.len(), 12 * cfg.frame_samples());
    assert_eq!(outcome.metrics.stop_reason, StopReason::UtteranceComplete);
    assert_eq!(outcome.metrics.frames_processed, 12);
    assert_eq!(outcome.metrics.speech_frames, 1);
    assert_eq!(outcome.metrics.trailing_silence_ms, 330);
}

#[test]
fn capture_loop_cancelled_while_idle_returns_no_utterance() {
    let cfg = short_timeout_config();
    let (_tx, rx) = bounded::<Vec<i16>>(8);
    let mut vad = ScriptedVad::new(Vec::new());
    let stop_flag = AtomicBool::new(true);

    let outcome =
        run_capture_loop(&rx, &cfg, &mut vad, &stop_flag, &Mutex::new(None), None).unwrap();
    assert!(outcome.utterance.is_none());
    assert_eq!(outcome.metrics.stop_reason, StopReason::Cancelled);
}

#[test]
fn capture_loop_disconnect_mid_utterance_flushes_partial() {
    let cfg = short_timeout_config();
    let (tx, rx) = bounded(8);
    tx.send(frame(&cfg, 1)).unwrap();
    tx.send(frame(&cfg, 2)).unwrap();
    drop(tx);
    let mut vad = ScriptedVad::new(vec![true, true]);
    let stop_flag = AtomicBool::new(false);

    let outcome =
        run_capture_loop(&rx, &cfg, &mut vad, &stop_flag, &Mutex::new(None), None).unwrap();
    let utterance = outcome.utterance.expect("partial capture must be flushed");
    assert_eq!(utterance.samples.len(), 2 * cfg.frame_samples());
    assert_eq!(outcome.metrics.stop_reason, StopReason::StreamClosed);
}

#[test]
fn capture_loop_disconnect_while_idle_is_fatal() {
    let cfg = short_timeout_config();
    let (tx, rx) = bounded::<Vec<i16>>(8);
    drop(tx);
    let mut vad = ScriptedVad::new(Vec::new());
    let stop_flag = AtomicBool::new(false);

    let err = run_capture_loop(&rx, &cfg, &mut vad, &stop_flag, &Mutex::new(None), None)
        .expect_err("idle disconnect is device loss");
    assert!(matches!(err, CaptureError::Stream(_)));
}

#[test]
fn capture_loop_reports_device_failure_while_idle() {
    // Device loss never disconnects the channel in production: the senders
    // live in the stream callbacks. The error callback fills the shared
    // slot instead, and the loop must surface it rather than wait forever.
    let cfg = short_timeout_config();
    let (_tx, rx) = bounded::<Vec<i16>>(8);
    let mut vad = ScriptedVad::new(Vec::new());
    let stop_flag = AtomicBool::new(false);
    let stream_error = Mutex::new(Some("device not available".to_string()));

    let err = run_capture_loop(&rx, &cfg, &mut vad, &stop_flag, &stream_error, None)
        .expect_err("idle device failure is fatal");
    match err {
        CaptureError::Stream(reason) => assert!(reason.contains("device not available")),
        other => panic!("expected Stream error, got {other:?}"),
    }
}

#[test]
fn capture_loop_device_failure_mid_utterance_flushes_partial() {
    // Queued frames are classified before the failure is acted on, and the
    // partial utterance survives.
    let cfg = short_timeout_config();
    let (tx, rx) = bounded(8);
    tx.send(frame(&cfg, 1)).unwrap();
    tx.send(frame(&cfg, 2)).unwrap();
    let mut vad = ScriptedVad::new(vec![true, true]);
    let stop_flag = AtomicBool::new(false);
    let stream_error = Mutex::new(Some("device not available".to_string()));

    let outcome =
        run_capture_loop(&rx, &cfg, &mut vad, &stop_flag, &stream_error, None).unwrap();
    let utterance = outcome.utterance.expect("partial capture must be flushed");
    assert_eq!(utterance.samples.len(), 2 * cfg.frame_samples());
    assert_eq!(outcome.metrics.stop_reason, StopReason::StreamClosed);
    assert_eq!(outcome.metrics.frames_processed, 2);
}

#[test]
fn capture_loop_updates_level_meter() {
    let cfg = short_timeout_config();
    let (tx, rx) = bounded(64);
    let mut script = vec![true];
    script.extend(vec![false; 11]);
    for _ in 0..script.len() {
        // 8192/32768 = 0.25 full scale, about -12 dB RMS.
        tx.send(frame(&cfg, 8_192)).unwrap();
    }
    let mut vad = ScriptedVad::new(script);
    let stop_flag = AtomicBool::new(false);
    let meter = LevelMeter::new();

    run_capture_loop(&rx, &cfg, &mut vad, &stop_flag, &Mutex::new(None), Some(&meter)).unwrap();
    let level = meter.level_db();
    assert!(level > -13.0 && level < -11.0, "got {level} dB");
}

#[test]
fn downmix_averages_stereo_pairs() {
    let mut buf = Vec::new();
    append_downmixed_samples(&mut buf, &[1.0f32, -1.0, 0.5, 0.5], 2, |s| s);
    assert_eq!(buf, vec![0, 16_384]);
}

#[test]
fn downmix_preserves_mono_input() {
    let mut buf = Vec::new();
    append_downmixed_samples(&mut buf, &[0.0f32, 1.0, -1.0], 1, |s| s);
    assert_eq!(buf, vec![0, i16::MAX, i16::MIN]);
}

#[test]
fn downmix_round_trips_mono_i16_exactly() {
    // Device-native i16 input goes through the shared float path; the
    // 32768 scale makes that conversion lossless.
    let input = [0i16, 1, -1, 16_384, -16_384, i16::MAX, i16::MIN];
    let mut buf = Vec::new();
    append_downmixed_samples(&mut buf, &input, 1, |s| f32::from(s) / 32_768.0);
    assert_eq!(buf, input.to_vec());
}

#[test]
fn dispatcher_assembles_exact_frames() {
    let (tx, rx) = bounded(8);
    let dropped = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = FrameDispatcher::new(480, tx, dropped.clone());

    dispatcher.push(&vec![0.1f32; 160], 1, |s| s);
    assert!(rx.try_recv().is_err(), "no full frame yet");
    dispatcher.push(&vec![0.1f32; 400], 1, |s| s);
    let frame = rx.try_recv().expect("one full frame assembled");
    assert_eq!(frame.len(), 480);
    assert_eq!(dropped.load(Ordering::Relaxed), 0);
}

#[test]
fn dispatcher_counts_dropped_frames_on_overflow() {
    let (tx, rx) = bounded(1);
    let dropped = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = FrameDispatcher::new(4, tx, dropped.clone());

    // 12 samples = 3 frames into a channel holding 1.
    dispatcher.push(&vec![0.0f32; 12], 1, |s| s);
    assert_eq!(dropped.load(Ordering::Relaxed), 2);
    assert_eq!(rx.try_recv().unwrap().len(), 4);
}

#[test]
fn aggressiveness_levels_clamp_to_profiles() {
    assert_eq!(Aggressiveness::from_level(0), Aggressiveness::Quality);
    assert_eq!(Aggressiveness::from_level(1), Aggressiveness::LowBitrate);
    assert_eq!(Aggressiveness::from_level(2), Aggressiveness::Aggressive);
    assert_eq!(Aggressiveness::from_level(3), Aggressiveness::VeryAggressive);
    assert_eq!(Aggressiveness::from_level(9), Aggressiveness::VeryAggressive);
}

#[test]
fn earshot_vad_rejects_bad_frame_duration_at_open_time() {
    let cfg = CaptureConfig {
        chunk_duration_ms: 25,
        ..CaptureConfig::default()
    };
    let err = EarshotVad::new(&cfg).expect_err("25 ms frames rejected");
    assert!(matches!(err, CaptureError::InvalidFrameSize { chunk_ms: 25 }));
}

#[test]
fn earshot_vad_rejects_bad_sample_rate_at_open_time() {
    let cfg = CaptureConfig {
        sample_rate: 44_100,
        ..CaptureConfig::default()
    };
    let err = EarshotVad::new(&cfg).expect_err("44.1 kHz rejected");
    assert!(matches!(
        err,
        CaptureError::UnsupportedSampleRate { rate: 44_100 }
    ));
}

#[test]
fn earshot_vad_classifies_silence_as_non_speech() {
    let cfg = CaptureConfig::default();
    let mut vad = EarshotVad::new(&cfg).unwrap();
    assert_eq!(vad.name(), "earshot_vad");
    let silent = vec![0i16; cfg.frame_samples()];
    assert!(!vad.classify(&silent));
}

fn scratch_dir(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("uttercap-audio-{}-{name}", std::process::id()))
}

#[test]
fn sink_persists_byte_identical_files_for_the_same_utterance() {
    let dir = scratch_dir("idempotent");
    let _ = std::fs::remove_dir_all(&dir);
    let utterance = Utterance {
        sample_rate: 16_000,
        samples: (0..960).map(|i| (i % 128) as i16).collect(),
    };

    let mut sink = UtteranceSink::with_dir(&dir);
    let first = sink.persist(&utterance).unwrap();
    let second = sink.persist(&utterance).unwrap();
    assert_ne!(first, second, "each utterance gets its own file");

    let a = std::fs::read(&first).unwrap();
    let b = std::fs::read(&second).unwrap();
    assert_eq!(a, b, "same utterance must serialize identically");

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn sink_output_round_trips_through_hound() {
    let dir = scratch_dir("roundtrip");
    let _ = std::fs::remove_dir_all(&dir);
    let utterance = Utterance {
        sample_rate: 16_000,
        samples: vec![0, 1, -1, i16::MAX, i16::MIN],
    };

    let path = dir.join("clip.wav");
    std::fs::create_dir_all(&dir).unwrap();
    write_wav(&path, &utterance).unwrap();

    let mut reader = hound::WavReader::open(&path).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, 16_000);
    assert_eq!(spec.bits_per_sample, 16);
    let samples: Vec<i16> = reader.samples::<i16>().map(Result::unwrap).collect();
    assert_eq!(samples, utterance.samples);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn utterance_duration_follows_sample_rate() {
    let utterance = Utterance {
        sample_rate: 16_000,
        samples: vec![0; 480 * 19],
    };
    assert_eq!(utterance.duration_ms(), 570);
}
