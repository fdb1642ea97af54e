use super::AppConfig;
use clap::Parser;

fn parse(args: &[&str]) -> AppConfig {
    let mut full = vec!["uttercap"];
    full.extend_from_slice(args);
    AppConfig::parse_from(full)
}

#[test]
fn default_config_is_valid() {
    let mut cfg = parse(&[]);
    cfg.validate().expect("defaults should validate");
    assert_eq!(cfg.sample_rate, 16_000);
    assert_eq!(cfg.chunk_duration_ms, 30);
    assert_eq!(cfg.vad_aggressiveness, 3);
    assert_eq!(cfg.padding_ms, 300);
    assert_eq!(cfg.silence_timeout_ms, 1_500);
    assert_eq!(cfg.lang, "auto");
}

#[test]
fn rejects_unsupported_sample_rate() {
    let mut cfg = parse(&["--sample-rate", "44100"]);
    let err = cfg.validate().expect_err("44.1 kHz is not a VAD rate");
    assert!(err.to_string().contains("--sample-rate"));
}

#[test]
fn rejects_unsupported_chunk_duration() {
    let mut cfg = parse(&["--chunk-duration-ms", "25"]);
    let err = cfg.validate().expect_err("25 ms is not a VAD frame size");
    assert!(err.to_string().contains("--chunk-duration-ms"));
}

#[test]
fn rejects_out_of_range_aggressiveness() {
    let mut cfg = parse(&["--vad-aggressiveness", "4"]);
    let err = cfg.validate().expect_err("aggressiveness caps at 3");
    assert!(err.to_string().contains("--vad-aggressiveness"));
}

#[test]
fn rejects_padding_shorter_than_one_chunk() {
    let mut cfg = parse(&["--padding-ms", "10", "--chunk-duration-ms", "30"]);
    let err = cfg.validate().expect_err("padding must hold a whole frame");
    assert!(err.to_string().contains("--padding-ms"));
}

#[test]
fn rejects_zero_silence_timeout() {
    let mut cfg = parse(&["--silence-timeout-ms", "0"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_tiny_channel_capacity() {
    let mut cfg = parse(&["--channel-capacity", "2"]);
    let err = cfg.validate().expect_err("capacity below 8 rejected");
    assert!(err.to_string().contains("--channel-capacity"));
}

#[test]
fn rejects_oversized_beam() {
    let mut cfg = parse(&["--whisper-beam-size", "11"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_negative_temperature() {
    let mut cfg = parse(&["--whisper-temperature=-0.5"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn accepts_language_codes_and_auto() {
    for lang in ["auto", "pt", "en", "yue"] {
        let mut cfg = parse(&["--lang", lang]);
        cfg.validate()
            .unwrap_or_else(|e| panic!("{lang} should validate: {e}"));
    }
    let mut cfg = parse(&["--lang", "Portuguese"]);
    let err = cfg.validate().expect_err("full names rejected");
    assert!(err.to_string().contains("--lang"));
}
