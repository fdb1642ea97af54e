//! CLI driver: configure the pipeline, listen, print transcripts.
//!
//! Each finished utterance is printed on its own line and optionally
//! appended to a transcript file; capture errors end the session while
//! transcription errors only skip that utterance.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use uttercap::audio::{LevelMeter, Recorder};
use uttercap::config::AppConfig;
use uttercap::stt::Transcriber;
use uttercap::voice::{start_listener, ListenerMessage};
use uttercap::{app::logging, telemetry};

fn main() -> Result<()> {
    let config = AppConfig::parse_args()?;
    logging::init_logging(&config);
    telemetry::init_tracing(&config);
    std::panic::set_hook(Box::new(|info| logging::log_panic(info)));

    if config.list_input_devices {
        list_input_devices();
        return Ok(());
    }

    let recorder = Recorder::new(config.input_device.as_deref())?;
    let transcriber = match config.whisper_model_path.as_deref() {
        Some(path) => Some(Arc::new(Mutex::new(
            Transcriber::new(path).context("failed to load whisper model")?,
        ))),
        None => {
            eprintln!("No --whisper-model-path given; utterances will be saved without transcription.");
            None
        }
    };

    eprintln!(
        "Listening on '{}'. Speak, pause, and the utterance is processed. Press Enter to stop.",
        recorder.device_name()
    );
    tracing::info!(device = %recorder.device_name(), "listener starting");

    let meter = config.log_timings.then(LevelMeter::new);
    let mut job = start_listener(
        Arc::new(Mutex::new(recorder)),
        transcriber,
        config.clone(),
        meter.clone(),
    );

    // Enter raises the same cooperative stop flag the capture loop polls.
    let stop_flag = job.stop_flag();
    thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
        stop_flag.store(true, Ordering::Relaxed);
    });

    // One input-level line per second in the timing log.
    if let Some(meter) = meter {
        let stop_flag = job.stop_flag();
        thread::spawn(move || {
            while !stop_flag.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_secs(1));
                logging::log_debug(&format!("meter|level_db={:.1}", meter.level_db()));
            }
        });
    }

    let mut transcript_file = match &config.transcript_file {
        Some(path) => Some(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open transcript file {}", path.display()))?,
        ),
        None => None,
    };

    for message in &job.receiver {
        match message {
            ListenerMessage::Transcript { text, .. } => {
                println!("{text}");
                if let Some(file) = transcript_file.as_mut() {
                    writeln!(file, "{text}").context("failed to append transcript")?;
                }
            }
            ListenerMessage::Saved { path, .. } => {
                println!("(utterance saved: {})", path.display());
            }
            ListenerMessage::Empty { .. } => {}
            ListenerMessage::Error(err) => eprintln!("error: {err}"),
            ListenerMessage::Stopped => break,
        }
    }

    if let Some(handle) = job.handle.take() {
        let _ = handle.join();
    }
    Ok(())
}

fn list_input_devices() {
    match Recorder::list_devices() {
        Ok(devices) if devices.is_empty() => println!("No audio input devices detected."),
        Ok(devices) => {
            println!("Detected audio input devices:");
            for device in devices {
                println!(
                    "  {} [{} input channel(s), host: {}]",
                    device.name, device.max_input_channels, device.host
                );
            }
        }
        Err(err) => println!("Failed to list audio input devices: {err}"),
    }
}
