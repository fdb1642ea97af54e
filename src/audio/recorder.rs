//! Microphone access via CPAL.
//!
//! Owns device selection and the input stream for one listening pass. The
//! stream feeds fixed-size mono i16 frames through a bounded channel into
//! the capture loop; the stream handle never leaves this module and is
//! paused and dropped on every exit path, including error and cancellation.

use super::capture::{run_capture_loop, CaptureConfig, CaptureError, CaptureOutcome};
use super::dispatch::FrameDispatcher;
use super::meter::LevelMeter;
use super::vad::VadEngine;
use crate::log_debug;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::bounded;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// One entry from input device enumeration.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub max_input_channels: u16,
    pub host: String,
}

/// Audio input device wrapper.
pub struct Recorder {
    device: cpal::Device,
}

impl Recorder {
    /// Enumerate input devices so callers can offer a selector.
    pub fn list_devices() -> Result<Vec<DeviceInfo>, CaptureError> {
        let host = cpal::default_host();
        let host_name = host.id().name().to_string();
        let devices = host
            .input_devices()
            .map_err(|err| CaptureError::DeviceUnavailable(err.to_string()))?;
        let mut out = Vec::new();
        for device in devices {
            let Ok(name) = device.name() else { continue };
            let max_input_channels = device
                .default_input_config()
                .map(|cfg| cfg.channels())
                .unwrap_or(0);
            out.push(DeviceInfo {
                name,
                max_input_channels,
                host: host_name.clone(),
            });
        }
        Ok(out)
    }

    /// Open a recorder on the named device, or the default input device.
    ///
    /// A device without input channels is rejected here, before any frame is
    /// ever read.
    pub fn new(preferred_device: Option<&str>) -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = match preferred_device {
            Some(name) => {
                let mut devices = host
                    .input_devices()
                    .map_err(|err| CaptureError::DeviceUnavailable(err.to_string()))?;
                devices
                    .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                    .ok_or_else(|| {
                        CaptureError::DeviceUnavailable(format!(
                            "input device '{name}' not found"
                        ))
                    })?
            }
            None => host.default_input_device().ok_or_else(|| {
                CaptureError::DeviceUnavailable("no default input device available".into())
            })?,
        };
        let config = device
            .default_input_config()
            .map_err(|err| CaptureError::DeviceUnavailable(err.to_string()))?;
        ensure_input_channels(config.channels(), &device.name().unwrap_or_default())?;
        Ok(Self { device })
    }

    pub fn device_name(&self) -> String {
        self.device
            .name()
            .unwrap_or_else(|_| "Unknown Device".to_string())
    }

    /// Capture until one utterance completes or `stop_flag` is raised.
    ///
    /// Returns `CaptureOutcome` with `utterance: None` when cancelled while
    /// idle; cancellation or device loss mid-utterance flushes the partial
    /// segment instead of discarding it.
    pub fn listen_for_utterance(
        &self,
        cfg: &CaptureConfig,
        vad: &mut dyn VadEngine,
        stop_flag: &AtomicBool,
        meter: Option<&LevelMeter>,
    ) -> Result<CaptureOutcome, CaptureError> {
        let resolved = self.stream_config(cfg)?;
        let channels = usize::from(resolved.config.channels.max(1));
        let frame_samples = cfg.frame_samples().max(1);

        let (sender, receiver) = bounded::<Vec<i16>>(cfg.channel_capacity.max(1));
        let dropped = Arc::new(AtomicUsize::new(0));
        let dispatcher = Arc::new(Mutex::new(FrameDispatcher::new(
            frame_samples,
            sender,
            dropped.clone(),
        )));

        // The senders live inside the stream callbacks, so device loss never
        // disconnects the channel; the error callback reports it through
        // this slot and the capture loop checks it whenever frames stop.
        let stream_error = Arc::new(Mutex::new(None::<String>));
        let err_fn = {
            let slot = stream_error.clone();
            move |err: cpal::StreamError| {
                log_debug(&format!("audio_stream_error: {err}"));
                if let Ok(mut slot) = slot.lock() {
                    slot.get_or_insert_with(|| err.to_string());
                }
            }
        };
        let stream = match resolved.format {
            SampleFormat::F32 => {
                let dispatcher = dispatcher.clone();
                let dropped = dropped.clone();
                self.device.build_input_stream(
                    &resolved.config,
                    move |data: &[f32], _| {
                        if let Ok(mut pump) = dispatcher.try_lock() {
                            pump.push(data, channels, |sample| sample);
                        } else {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )
            }
            SampleFormat::I16 => {
                let dispatcher = dispatcher.clone();
                let dropped = dropped.clone();
                self.device.build_input_stream(
                    &resolved.config,
                    move |data: &[i16], _| {
                        if let Ok(mut pump) = dispatcher.try_lock() {
                            pump.push(data, channels, |sample| f32::from(sample) / 32_768.0);
                        } else {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )
            }
            SampleFormat::U16 => {
                let dispatcher = dispatcher.clone();
                let dropped = dropped.clone();
                self.device.build_input_stream(
                    &resolved.config,
                    move |data: &[u16], _| {
                        if let Ok(mut pump) = dispatcher.try_lock() {
                            pump.push(data, channels, |sample| {
                                (f32::from(sample) - 32_768.0) / 32_768.0
                            });
                        } else {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )
            }
            other => {
                return Err(CaptureError::DeviceUnavailable(format!(
                    "unsupported sample format: {other:?}"
                )))
            }
        }
        .map_err(|err| CaptureError::DeviceUnavailable(err.to_string()))?;

        stream
            .play()
            .map_err(|err| CaptureError::Stream(err.to_string()))?;

        let outcome = run_capture_loop(&receiver, cfg, vad, stop_flag, &stream_error, meter);

        if let Err(err) = stream.pause() {
            log_debug(&format!("failed to pause audio stream: {err}"));
        }
        drop(stream);
        if let Some(meter) = meter {
            meter.set_db(-60.0);
        }

        let mut outcome = outcome?;
        outcome.metrics.frames_dropped = dropped.load(Ordering::Relaxed);
        if outcome.metrics.frames_dropped > 0 {
            log_debug(&format!(
                "capture: {} frame(s) dropped on buffer overflow",
                outcome.metrics.frames_dropped
            ));
        }
        Ok(outcome)
    }

    /// Resolve a stream config at the configured rate, failing fast when the
    /// device cannot supply it. Capture runs at the requested rate directly;
    /// there is no resampling stage.
    fn stream_config(&self, cfg: &CaptureConfig) -> Result<ResolvedStreamConfig, CaptureError> {
        let default_config = self
            .device
            .default_input_config()
            .map_err(|err| CaptureError::DeviceUnavailable(err.to_string()))?;
        let format = default_config.sample_format();
        let channels = default_config.channels();

        let supported = self
            .device
            .supported_input_configs()
            .map_err(|err| CaptureError::DeviceUnavailable(err.to_string()))?;
        let rate_supported = supported.into_iter().any(|range| {
            range.channels() == channels
                && range.min_sample_rate().0 <= cfg.sample_rate
                && range.max_sample_rate().0 >= cfg.sample_rate
        });
        if !rate_supported {
            return Err(CaptureError::DeviceUnavailable(format!(
                "device '{}' does not support capture at {} Hz",
                self.device_name(),
                cfg.sample_rate
            )));
        }

        Ok(ResolvedStreamConfig {
            config: StreamConfig {
                channels,
                sample_rate: cpal::SampleRate(cfg.sample_rate),
                buffer_size: cpal::BufferSize::Default,
            },
            format,
        })
    }
}

/// A device that reports no input channels can never produce a frame;
/// reject it at open time.
pub(super) fn ensure_input_channels(channels: u16, name: &str) -> Result<(), CaptureError> {
    if channels == 0 {
        return Err(CaptureError::DeviceUnavailable(format!(
            "'{name}' has no input channels"
        )));
    }
    Ok(())
}

struct ResolvedStreamConfig {
    config: StreamConfig,
    format: SampleFormat,
}
