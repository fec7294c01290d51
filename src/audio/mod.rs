pub mod level;
pub mod meter;
pub mod runtime;
pub mod tone;
pub mod wav;

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use crossbeam_channel::{unbounded, Receiver};
use rubato::{FftFixedIn, Resampler};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::mpsc;

use self::level::encode_samples;
use self::tone::{ToneParams, ToneSource};
use self::wav::WavSource;

/// Sample rate every chunk is delivered at (16 kHz)
pub const TARGET_SAMPLE_RATE: u32 = 16000;

/// Chunks are always mono
pub const TARGET_CHANNELS: usize = 1;

/// Stable device identifier for persistence across reboots
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DeviceId {
    pub host_api: String,
    pub index: u32,
    pub name: String,
}

/// Device information for enumeration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub host: String,
    pub max_channels: u16,
    pub sample_rates: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stable_id: Option<DeviceId>,
}

/// Friendly error message with optional error code
#[derive(Debug, Clone, Serialize)]
pub struct FriendlyError {
    pub message: String,
    pub code: String,
    pub technical: String,
}

/// Map common CPAL/audio errors to user-friendly messages
pub fn friendly_audio_error(error: &anyhow::Error) -> FriendlyError {
    let technical = format!("{:#}", error);
    let lower = technical.to_lowercase();

    let (message, code) = if lower.contains("device busy")
        || lower.contains("in use")
        || lower.contains("already in use")
    {
        (
            "Another app is using this microphone. Close other audio apps and try again.",
            "device_busy",
        )
    } else if lower.contains("no such device")
        || lower.contains("not found")
        || lower.contains("does not exist")
        || lower.contains("disconnected")
        || lower.contains("no longer available")
    {
        (
            "Microphone was unplugged or is no longer available. Please reconnect it.",
            "device_not_found",
        )
    } else if lower.contains("permission")
        || lower.contains("access denied")
        || lower.contains("denied")
    {
        (
            "Permission denied. Check your system's microphone settings.",
            "permission_denied",
        )
    } else if lower.contains("timeout") || lower.contains("timed out") {
        (
            "Audio device timed out. Try unplugging and reconnecting it.",
            "timeout",
        )
    } else if lower.contains("no default")
        || lower.contains("no input device")
        || lower.contains("no microphone")
    {
        (
            "No microphone found. Please connect a microphone.",
            "no_device",
        )
    } else {
        (
            "Audio system error. Try reconnecting your microphone.",
            "unknown",
        )
    };

    FriendlyError {
        message: message.to_string(),
        code: code.to_string(),
        technical,
    }
}

/// List all available input devices
pub fn list_input_devices() -> Result<Vec<DeviceInfo>> {
    let host = cpal::default_host();
    let default_device_name = host.default_input_device().and_then(|d| d.name().ok());

    let host_id = host.id().name();
    let mut devices = Vec::new();

    for (index, device) in host
        .input_devices()
        .context("Failed to enumerate input devices")?
        .enumerate()
    {
        let Ok(name) = device.name() else {
            continue;
        };
        let is_default = Some(&name) == default_device_name.as_ref();

        let (max_channels, sample_rates) = device
            .supported_input_configs()
            .ok()
            .and_then(|mut configs| configs.next())
            .map(|config| {
                let rates = vec![config.min_sample_rate().0, config.max_sample_rate().0];
                (config.channels(), rates)
            })
            .unwrap_or((1, vec![TARGET_SAMPLE_RATE]));

        let stable_id = Some(DeviceId {
            host_api: host_id.to_string(),
            index: index as u32,
            name: name.clone(),
        });

        devices.push(DeviceInfo {
            name,
            is_default,
            host: host_id.to_string(),
            max_channels,
            sample_rates,
            stable_id,
        });
    }

    Ok(devices)
}

/// Capture configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate_hz: u32,
    /// Duration covered by one delivered chunk
    pub chunk_ms: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    /// Stable input device identifier (primary key for persistence)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stable_input_id: Option<DeviceId>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: TARGET_SAMPLE_RATE,
            chunk_ms: 100,
            device_name: None,
            stable_input_id: None,
        }
    }
}

impl AudioConfig {
    pub fn samples_per_chunk(&self) -> usize {
        (self.sample_rate_hz as u64 * self.chunk_ms as u64 / 1000) as usize
    }
}

/// Resolve preferred input device using stable_id (primary), name (fallback), or default
///
/// Returns `Ok(None)` when the system default should be used.
pub fn resolve_preferred_input_device(
    stable_id: Option<&DeviceId>,
    name: Option<&str>,
) -> Result<Option<cpal::Device>> {
    let host = cpal::default_host();

    if let Some(sid) = stable_id {
        log::debug!("Attempting to resolve device by stable_id: {:?}", sid);

        if host.id().name() == sid.host_api {
            if let Ok(devices) = host.input_devices() {
                for (idx, device) in devices.enumerate() {
                    if idx as u32 == sid.index
                        && device.name().ok().as_deref() == Some(sid.name.as_str())
                    {
                        log::info!("✓ Resolved device by stable_id: {}", sid.name);
                        return Ok(Some(device));
                    }
                }
            }
        }

        log::warn!("Device stable_id not found, falling back to name match");
    }

    if let Some(device_name) = name {
        log::debug!("Attempting to resolve device by name: {}", device_name);

        if let Ok(mut devices) = host.input_devices() {
            if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(device_name))
            {
                log::info!("✓ Resolved device by name: {}", device_name);
                return Ok(Some(device));
            }
        }

        log::warn!(
            "Device name '{}' not found, falling back to default",
            device_name
        );
    }

    Ok(None)
}

/// A producer of 16 kHz mono PCM16-LE chunks.
///
/// Sources are confined to the worker thread that created them, so `Send` is
/// not required (cpal streams are not `Send` on every platform).
pub trait AudioSource {
    /// Next chunk if one is ready. `Ok(None)` means "nothing yet" unless
    /// [`is_finished`](Self::is_finished) reports true.
    fn next_chunk(&mut self) -> Result<Option<Vec<u8>>>;

    /// Sample rate of delivered chunks
    fn sample_rate(&self) -> u32;

    /// Samples per full chunk
    fn chunk_size(&self) -> usize;

    /// Finite sources report true once they have nothing left to deliver.
    fn is_finished(&self) -> bool {
        false
    }
}

/// Where a session takes its chunks from
#[derive(Debug, Clone)]
pub enum SourceSpec {
    Microphone(AudioConfig),
    Wav {
        path: PathBuf,
        chunk_ms: u32,
        paced: bool,
    },
    Tone(ToneParams),
}

impl SourceSpec {
    /// Open the source. Called on the thread that will poll it.
    pub fn open(&self) -> Result<Box<dyn AudioSource>> {
        match self {
            SourceSpec::Microphone(config) => Ok(Box::new(AudioCapture::new(config.clone())?)),
            SourceSpec::Wav {
                path,
                chunk_ms,
                paced,
            } => Ok(Box::new(WavSource::open(path, *chunk_ms, *paced)?)),
            SourceSpec::Tone(params) => Ok(Box::new(ToneSource::new(params.clone()))),
        }
    }

    /// Reject inputs that can be checked without acquiring a device.
    /// Microphones are only validated when the worker opens them.
    pub fn check(&self) -> Result<()> {
        if let SourceSpec::Wav { path, .. } = self {
            WavSource::probe(path)?;
        }
        Ok(())
    }

    /// Whether the session ends on its own
    pub fn is_finite(&self) -> bool {
        !matches!(self, SourceSpec::Microphone(_))
    }
}

/// Microphone capture using CPAL
///
/// The input callback downmixes to mono i16 and forwards each device buffer.
/// [`next_chunk`](AudioSource::next_chunk) resamples to 16 kHz when needed and
/// slices the stream into fixed-size chunks.
pub struct AudioCapture {
    _stream: Stream,
    receiver: mpsc::UnboundedReceiver<Vec<i16>>,
    errors: Receiver<cpal::StreamError>,
    config: AudioConfig,
    resampler: Option<FftFixedIn<f32>>,
    buffer: Vec<i16>,
    resample_input_buffer: Vec<f32>,
}

impl AudioCapture {
    /// Open the configured device, or the system default
    pub fn new(config: AudioConfig) -> Result<Self> {
        let resolved = resolve_preferred_input_device(
            config.stable_input_id.as_ref(),
            config.device_name.as_deref(),
        )?;

        let device = match resolved {
            Some(device) => device,
            None => cpal::default_host()
                .default_input_device()
                .context("No input device available")?,
        };

        Self::new_with_device(config, device)
    }

    fn new_with_device(config: AudioConfig, device: cpal::Device) -> Result<Self> {
        log::info!("Using audio device: {}", device.name()?);

        let supported_config = device
            .default_input_config()
            .context("Failed to get default input config")?;

        let sample_rate = supported_config.sample_rate().0;
        let channels = supported_config.channels();

        log::info!(
            "Device config: {} Hz, {} channels, format: {:?}",
            sample_rate,
            channels,
            supported_config.sample_format()
        );

        let resampler = if sample_rate != config.sample_rate_hz {
            log::info!(
                "Audio: device={}Hz, {}ch -> {}Hz, {}ch",
                sample_rate,
                channels,
                config.sample_rate_hz,
                TARGET_CHANNELS
            );

            Some(
                FftFixedIn::<f32>::new(
                    sample_rate as usize,
                    config.sample_rate_hz as usize,
                    config.samples_per_chunk().max(1),
                    2,
                    TARGET_CHANNELS,
                )
                .context("Failed to create resampler")?,
            )
        } else {
            log::info!(
                "Audio: device={}Hz, {}ch (no resampling needed)",
                sample_rate,
                channels
            );
            None
        };

        let (sender, receiver) = mpsc::unbounded_channel();
        let (err_tx, errors) = unbounded();

        let stream_config = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let channels = channels as usize;

        let on_error = move |err: cpal::StreamError| {
            log::error!("Audio stream error: {}", err);
            let _ = err_tx.send(err);
        };

        let stream = match supported_config.sample_format() {
            SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &_| {
                    let _ = sender.send(downmix_f32(data, channels));
                },
                on_error,
                None,
            )?,
            SampleFormat::I16 => device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &_| {
                    let _ = sender.send(downmix_i16(data, channels));
                },
                on_error,
                None,
            )?,
            SampleFormat::U16 => device.build_input_stream(
                &stream_config,
                move |data: &[u16], _: &_| {
                    let _ = sender.send(downmix_u16(data, channels));
                },
                on_error,
                None,
            )?,
            other => anyhow::bail!("Unsupported sample format: {:?}", other),
        };

        stream.play().context("Failed to start input stream")?;

        log::info!("Audio capture started successfully");

        Ok(Self {
            _stream: stream,
            receiver,
            errors,
            config,
            resampler,
            buffer: Vec::new(),
            resample_input_buffer: Vec::new(),
        })
    }

    fn resample_into_buffer(&mut self, data: Vec<i16>) {
        let Some(resampler) = self.resampler.as_mut() else {
            self.buffer.extend_from_slice(&data);
            return;
        };

        self.resample_input_buffer
            .extend(data.iter().map(|&s| s as f32 / i16::MAX as f32));

        loop {
            let needed = resampler.input_frames_next();
            if self.resample_input_buffer.len() < needed {
                break;
            }
            let input = vec![self
                .resample_input_buffer
                .drain(..needed)
                .collect::<Vec<f32>>()];

            match resampler.process(&input, None) {
                Ok(output) => {
                    self.buffer.extend(output[0].iter().map(|&s| {
                        (s * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16
                    }));
                }
                Err(e) => log::error!("Resampling error: {}", e),
            }
        }
    }
}

impl AudioSource for AudioCapture {
    fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        while let Ok(err) = self.errors.try_recv() {
            if matches!(err, cpal::StreamError::DeviceNotAvailable) {
                anyhow::bail!("Input device is no longer available");
            }
        }

        while let Ok(data) = self.receiver.try_recv() {
            self.resample_into_buffer(data);
        }

        let chunk_size = self.config.samples_per_chunk();
        if chunk_size > 0 && self.buffer.len() >= chunk_size {
            let samples: Vec<i16> = self.buffer.drain(..chunk_size).collect();
            Ok(Some(encode_samples(&samples)))
        } else {
            Ok(None)
        }
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate_hz
    }

    fn chunk_size(&self) -> usize {
        self.config.samples_per_chunk()
    }
}

fn downmix_f32(data: &[f32], channels: usize) -> Vec<i16> {
    data.chunks(channels)
        .map(|frame| {
            let avg = frame.iter().sum::<f32>() / frame.len() as f32;
            (avg * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16
        })
        .collect()
}

fn downmix_i16(data: &[i16], channels: usize) -> Vec<i16> {
    data.chunks(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / frame.len() as i32) as i16
        })
        .collect()
}

fn downmix_u16(data: &[u16], channels: usize) -> Vec<i16> {
    data.chunks(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / frame.len() as i32 - 32768) as i16
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_config() {
        let config = AudioConfig::default();
        assert_eq!(config.sample_rate_hz, 16000);
        assert_eq!(config.samples_per_chunk(), 1600); // 100ms @ 16kHz
    }

    #[test]
    fn test_downmix_i16_averages_frames() {
        let stereo = [1000i16, 3000, -2000, -4000];
        assert_eq!(downmix_i16(&stereo, 2), vec![2000, -3000]);
        assert_eq!(downmix_i16(&stereo, 1), stereo.to_vec());
    }

    #[test]
    fn test_downmix_u16_recenters() {
        assert_eq!(downmix_u16(&[32768, 32768], 2), vec![0]);
        assert_eq!(downmix_u16(&[0], 1), vec![i16::MIN]);
        assert_eq!(downmix_u16(&[65535], 1), vec![i16::MAX]);
    }

    #[test]
    fn test_downmix_f32_clamps() {
        assert_eq!(downmix_f32(&[2.0], 1), vec![i16::MAX]);
        assert_eq!(downmix_f32(&[0.0, 0.0], 2), vec![0]);
    }

    #[test]
    fn test_friendly_errors() {
        let busy = friendly_audio_error(&anyhow::anyhow!("Device busy"));
        assert_eq!(busy.code, "device_busy");

        let gone = friendly_audio_error(&anyhow::anyhow!("Input device is no longer available"));
        assert_eq!(gone.code, "device_not_found");

        let none = friendly_audio_error(&anyhow::anyhow!("No input device available"));
        assert_eq!(none.code, "no_device");

        let other = friendly_audio_error(&anyhow::anyhow!("something odd"));
        assert_eq!(other.code, "unknown");
        assert_eq!(other.technical, "something odd");
    }

    #[test]
    fn test_source_spec_finiteness() {
        assert!(!SourceSpec::Microphone(AudioConfig::default()).is_finite());
        assert!(SourceSpec::Tone(ToneParams::default()).is_finite());
    }
}
