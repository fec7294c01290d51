//! Synthetic sine-wave source
//!
//! Feeds the meter without a microphone: handy for checking the pipeline end
//! to end and for tests that must not touch audio hardware.

use anyhow::Result;
use std::f64::consts::TAU;
use std::time::{Duration, Instant};

use super::level::encode_samples;
use super::{AudioSource, TARGET_SAMPLE_RATE};

/// Tone parameters, clamped to safe ranges when the source is built
#[derive(Debug, Clone, PartialEq)]
pub struct ToneParams {
    pub freq_hz: f32,
    /// Peak amplitude as a fraction of full scale (0.0-1.0)
    pub amplitude: f32,
    pub duration_ms: u32,
    pub chunk_ms: u32,
    /// Deliver chunks in real time instead of as fast as polled
    pub paced: bool,
}

impl Default for ToneParams {
    fn default() -> Self {
        Self {
            freq_hz: 440.0,
            amplitude: 0.25,
            duration_ms: 3000,
            chunk_ms: 100,
            paced: true,
        }
    }
}

pub struct ToneSource {
    params: ToneParams,
    /// Position within the current cycle, in [0, 1)
    phase: f64,
    sample_clock: u64,
    total_samples: u64,
    chunk_size: usize,
    last_delivery: Option<Instant>,
}

impl ToneSource {
    pub fn new(params: ToneParams) -> Self {
        let params = ToneParams {
            freq_hz: params.freq_hz.clamp(40.0, (TARGET_SAMPLE_RATE / 2) as f32),
            amplitude: params.amplitude.clamp(0.0, 1.0),
            duration_ms: params.duration_ms.clamp(10, 3_600_000),
            chunk_ms: params.chunk_ms.clamp(10, 1000),
            paced: params.paced,
        };

        log::info!(
            "Tone source: {}Hz, amplitude={:.2}, {}ms",
            params.freq_hz,
            params.amplitude,
            params.duration_ms
        );

        let total_samples = TARGET_SAMPLE_RATE as u64 * params.duration_ms as u64 / 1000;
        let chunk_size = (TARGET_SAMPLE_RATE * params.chunk_ms / 1000) as usize;

        Self {
            params,
            phase: 0.0,
            sample_clock: 0,
            total_samples,
            chunk_size,
            last_delivery: None,
        }
    }

    fn chunk_duration(&self) -> Duration {
        Duration::from_millis(self.params.chunk_ms as u64)
    }

    fn next_sample(&mut self) -> i16 {
        let value = (TAU * self.phase).sin() * self.params.amplitude as f64;
        let step = self.params.freq_hz as f64 / TARGET_SAMPLE_RATE as f64;
        self.phase = (self.phase + step).fract();
        (value * i16::MAX as f64) as i16
    }
}

impl AudioSource for ToneSource {
    fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.is_finished() {
            return Ok(None);
        }

        if self.params.paced {
            if let Some(last) = self.last_delivery {
                if last.elapsed() < self.chunk_duration() {
                    return Ok(None);
                }
            }
        }

        let remaining = self.total_samples - self.sample_clock;
        let len = remaining.min(self.chunk_size as u64);
        let samples: Vec<i16> = (0..len).map(|_| self.next_sample()).collect();

        self.sample_clock += len;
        self.last_delivery = Some(Instant::now());

        Ok(Some(encode_samples(&samples)))
    }

    fn sample_rate(&self) -> u32 {
        TARGET_SAMPLE_RATE
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn is_finished(&self) -> bool {
        self.sample_clock >= self.total_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::level::{decode_samples, estimate_level, rms_to_level};

    fn unpaced(freq_hz: f32, amplitude: f32, duration_ms: u32) -> ToneSource {
        ToneSource::new(ToneParams {
            freq_hz,
            amplitude,
            duration_ms,
            chunk_ms: 100,
            paced: false,
        })
    }

    fn drain(source: &mut ToneSource) -> Vec<Vec<u8>> {
        let mut chunks = Vec::new();
        while let Some(chunk) = source.next_chunk().unwrap() {
            chunks.push(chunk);
        }
        chunks
    }

    #[test]
    fn test_chunk_layout_and_end() {
        let mut source = unpaced(1000.0, 0.5, 250);
        let chunks = drain(&mut source);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 1600 * 2);
        assert_eq!(chunks[1].len(), 1600 * 2);
        assert_eq!(chunks[2].len(), 800 * 2);
        assert!(source.is_finished());
        assert!(source.next_chunk().unwrap().is_none());
    }

    #[test]
    fn test_level_matches_sine_rms() {
        let mut source = unpaced(1000.0, 0.5, 100);
        let chunk = source.next_chunk().unwrap().unwrap();

        let expected = rms_to_level(0.5 * i16::MAX as f64 / 2f64.sqrt());
        let level = estimate_level(&chunk);
        assert!(level.abs_diff(expected) <= 1, "{} vs {}", level, expected);
    }

    #[test]
    fn test_zero_amplitude_is_silent() {
        let mut source = unpaced(440.0, 0.0, 200);
        for chunk in drain(&mut source) {
            assert_eq!(estimate_level(&chunk), 0);
        }
    }

    #[test]
    fn test_fractional_frequency_stays_continuous() {
        let mut source = unpaced(440.25, 1.0, 2000);
        let samples: Vec<i16> = drain(&mut source)
            .iter()
            .flat_map(|chunk| decode_samples(chunk).collect::<Vec<_>>())
            .collect();
        assert_eq!(samples.len(), 32000);

        // steepest step a 440.25 Hz full-scale sine can take between samples
        let max_step = (TAU * 440.25 / 16000.0 * i16::MAX as f64).ceil() as i32 + 2;
        for (i, pair) in samples.windows(2).enumerate() {
            let step = (pair[1] as i32 - pair[0] as i32).abs();
            assert!(step <= max_step, "jump of {} at sample {}", step, i + 1);
        }
    }

    #[test]
    fn test_parameter_clamping() {
        let source = ToneSource::new(ToneParams {
            freq_hz: 30000.0,
            amplitude: 5.0,
            duration_ms: 1,
            chunk_ms: 5000,
            paced: false,
        });
        assert_eq!(source.params.freq_hz, 8000.0);
        assert_eq!(source.params.amplitude, 1.0);
        assert_eq!(source.params.duration_ms, 10);
        assert_eq!(source.chunk_size(), 16000);
    }

    #[test]
    fn test_paced_source_waits_between_chunks() {
        let mut source = ToneSource::new(ToneParams {
            chunk_ms: 1000,
            duration_ms: 5000,
            paced: true,
            ..ToneParams::default()
        });
        assert!(source.next_chunk().unwrap().is_some());
        assert!(source.next_chunk().unwrap().is_none());
        assert!(!source.is_finished());
    }
}
