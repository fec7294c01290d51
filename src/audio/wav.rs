//! WAV file replay
//!
//! Streams a recording through the meter as if it came from the microphone.
//! The file must already match the capture contract (16 kHz, mono, 16-bit
//! integer); no conversion is attempted.

use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::{Duration, Instant};

use super::level::encode_samples;
use super::{AudioSource, TARGET_CHANNELS, TARGET_SAMPLE_RATE};

pub struct WavSource {
    samples: hound::WavIntoSamples<BufReader<File>, i16>,
    chunk_ms: u32,
    chunk_size: usize,
    paced: bool,
    finished: bool,
    last_delivery: Option<Instant>,
}

impl WavSource {
    /// Read the header and reject anything that is not 16 kHz mono 16-bit
    pub fn probe(path: &Path) -> Result<hound::WavSpec> {
        let reader = open_reader(path)?;
        let spec = reader.spec();
        check_format(path, &spec)?;
        Ok(spec)
    }

    pub fn open(path: &Path, chunk_ms: u32, paced: bool) -> Result<Self> {
        let reader = open_reader(path)?;
        check_format(path, &reader.spec())?;

        log::info!(
            "Replaying {} ({} samples, chunk={}ms, paced={})",
            path.display(),
            reader.duration(),
            chunk_ms,
            paced
        );

        Ok(Self {
            samples: reader.into_samples::<i16>(),
            chunk_ms,
            chunk_size: (TARGET_SAMPLE_RATE * chunk_ms / 1000) as usize,
            paced,
            finished: false,
            last_delivery: None,
        })
    }
}

fn open_reader(path: &Path) -> Result<hound::WavReader<BufReader<File>>> {
    hound::WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file: {}", path.display()))
}

fn check_format(path: &Path, spec: &hound::WavSpec) -> Result<()> {
    if spec.channels as usize != TARGET_CHANNELS {
        bail!(
            "{}: expected mono audio, got {} channels",
            path.display(),
            spec.channels
        );
    }
    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        bail!(
            "{}: expected 16-bit integer samples, got {}-bit {:?}",
            path.display(),
            spec.bits_per_sample,
            spec.sample_format
        );
    }
    if spec.sample_rate != TARGET_SAMPLE_RATE {
        bail!(
            "{}: expected {} Hz, got {} Hz",
            path.display(),
            TARGET_SAMPLE_RATE,
            spec.sample_rate
        );
    }
    Ok(())
}

impl AudioSource for WavSource {
    fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.finished {
            return Ok(None);
        }

        if self.paced {
            if let Some(last) = self.last_delivery {
                if last.elapsed() < Duration::from_millis(self.chunk_ms as u64) {
                    return Ok(None);
                }
            }
        }

        let mut chunk = Vec::with_capacity(self.chunk_size);
        for sample in self.samples.by_ref().take(self.chunk_size) {
            chunk.push(sample.context("Failed to decode WAV sample")?);
        }

        if chunk.len() < self.chunk_size {
            self.finished = true;
        }
        if chunk.is_empty() {
            return Ok(None);
        }

        self.last_delivery = Some(Instant::now());
        Ok(Some(encode_samples(&chunk)))
    }

    fn sample_rate(&self) -> u32 {
        TARGET_SAMPLE_RATE
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}
