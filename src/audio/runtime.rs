//! Metering session lifecycle
//!
//! A [`MeterRuntime`] owns one capture session: a dedicated worker thread
//! opens the source, estimates the level of every chunk in arrival order and
//! pushes the results to whoever owns the [`MeterState`](super::meter::MeterState).
//! Stopping releases the device; no per-chunk state outlives the worker.

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;

use super::level::{estimate_level, LoudnessSample};
use super::SourceSpec;

/// How long the worker naps when a source has nothing ready: a tenth of a
/// chunk, never below 1 ms
pub fn idle_backoff(chunk_size: usize, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::from_millis(1);
    }
    let chunk_us = chunk_size as u64 * 1_000_000 / sample_rate as u64;
    Duration::from_micros(chunk_us / 10).max(Duration::from_millis(1))
}

/// Signal type for stopping the worker
#[derive(Debug, Clone, Copy)]
pub struct StopSignal;

/// Events delivered to the meter owner
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Source opened and delivering
    Started,
    /// Level of one chunk
    Level(LoudnessSample),
    /// Worker exited. `error` is set when it stopped because of a failure.
    Ended { error: Option<String> },
}

/// Handle to a running capture worker
pub struct MeterRuntime {
    stop_tx: Sender<StopSignal>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl MeterRuntime {
    /// Spawn a worker that streams levels from `source` into `events`.
    pub fn start(source: SourceSpec, events: mpsc::UnboundedSender<SessionEvent>) -> Result<Self> {
        log::info!("Starting meter runtime...");

        let (stop_tx, stop_rx) = bounded::<StopSignal>(1);

        // std::thread rather than tokio::spawn: cpal streams are not Send
        let thread_handle = thread::Builder::new()
            .name("meter-worker".to_string())
            .spawn(move || {
                let result = run_meter_worker(&source, &events, &stop_rx);
                let error = match result {
                    Ok(()) => None,
                    Err(e) => {
                        log::error!("Meter worker error: {:#}", e);
                        Some(format!("{:#}", e))
                    }
                };
                let _ = events.send(SessionEvent::Ended { error });
            })
            .map_err(|e| anyhow!("Failed to spawn meter worker: {}", e))?;

        log::info!("✓ Meter runtime started");

        Ok(Self {
            stop_tx,
            thread_handle: Some(thread_handle),
        })
    }

    /// Stop the worker and wait for it to release the source
    pub fn stop(mut self) {
        log::info!("Stopping meter runtime...");
        let _ = self.stop_tx.try_send(StopSignal);
        self.join();
        log::info!("✓ Meter runtime stopped");
    }

    fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                log::error!("Meter worker panicked");
            }
        }
    }
}

impl Drop for MeterRuntime {
    fn drop(&mut self) {
        let _ = self.stop_tx.try_send(StopSignal);
        self.join();
    }
}

/// Worker loop: poll source, estimate, forward
fn run_meter_worker(
    source: &SourceSpec,
    events: &mpsc::UnboundedSender<SessionEvent>,
    stop_rx: &Receiver<StopSignal>,
) -> Result<()> {
    // Opened here so the (non-Send) stream lives on this thread
    let mut source = source.open()?;
    log::info!(
        "Meter worker: source ready @{}Hz, {} samples/chunk",
        source.sample_rate(),
        source.chunk_size()
    );

    if events.send(SessionEvent::Started).is_err() {
        return Ok(());
    }

    let backoff = idle_backoff(source.chunk_size(), source.sample_rate());
    let mut chunk_count = 0u64;

    loop {
        if stop_rx.try_recv().is_ok() {
            log::debug!("Meter worker: stop requested");
            break;
        }

        match source.next_chunk()? {
            Some(chunk) => {
                chunk_count += 1;
                let level = estimate_level(&chunk);

                if events.send(SessionEvent::Level(level)).is_err() {
                    log::debug!("Meter worker: receiver dropped");
                    break;
                }

                if chunk_count % 100 == 0 {
                    log::trace!("Processed {} chunks", chunk_count);
                }
            }
            None if source.is_finished() => {
                log::info!("Meter worker: source finished after {} chunks", chunk_count);
                break;
            }
            None => thread::sleep(backoff),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::level::rms_to_level;
    use crate::audio::tone::ToneParams;

    fn collect_events(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        loop {
            match rx.blocking_recv() {
                Some(event @ SessionEvent::Ended { .. }) => {
                    events.push(event);
                    break;
                }
                Some(event) => events.push(event),
                None => break,
            }
        }
        events
    }

    #[test]
    fn test_idle_backoff_scales_with_chunk() {
        // 100 ms chunks at 16 kHz
        assert_eq!(idle_backoff(1600, 16000), Duration::from_millis(10));
        assert_eq!(idle_backoff(16000, 16000), Duration::from_millis(100));
        assert_eq!(idle_backoff(16, 16000), Duration::from_millis(1));
        assert_eq!(idle_backoff(1600, 0), Duration::from_millis(1));
    }

    #[test]
    fn test_tone_session_streams_levels_then_ends() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let source = SourceSpec::Tone(ToneParams {
            freq_hz: 1000.0,
            amplitude: 0.5,
            duration_ms: 500,
            chunk_ms: 100,
            paced: false,
        });

        let runtime = MeterRuntime::start(source, tx).unwrap();
        let events = collect_events(&mut rx);
        runtime.stop();

        assert_eq!(events.first(), Some(&SessionEvent::Started));
        assert_eq!(events.last(), Some(&SessionEvent::Ended { error: None }));

        let expected = rms_to_level(0.5 * i16::MAX as f64 / 2f64.sqrt());
        let levels: Vec<LoudnessSample> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Level(l) => Some(*l),
                _ => None,
            })
            .collect();
        assert_eq!(levels.len(), 5);
        assert!(levels.iter().all(|l| l.abs_diff(expected) <= 1));
    }

    #[test]
    fn test_open_failure_reported_as_ended() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let source = SourceSpec::Wav {
            path: "/nonexistent/recording.wav".into(),
            chunk_ms: 100,
            paced: false,
        };

        let runtime = MeterRuntime::start(source, tx).unwrap();
        let events = collect_events(&mut rx);
        runtime.stop();

        assert_eq!(events.len(), 1);
        match &events[0] {
            SessionEvent::Ended { error: Some(msg) } => {
                assert!(msg.contains("Failed to open WAV file"))
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_stop_interrupts_endless_session() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let source = SourceSpec::Tone(ToneParams {
            duration_ms: 3_600_000,
            chunk_ms: 100,
            paced: true,
            ..ToneParams::default()
        });

        let runtime = MeterRuntime::start(source, tx).unwrap();
        assert_eq!(rx.blocking_recv(), Some(SessionEvent::Started));
        runtime.stop();

        let events = collect_events(&mut rx);
        assert_eq!(events.last(), Some(&SessionEvent::Ended { error: None }));
    }
}
