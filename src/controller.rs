//! Session control and the single owner of [`MeterState`]
//!
//! The controller plays the part of the Start/Stop buttons: `start` resets the
//! peak and spawns a [`MeterRuntime`], `stop` tears it down. Every level the
//! worker produces is ingested here, in order, and handed to the presenter.

use anyhow::{anyhow, Result};
use std::future::pending;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::audio::friendly_audio_error;
use crate::audio::meter::MeterState;
use crate::audio::runtime::{MeterRuntime, SessionEvent};
use crate::audio::SourceSpec;
use crate::display::Presenter;

/// Interactive commands read from stdin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Reset,
    Quit,
}

impl Command {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "start" | "s" => Some(Command::Start),
            "stop" | "x" => Some(Command::Stop),
            "reset" | "r" => Some(Command::Reset),
            "quit" | "q" | "exit" => Some(Command::Quit),
            _ => None,
        }
    }
}

/// What the driving loop should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

pub struct MeterController {
    meter: MeterState,
    source: SourceSpec,
    presenter: Box<dyn Presenter>,
    runtime: Option<MeterRuntime>,
    events_rx: Option<mpsc::UnboundedReceiver<SessionEvent>>,
    render_interval: Duration,
    last_render: Option<Instant>,
}

impl MeterController {
    pub fn new(source: SourceSpec, presenter: Box<dyn Presenter>, render_interval_ms: u32) -> Self {
        Self {
            meter: MeterState::new(),
            source,
            presenter,
            runtime: None,
            events_rx: None,
            render_interval: Duration::from_millis(render_interval_ms as u64),
            last_render: None,
        }
    }

    pub fn meter(&self) -> &MeterState {
        &self.meter
    }

    pub fn is_running(&self) -> bool {
        self.runtime.is_some()
    }

    /// Begin a session. The peak is reset; the current level is kept.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            self.presenter.notice("Already running")?;
            return Ok(());
        }

        self.source.check()?;
        self.meter.reset();

        // Fresh channel per session so nothing from a stopped worker leaks in
        let (tx, rx) = mpsc::unbounded_channel();
        self.runtime = Some(MeterRuntime::start(self.source.clone(), tx)?);
        self.events_rx = Some(rx);
        Ok(())
    }

    /// End the session and release the device
    pub fn stop(&mut self) -> Result<()> {
        let Some(runtime) = self.runtime.take() else {
            self.presenter.notice("Not running")?;
            return Ok(());
        };
        runtime.stop();
        self.events_rx = None;

        self.render_now()?;
        self.presenter
            .notice(&format!("Stopped. Max: {} dB", self.meter.max_level()))
    }

    pub fn reset(&mut self) -> Result<()> {
        self.meter.reset();
        self.render_now()
    }

    /// Apply one stdin command
    pub fn handle_command(&mut self, command: Command) -> Result<Flow> {
        match command {
            Command::Start => self.start()?,
            Command::Stop => self.stop()?,
            Command::Reset => self.reset()?,
            Command::Quit => return Ok(Flow::Exit),
        }
        Ok(Flow::Continue)
    }

    /// Next worker event; pends forever while no session is running.
    /// A worker that vanished without saying goodbye is reported as a failed end.
    pub async fn next_event(&mut self) -> SessionEvent {
        let Some(rx) = self.events_rx.as_mut() else {
            return pending().await;
        };
        match rx.recv().await {
            Some(event) => event,
            None => SessionEvent::Ended {
                error: Some("meter worker exited unexpectedly".to_string()),
            },
        }
    }

    pub fn handle_event(&mut self, event: SessionEvent) -> Result<Flow> {
        match event {
            SessionEvent::Started => {
                self.presenter
                    .notice("Listening... (commands: stop, start, reset, quit)")?;
            }
            SessionEvent::Level(level) => {
                self.meter.ingest(level);
                let due = self
                    .last_render
                    .map(|t| t.elapsed() >= self.render_interval)
                    .unwrap_or(true);
                if due {
                    self.render_now()?;
                }
            }
            SessionEvent::Ended { error } => {
                if let Some(runtime) = self.runtime.take() {
                    runtime.stop();
                }
                self.events_rx = None;
                self.render_now()?;

                if self.source.is_finite() {
                    return match error {
                        Some(message) => Err(anyhow!(message)),
                        None => Ok(Flow::Exit),
                    };
                }

                // Live capture stays up so the user can start again
                if let Some(message) = error {
                    let friendly = friendly_audio_error(&anyhow!(message));
                    log::debug!("Session failed ({}): {}", friendly.code, friendly.technical);
                    self.presenter.notice(&friendly.message)?;
                }
            }
        }
        Ok(Flow::Continue)
    }

    /// Stop any session and flush the presenter
    pub fn shutdown(&mut self) -> Result<()> {
        if let Some(runtime) = self.runtime.take() {
            runtime.stop();
        }
        self.events_rx = None;
        self.presenter.finish()
    }

    fn render_now(&mut self) -> Result<()> {
        self.presenter.render(&self.meter)?;
        self.last_render = Some(Instant::now());
        Ok(())
    }
}
