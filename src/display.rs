//! Meter presentation on stdout

use anyhow::Result;
use std::io::{self, Write};

use crate::audio::meter::MeterState;
use crate::config::{DisplayConfig, OutputFormat};

/// Renders meter snapshots after each ingest
pub trait Presenter {
    fn render(&mut self, meter: &MeterState) -> Result<()>;

    /// Out-of-band status line (session started, stopped, errors)
    fn notice(&mut self, message: &str) -> Result<()>;

    /// Called once before exit
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Build the presenter selected in config, writing to stdout
pub fn stdout_presenter(config: &DisplayConfig) -> Box<dyn Presenter> {
    match config.format {
        OutputFormat::Bar => Box::new(TerminalPresenter::new(io::stdout(), config.bar_width)),
        OutputFormat::Json => Box::new(JsonPresenter::new(io::stdout())),
    }
}

/// Single refreshing line: `" 80 dB  Max:  80 dB  [█████     ]"`
pub struct TerminalPresenter<W: Write> {
    out: W,
    bar_width: usize,
    line_open: bool,
}

impl<W: Write> TerminalPresenter<W> {
    pub fn new(out: W, bar_width: u16) -> Self {
        Self {
            out,
            bar_width: bar_width as usize,
            line_open: false,
        }
    }

    fn close_line(&mut self) -> io::Result<()> {
        if self.line_open {
            writeln!(self.out)?;
            self.line_open = false;
        }
        Ok(())
    }
}

/// Bar cells filled for a ratio in `[0, 1]`
pub fn filled_cells(fill_ratio: f64, width: usize) -> usize {
    ((fill_ratio * width as f64).round() as usize).min(width)
}

impl<W: Write> Presenter for TerminalPresenter<W> {
    fn render(&mut self, meter: &MeterState) -> Result<()> {
        let filled = filled_cells(meter.fill_ratio(), self.bar_width);
        write!(
            self.out,
            "\r{:>3} dB  Max: {:>3} dB  [{}{}]",
            meter.current_level(),
            meter.max_level(),
            "█".repeat(filled),
            " ".repeat(self.bar_width - filled)
        )?;
        self.out.flush()?;
        self.line_open = true;
        Ok(())
    }

    fn notice(&mut self, message: &str) -> Result<()> {
        self.close_line()?;
        writeln!(self.out, "{}", message)?;
        self.out.flush()?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.close_line()?;
        self.out.flush()?;
        Ok(())
    }
}

/// JSON lines, one meter snapshot per render. Notices go to the log.
pub struct JsonPresenter<W: Write> {
    out: W,
}

impl<W: Write> JsonPresenter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> Presenter for JsonPresenter<W> {
    fn render(&mut self, meter: &MeterState) -> Result<()> {
        serde_json::to_writer(&mut self.out, meter)?;
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(())
    }

    fn notice(&mut self, message: &str) -> Result<()> {
        log::info!("{}", message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meter_at(levels: &[u32]) -> MeterState {
        let mut meter = MeterState::new();
        for &l in levels {
            meter.ingest(l);
        }
        meter
    }

    #[test]
    fn test_filled_cells() {
        assert_eq!(filled_cells(0.0, 40), 0);
        assert_eq!(filled_cells(0.5, 40), 20);
        assert_eq!(filled_cells(80.0 / 120.0, 30), 20);
        assert_eq!(filled_cells(1.0, 40), 40);
    }

    #[test]
    fn test_terminal_line() {
        let mut out = Vec::new();
        {
            let mut presenter = TerminalPresenter::new(&mut out, 12);
            presenter.render(&meter_at(&[90, 60])).unwrap();
            presenter.finish().unwrap();
        }
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "\r 60 dB  Max:  90 dB  [██████      ]\n");
    }

    #[test]
    fn test_terminal_notice_breaks_line() {
        let mut out = Vec::new();
        {
            let mut presenter = TerminalPresenter::new(&mut out, 10);
            presenter.render(&meter_at(&[0])).unwrap();
            presenter.notice("Stopped").unwrap();
            presenter.finish().unwrap();
        }
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "\r  0 dB  Max:   0 dB  [          ]\nStopped\n");
    }

    #[test]
    fn test_json_lines() {
        let mut out = Vec::new();
        {
            let mut presenter = JsonPresenter::new(&mut out);
            presenter.render(&meter_at(&[30])).unwrap();
            presenter.render(&meter_at(&[30, 120])).unwrap();
        }
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["current_level"], 30);
        assert_eq!(lines[0]["fill_ratio"], 0.25);
        assert_eq!(lines[1]["max_level"], 120);
        assert_eq!(lines[1]["fill_ratio"], 1.0);
    }
}
