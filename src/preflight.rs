/**
 * Preflight checks for microphone access
 *
 * Verifies the audio stack, input device availability and the default input
 * format before a capture session starts. A failing report blocks `listen`.
 */
use cpal::traits::{DeviceTrait, HostTrait};
use serde::{Deserialize, Serialize};

use crate::audio::TARGET_SAMPLE_RATE;

/// Status of an individual preflight check
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Individual preflight check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreflightItem {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub fix_hint: Option<String>,
}

impl PreflightItem {
    fn pass(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Pass,
            message: message.into(),
            fix_hint: None,
        }
    }

    fn with_hint(name: &str, status: CheckStatus, message: impl Into<String>, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
            fix_hint: Some(hint.to_string()),
        }
    }
}

/// Complete preflight report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreflightReport {
    pub items: Vec<PreflightItem>,
    pub overall: CheckStatus,
    pub can_proceed: bool,
}

impl PreflightReport {
    pub fn from_items(items: Vec<PreflightItem>) -> Self {
        let overall = if items.iter().any(|i| i.status == CheckStatus::Fail) {
            CheckStatus::Fail
        } else if items.iter().any(|i| i.status == CheckStatus::Warn) {
            CheckStatus::Warn
        } else {
            CheckStatus::Pass
        };

        Self {
            can_proceed: overall != CheckStatus::Fail,
            overall,
            items,
        }
    }
}

/// Run all preflight checks
pub fn run_preflight() -> PreflightReport {
    log::info!("Starting preflight checks...");

    let items = vec![check_audio_stack(), check_mic_access(), check_input_format()];
    for item in &items {
        log::debug!("Preflight {}: {:?} - {}", item.name, item.status, item.message);
    }

    let report = PreflightReport::from_items(items);
    log::info!("Preflight complete: {:?}", report.overall);
    report
}

/// Check for PipeWire or PulseAudio
#[cfg(target_os = "linux")]
fn check_audio_stack() -> PreflightItem {
    use std::process::Command;

    let succeeds = |program: &str| {
        Command::new(program)
            .arg("info")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    };

    if succeeds("pw-cli") {
        return PreflightItem::pass("audio_stack", "PipeWire detected");
    }
    if succeeds("pactl") {
        return PreflightItem::pass("audio_stack", "PulseAudio detected");
    }

    // Plain ALSA still works, so this is only a warning
    PreflightItem::with_hint(
        "audio_stack",
        CheckStatus::Warn,
        "No audio server detected (PipeWire or PulseAudio)",
        "Install PipeWire or PulseAudio:\n\
         • Arch: sudo pacman -S pipewire pipewire-pulse\n\
         • Ubuntu/Debian: sudo apt install pipewire pipewire-pulse\n\
         • Fedora: sudo dnf install pipewire pipewire-pulseaudio",
    )
}

#[cfg(not(target_os = "linux"))]
fn check_audio_stack() -> PreflightItem {
    PreflightItem::pass("audio_stack", format!("{} audio host", cpal::default_host().id().name()))
}

/// Check microphone access (basic probe)
fn check_mic_access() -> PreflightItem {
    match cpal::default_host().input_devices() {
        Ok(mut devices) => {
            if devices.next().is_some() {
                PreflightItem::pass("mic_access", "Microphone devices found")
            } else {
                PreflightItem::with_hint(
                    "mic_access",
                    CheckStatus::Fail,
                    "No microphone devices detected",
                    "Connect a microphone or check audio settings",
                )
            }
        }
        Err(e) => PreflightItem::with_hint(
            "mic_access",
            CheckStatus::Fail,
            format!("Cannot access audio devices: {}", e),
            "Check permissions and audio configuration:\n\
             • Ensure user is in 'audio' group: sudo usermod -aG audio $USER\n\
             • Verify audio server is running (PipeWire/PulseAudio)",
        ),
    }
}

/// Check the default input config; other rates are resampled
fn check_input_format() -> PreflightItem {
    let Some(device) = cpal::default_host().default_input_device() else {
        return PreflightItem::with_hint(
            "input_format",
            CheckStatus::Warn,
            "No default input device",
            "Select a device with --device or in config.toml",
        );
    };

    match device.default_input_config() {
        Ok(config) if config.sample_rate().0 == TARGET_SAMPLE_RATE => PreflightItem::pass(
            "input_format",
            format!("{} Hz, {} channel(s)", TARGET_SAMPLE_RATE, config.channels()),
        ),
        Ok(config) => PreflightItem::pass(
            "input_format",
            format!(
                "{} Hz, {} channel(s) (resampled to {} Hz mono)",
                config.sample_rate().0,
                config.channels(),
                TARGET_SAMPLE_RATE
            ),
        ),
        Err(e) => PreflightItem::with_hint(
            "input_format",
            CheckStatus::Fail,
            format!("Default input config unavailable: {}", e),
            "The device may be in use by another application",
        ),
    }
}
