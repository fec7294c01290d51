use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

use sound_meter_lib::audio::tone::ToneParams;
use sound_meter_lib::audio::{self, SourceSpec};
use sound_meter_lib::config::{AppConfig, OutputFormat};
use sound_meter_lib::controller::{Command, Flow, MeterController};
use sound_meter_lib::display::stdout_presenter;
use sound_meter_lib::paths::AppPaths;
use sound_meter_lib::preflight::{run_preflight, CheckStatus, PreflightReport};
use sound_meter_lib::validation;

#[derive(Parser, Debug)]
#[command(name = "sound-meter", version, about = "Live microphone loudness meter")]
struct Cli {
    /// Config file (defaults to the OS config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit JSON lines instead of the level bar
    #[arg(long, global = true)]
    json: bool,

    /// Meter width in terminal cells
    #[arg(long, global = true)]
    bar_width: Option<u16>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Meter the microphone (default)
    Listen {
        /// Input device name (see `devices`)
        #[arg(long)]
        device: Option<String>,
    },
    /// Replay a 16 kHz mono 16-bit WAV file through the meter
    File {
        path: PathBuf,
        #[command(flatten)]
        pacing: Pacing,
    },
    /// Meter a synthetic sine tone
    Tone {
        #[arg(long, default_value_t = 440.0)]
        freq_hz: f32,
        /// Peak amplitude, fraction of full scale
        #[arg(long, default_value_t = 0.25)]
        amplitude: f32,
        #[arg(long, default_value_t = 3000)]
        duration_ms: u32,
        #[command(flatten)]
        pacing: Pacing,
    },
    /// List input devices
    Devices,
    /// Check microphone access
    Preflight,
}

#[derive(Args, Debug)]
struct Pacing {
    /// Process chunks as fast as possible instead of in real time
    #[arg(long)]
    no_pace: bool,
}

#[tokio::main]
async fn main() {
    // Logs go to stderr; stdout carries the meter
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;

    if cli.json {
        config.display.format = OutputFormat::Json;
    }
    if let Some(width) = cli.bar_width {
        config.display.bar_width = validation::validate_bar_width(width)?;
    }

    let source = match cli.command.unwrap_or(Commands::Listen { device: None }) {
        Commands::Devices => return print_devices(config.display.format),
        Commands::Preflight => {
            print_preflight(&run_preflight(), config.display.format)?;
            return Ok(());
        }
        Commands::Listen { device } => {
            if let Some(name) = device {
                config.audio.device_name = Some(validation::validate_device_name(&name)?);
                config.audio.stable_input_id = None;
            }

            let report = run_preflight();
            if !report.can_proceed {
                print_preflight(&report, config.display.format)?;
                anyhow::bail!("Microphone is not accessible");
            }
            SourceSpec::Microphone(config.audio.clone())
        }
        Commands::File { path, pacing } => {
            validation::validate_wav_path(&path)?;
            SourceSpec::Wav {
                path,
                chunk_ms: config.audio.chunk_ms,
                paced: !pacing.no_pace,
            }
        }
        Commands::Tone {
            freq_hz,
            amplitude,
            duration_ms,
            pacing,
        } => SourceSpec::Tone(ToneParams {
            freq_hz: validation::validate_frequency_hz(freq_hz)?,
            amplitude: validation::validate_amplitude(amplitude)?,
            duration_ms: validation::validate_duration_ms(duration_ms)?,
            chunk_ms: config.audio.chunk_ms,
            paced: !pacing.no_pace,
        }),
    };

    let presenter = stdout_presenter(&config.display);
    let mut controller =
        MeterController::new(source, presenter, config.display.render_interval_ms);

    // Bad WAV headers fail here, before anything is drawn
    controller.start()?;
    let result = drive(&mut controller).await;
    controller.shutdown()?;

    if result.is_ok() {
        let meter = controller.meter();
        log::info!(
            "Session over: current={} dB, max={} dB",
            meter.current_level(),
            meter.max_level()
        );
    }
    result
}

/// Event loop: worker levels, stdin commands and Ctrl-C
async fn drive(controller: &mut MeterController) -> Result<()> {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted");
                return Ok(());
            }
            event = controller.next_event() => {
                if controller.handle_event(event)? == Flow::Exit {
                    return Ok(());
                }
            }
            line = stdin.next_line(), if stdin_open => {
                match line.context("Failed to read stdin")? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => match Command::parse(&line) {
                        Some(command) => {
                            if controller.handle_command(command)? == Flow::Exit {
                                return Ok(());
                            }
                        }
                        None => log::warn!("Unknown command: {}", line.trim()),
                    },
                    None => {
                        log::debug!("stdin closed; commands disabled");
                        stdin_open = false;
                    }
                }
            }
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load_or_create(path),
        None => {
            let paths = AppPaths::new()?;
            paths.ensure_directories()?;
            AppConfig::load_or_create(&paths.config_file())
        }
    }
}

fn print_devices(format: OutputFormat) -> Result<()> {
    let devices = audio::list_input_devices()?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No input devices found");
    }
    for device in &devices {
        println!(
            "{} {} [{}] {}ch {}-{} Hz",
            if device.is_default { "*" } else { " " },
            device.name,
            device.host,
            device.max_channels,
            device.sample_rates.first().copied().unwrap_or_default(),
            device.sample_rates.last().copied().unwrap_or_default(),
        );
    }
    Ok(())
}

fn print_preflight(report: &PreflightReport, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    for item in &report.items {
        let mark = match item.status {
            CheckStatus::Pass => "✓",
            CheckStatus::Warn => "!",
            CheckStatus::Fail => "✗",
        };
        println!("{} {}: {}", mark, item.name, item.message);
        if let Some(hint) = &item.fix_hint {
            for line in hint.lines() {
                println!("    {}", line);
            }
        }
    }
    println!("Overall: {:?}", report.overall);
    Ok(())
}
