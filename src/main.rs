mod audio;
mod pipeline;
mod settings;
mod spectral;
mod transport;
mod viz;

use crate::audio::{find_device, list_input_devices, CaptureEngine, RecordingSession, WavRecorder};
use crate::pipeline::{run_session, SessionOutcome};
use crate::settings::{Scaling, Settings};
use crate::spectral::SpectralEngine;
use crate::transport::{block_channel, session_capacity};
use crate::viz::{NullSink, SpectrogramSink, TerminalSink};
use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use jiff::tz::TimeZone;
use jiff::Zoned;
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "sonoscope")]
#[command(about = "Live audio spectrogram viewer and session recorder for the terminal")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture, display, and record a session
    Run(RunArgs),

    /// List eligible audio input devices
    Devices {
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: ListFormat,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Input device by id or exact name (default: system default)
    #[arg(long)]
    device: Option<String>,

    /// Sample rate in Hz
    #[arg(long, default_value = "48000")]
    sample_rate: u32,

    /// Samples per block; must divide the sample rate evenly
    #[arg(long, default_value = "1200")]
    block_size: usize,

    /// Session name, part of the session folder name
    #[arg(long, default_value = "experiment")]
    name: String,

    /// Extra tag appended to the session folder name
    #[arg(long)]
    tag: Option<String>,

    /// Expected spectral peak; the linear display ceiling
    #[arg(long, default_value = "10.0")]
    max_amplitude: f32,

    /// Lower edge of the displayed band in Hz
    #[arg(long, default_value = "0.0")]
    min_freq: f64,

    /// Upper edge of the displayed band in Hz
    #[arg(long, default_value = "24000.0")]
    max_freq: f64,

    /// Amplitude scaling for the display
    #[arg(long, value_enum, default_value = "linear")]
    scaling: Scaling,

    /// Stop after this many seconds (default: run until cancelled)
    #[arg(long)]
    duration: Option<u64>,

    /// Gain applied to samples before they are written to the WAV file
    #[arg(long)]
    gain: Option<f32>,

    /// Width of the sliding display window in seconds
    #[arg(long, default_value = "10")]
    window: u32,

    /// Directory session folders are created under
    #[arg(long, default_value = "sessions")]
    output_root: PathBuf,

    /// Run without the terminal display; requires --duration
    #[arg(long)]
    headless: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum ListFormat {
    Text,
    Json,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sonoscope=info,warn"));

    // Logs go to stderr; stdout belongs to the spectrogram display.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Devices { format } => devices(format),
    }
}

fn run(args: RunArgs) -> Result<()> {
    let settings = Settings {
        device: args.device,
        sample_rate: args.sample_rate,
        block_size: args.block_size,
        name: args.name,
        tag: args.tag,
        max_amplitude: args.max_amplitude,
        min_freq: args.min_freq,
        max_freq: args.max_freq,
        scaling: args.scaling,
        duration_secs: args.duration,
        gain: args.gain,
        window_secs: args.window,
        output_root: args.output_root,
    };
    settings.validate()?;
    if args.headless && settings.duration_secs.is_none() {
        bail!("--headless needs --duration, otherwise the session can never end");
    }

    let (device, handle) = find_device(settings.device.as_deref())?;

    let started = Zoned::now();
    let session_dir = settings.output_root.join(settings.session_dir_name(&started));
    fs::create_dir_all(&session_dir)?;
    settings.write_manifest(&session_dir, &handle.name, &started)?;

    println!("Selected device: {}", handle.name);
    println!("Sample rate: {} Hz", settings.sample_rate);
    println!("Block size: {} samples", settings.block_size);
    println!("Session folder: {}", session_dir.display());
    println!(
        "Frequency band: {:.0}-{:.0} Hz",
        settings.min_freq, settings.max_freq
    );
    println!("Amplitude scaling: {}", settings.scaling);
    println!("Max amplitude: {}", settings.max_amplitude);
    match settings.duration_secs {
        Some(secs) => println!("Session length: {} seconds", secs),
        None => println!("Session length: until cancelled"),
    }

    let capture = CaptureEngine::open(device, &settings)?;
    let (tx, rx) = block_channel(session_capacity(settings.sample_rate, settings.block_size));
    let wav_path = session_dir.join("output.wav");
    let recorder = WavRecorder::create(&RecordingSession {
        sample_rate: settings.sample_rate,
        output_path: wav_path.clone(),
        gain: settings.gain,
    })?;
    let engine = SpectralEngine::new(&settings, TimeZone::system());
    let capture = capture.start(tx)?;

    let mut sink: Box<dyn SpectrogramSink> = if args.headless {
        Box::new(NullSink::new(Some(session_dir.clone())))
    } else {
        Box::new(TerminalSink::new(settings.name.clone(), session_dir.clone())?)
    };

    let result = run_session(&rx, engine, recorder, sink.as_mut());
    // Restore the terminal before anything else writes to stdout, then
    // stop capture while the receiver is still alive.
    drop(sink);
    let dropped = capture.stop();
    let report = result?;

    println!("Session saved to {}", session_dir.display());
    println!(
        "Consumed {} blocks, dropped {} at capture",
        report.blocks_consumed, dropped
    );
    println!(
        "Recorded {:.2} seconds of audio to {}",
        report.recorded_seconds,
        wav_path.display()
    );
    if report.snapshots_exported > 0 {
        println!("Exported {} snapshots", report.snapshots_exported);
    }
    println!(
        "Total number of seconds displayed: {:.2} seconds",
        report.displayed_seconds
    );

    if report.outcome == SessionOutcome::TransportLost {
        bail!("capture stopped before the session ended");
    }
    Ok(())
}

fn devices(format: ListFormat) -> Result<()> {
    let devices = list_input_devices()?;
    match format {
        ListFormat::Json => println!("{}", serde_json::to_string_pretty(&devices)?),
        ListFormat::Text => {
            if devices.is_empty() {
                println!("No eligible input devices found");
                return Ok(());
            }
            println!("Available Input Devices:");
            println!("{:<4} {:<40} {:<9} Default", "ID", "Name", "Channels");
            println!("{}", "-".repeat(64));
            for device in devices {
                println!(
                    "{:<4} {:<40} {:<9} {}",
                    device.id,
                    device.clipped_name(40),
                    device.max_input_channels,
                    if device.is_default { "YES" } else { "NO" }
                );
            }
        }
    }
    Ok(())
}
