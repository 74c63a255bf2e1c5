use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use lynx_stt::{Lynx, LynxBuilder};
use tracing_subscriber::EnvFilter;

mod file;
mod mic;

#[derive(Parser)]
#[command(name = "lynx-demo")]
#[command(about = "Lynx speech-to-text demos")]
struct Cli {
    /// Access key issued with the engine license
    #[arg(long, env = "LYNX_ACCESS_KEY", global = true)]
    access_key: Option<String>,

    /// Path to the acoustic model file
    #[arg(long, global = true)]
    model_path: Option<PathBuf>,

    /// Path to the engine's shared library
    #[arg(long, global = true)]
    library_path: Option<PathBuf>,

    /// Endpoint silence duration in seconds; 0 disables endpoint detection
    #[arg(long, default_value_t = 1.0, global = true)]
    endpoint_duration: f32,

    /// Insert punctuation into transcripts
    #[arg(long, global = true)]
    punctuation: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transcribe a WAV file (mono, 16-bit, engine sample rate)
    File {
        /// Input audio file
        #[arg(long)]
        input: PathBuf,
    },
    /// Transcribe live microphone audio until Ctrl-C
    Mic {
        /// Input device name; default device when omitted
        #[arg(long)]
        device: Option<String>,
    },
    /// List available input devices
    Devices,
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Commands::File { input } => {
            let lynx = init_session(&cli)?;
            file::run(&lynx, input)
        }
        Commands::Mic { device } => {
            let lynx = init_session(&cli)?;
            mic::run(&lynx, device.as_deref())
        }
        Commands::Devices => mic::list_devices(),
    }
}

fn init_session(cli: &Cli) -> anyhow::Result<Lynx> {
    let access_key = cli
        .access_key
        .as_deref()
        .context("an access key is required; pass --access-key or set LYNX_ACCESS_KEY")?;

    let mut builder = LynxBuilder::new()
        .access_key(access_key)
        .endpoint_duration_sec(cli.endpoint_duration)
        .enable_automatic_punctuation(cli.punctuation);
    if let Some(model_path) = &cli.model_path {
        builder = builder.model_path(model_path);
    }
    if let Some(library_path) = &cli.library_path {
        builder = builder.library_path(library_path);
    }

    let lynx = builder.init().context("failed to initialize the engine")?;
    tracing::info!(version = lynx.version(), "engine ready");
    Ok(lynx)
}
