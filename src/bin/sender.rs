//! Stream Sender Application
//!
//! Lists capture devices, or discovers receivers on the LAN and streams the
//! selected capture source to each one.

use anyhow::Result;
use clap::{CommandFactory, Parser};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use streamcast::{
    config::{log_filter, AppConfig, LogVerbosity, Overrides},
    devices::list_devices,
    discovery::MdnsDiscovery,
    streamer,
    transcode::FfmpegLauncher,
    ui::WebServer,
};

#[derive(Parser, Debug)]
#[command(name = "sender", about = "Stream a capture device to receivers discovered on the LAN")]
struct Cli {
    /// Lists available input devices
    #[arg(long = "dev")]
    list_devices: bool,

    /// Audio device to stream
    #[arg(short = 'a')]
    audio: Option<String>,

    /// Video device to use
    #[arg(short = 'v')]
    video: Option<String>,

    /// Network interface on which to listen for clients [default: Wi-Fi]
    #[arg(long)]
    iface: Option<String>,

    /// Log level for discovery ('debug', 'error', 'warn', or 'silent') [default: silent]
    #[arg(short = 'd')]
    log_level: Option<LogVerbosity>,

    /// Config file (defaults to the per-user config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// ffmpeg executable
    #[arg(long)]
    ffmpeg: Option<String>,

    /// Serve the status API on this port
    #[arg(long)]
    status_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply(Overrides {
        audio_device: cli.audio.clone(),
        video_device: cli.video.clone(),
        interface: cli.iface.clone(),
        log_verbosity: cli.log_level,
        ffmpeg: cli.ffmpeg.clone(),
        status_port: cli.status_port,
    });

    // Initialize logging
    let base = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(log_filter(
            &base,
            config.discovery.log_verbosity,
        )))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.list_devices {
        let devices = list_devices(&config.stream.ffmpeg, config.stream.capture_format()).await?;
        print!("{}", devices);
        return Ok(());
    }

    let source = match config.source.resolve() {
        Ok(source) => source,
        Err(e) => {
            Cli::command()
                .error(
                    clap::error::ErrorKind::MissingRequiredArgument,
                    format!(
                        "{}: specify an audio device or a video device to stream with the -a or -v flags",
                        e
                    ),
                )
                .exit();
        }
    };

    tracing::info!("Starting stream sender ({})", source.mode());

    let discovery = match MdnsDiscovery::new(&config.discovery) {
        Ok(discovery) => Arc::new(discovery),
        Err(e) => {
            tracing::error!("{}", e);
            return Err(e.into());
        }
    };

    let handle = streamer::spawn(&config, source.clone(), discovery, Arc::new(FfmpegLauncher::new()));

    if config.status.enabled {
        let web_server = WebServer::new(config.status.clone(), handle.registry().clone(), source.mode());
        let _web_handle = web_server.start_background();
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    handle.shutdown().await;

    Ok(())
}
