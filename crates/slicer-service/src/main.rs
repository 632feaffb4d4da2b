use clap::Parser;
use slicer_config::SlicerConfig;
use slicer_service::start_service;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Print Slicing Service
#[derive(Parser)]
#[command(name = "slicer-service")]
#[command(about = "HTTP service that slices uploaded 2D/3D source files into priced print jobs")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "slicer.config.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = if cli.config.exists() {
        match SlicerConfig::load_from_path(&cli.config) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("failed to load configuration: {e}");
                std::process::exit(1);
            }
        }
    } else {
        SlicerConfig::default()
    };

    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(port) = cli.port {
        config.service.port = port;
    }

    if let Err(e) = config.validate() {
        eprintln!("configuration validation failed: {e}");
        std::process::exit(1);
    }

    init_logging(&config);

    if !config.admin_key_configured() {
        warn!("ADMIN_API_KEY is not set; admin endpoints will return 503 until it is configured");
    }

    info!(config_path = %cli.config.display(), port = config.service.port, "starting print slicing service");

    if let Err(e) = start_service(config).await {
        error!("service failed: {e}");
        std::process::exit(1);
    }
}

fn init_logging(config: &SlicerConfig) {
    let level_filter = tracing_subscriber::filter::LevelFilter::from_level(config.effective_log_level());

    let registry = tracing_subscriber::registry().with(level_filter);

    let json = config.logging.format.eq_ignore_ascii_case("json");

    match (&config.logging.file_path, config.logging.file_enabled) {
        (Some(path), true) => {
            let directory = std::path::Path::new(path)
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = std::path::Path::new(path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "slicer-service.log".to_string());
            let appender = tracing_appender::rolling::daily(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            std::mem::forget(guard);

            if json {
                registry
                    .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
                    .init();
            } else {
                registry
                    .with(tracing_subscriber::fmt::layer().with_writer(writer))
                    .init();
            }
        }
        _ => {
            if json {
                registry.with(tracing_subscriber::fmt::layer().json()).init();
            } else {
                registry.with(tracing_subscriber::fmt::layer()).init();
            }
        }
    }
}
