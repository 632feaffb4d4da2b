use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use slicer_config::SlicerConfig;
use slicer_core::{PricingRegistry, SlicerCore};
use slicer_types::{SlicerError, Technology};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Print Slicing Service CLI
#[derive(Parser)]
#[command(name = "slicer")]
#[command(about = "Operator CLI for the print slicing service")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "slicer.config.toml")]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP service
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Inspect or mutate the pricing registry without going through HTTP
    Pricing {
        #[command(subcommand)]
        action: PricingAction,
    },

    /// Run one slice request through the pipeline locally
    Slice {
        /// Source file to slice
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Printing technology
        #[arg(long, value_enum)]
        technology: TechnologyArg,

        /// Layer height in millimeters
        #[arg(long)]
        layer_height: f64,

        /// Material name
        #[arg(long, default_value = "default")]
        material: String,

        /// Infill percentage (FDM only)
        #[arg(long, default_value = "20")]
        infill: u8,

        /// Source depth in millimeters, for 2D source conversion
        #[arg(long, default_value = "3.0")]
        depth: f64,
    },
}

#[derive(Subcommand)]
pub enum PricingAction {
    /// List all configured material rates
    List,

    /// Create or update a material rate
    Set {
        #[arg(value_enum)]
        technology: TechnologyArg,
        material: String,
        price: u64,
    },

    /// Delete a material rate
    Delete {
        #[arg(value_enum)]
        technology: TechnologyArg,
        material: String,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
pub enum TechnologyArg {
    Fdm,
    Sla,
}

impl From<TechnologyArg> for Technology {
    fn from(value: TechnologyArg) -> Self {
        match value {
            TechnologyArg::Fdm => Technology::Fdm,
            TechnologyArg::Sla => Technology::Sla,
        }
    }
}

pub struct CliRunner {
    config: SlicerConfig,
}

impl CliRunner {
    pub fn new(config_path: &Path) -> Result<Self> {
        let config = if config_path.exists() {
            SlicerConfig::load_from_path(config_path).context("failed to load configuration")?
        } else {
            warn!("configuration file not found, using defaults");
            SlicerConfig::default()
        };
        Ok(Self { config })
    }

    pub async fn run(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Serve { port } => self.serve_command(port).await,
            Commands::Pricing { action } => self.pricing_command(action).await,
            Commands::Slice {
                file,
                technology,
                layer_height,
                material,
                infill,
                depth,
            } => {
                self.slice_command(file, technology.into(), layer_height, material, infill, depth)
                    .await
            }
        }
    }

    async fn serve_command(&self, port: Option<u16>) -> Result<()> {
        let mut config = self.config.clone();
        if let Some(port) = port {
            config.service.port = port;
        }
        config.validate()?;
        info!(port = config.service.port, "starting print slicing service");
        slicer_service::start_service(config).await
    }

    async fn pricing_command(&self, action: PricingAction) -> Result<()> {
        let registry = PricingRegistry::load(&self.config.paths.pricing_file_path).await?;

        match action {
            PricingAction::List => {
                let map = registry.get_all().await;
                println!("{}", serde_json::to_string_pretty(&map)?);
            }
            PricingAction::Set {
                technology,
                material,
                price,
            } => {
                let tech: Technology = technology.into();
                let canonical = match registry.create(tech, &material, price).await {
                    Ok(canonical) => canonical,
                    Err(SlicerError::MaterialAlreadyExists { .. }) => {
                        registry.update(tech, &material, price).await?
                    }
                    Err(e) => return Err(e.into()),
                };
                println!("set {tech}.{canonical} = {price}");
            }
            PricingAction::Delete {
                technology,
                material,
            } => {
                let tech: Technology = technology.into();
                registry.delete(tech, &material).await?;
                println!("deleted {tech}.{material}");
            }
        }
        Ok(())
    }

    async fn slice_command(
        &self,
        file: PathBuf,
        technology: Technology,
        layer_height: f64,
        material: String,
        infill: u8,
        depth: f64,
    ) -> Result<()> {
        let core = SlicerCore::bootstrap(self.config.clone()).await?;
        let request_id = uuid::Uuid::new_v4().to_string();
        let scratch_dir = PathBuf::from(&self.config.paths.scratch_dir);
        tokio::fs::create_dir_all(&scratch_dir).await?;

        let staging_path = scratch_dir.join(format!("{request_id}.upload"));
        tokio::fs::copy(&file, &staging_path)
            .await
            .with_context(|| format!("failed to read source file: {}", file.display()))?;

        let original_filename = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let input = slicer_core::SliceJobInput {
            request_id,
            tech: technology,
            layer_height,
            material,
            infill_percent: infill,
            depth_mm: depth,
            original_filename,
            uploaded_path: staging_path,
            scratch_dir,
        };

        match core.run_slice_job(input).await {
            Ok(response) => {
                println!("{}", serde_json::to_string_pretty(&response)?);
            }
            Err(e) => {
                eprintln!("slicing failed: {e}");
                std::process::exit(1);
            }
        }
        Ok(())
    }
}

/// Initialize logging from CLI flags (always takes priority over config, so
/// an operator can turn up verbosity for a single invocation).
pub fn init_logging(level: &str, format: &str) -> Result<()> {
    let level_filter = match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => return Err(anyhow::anyhow!("invalid log level: {level}")),
    };

    let subscriber = tracing_subscriber::registry()
        .with(tracing_subscriber::filter::LevelFilter::from_level(level_filter));

    match format.to_lowercase().as_str() {
        "json" => subscriber.with(tracing_subscriber::fmt::layer().json()).init(),
        "pretty" => subscriber.with(tracing_subscriber::fmt::layer().pretty()).init(),
        _ => return Err(anyhow::anyhow!("invalid log format: {format}")),
    }

    Ok(())
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, &cli.log_format)?;

    let runner = CliRunner::new(&cli.config)?;
    runner.run(cli.command).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_serve_command() {
        let cli = Cli::try_parse_from(["slicer", "serve", "--port", "9090"]).unwrap();
        match cli.command {
            Commands::Serve { port } => assert_eq!(port, Some(9090)),
            _ => panic!("expected serve command"),
        }
    }

    #[test]
    fn cli_parses_pricing_set_command() {
        let cli = Cli::try_parse_from(["slicer", "pricing", "set", "fdm", "ASA", "1200"]).unwrap();
        match cli.command {
            Commands::Pricing {
                action: PricingAction::Set { material, price, .. },
            } => {
                assert_eq!(material, "ASA");
                assert_eq!(price, 1200);
            }
            _ => panic!("expected pricing set command"),
        }
    }

    #[test]
    fn cli_parses_slice_command_defaults() {
        let cli = Cli::try_parse_from([
            "slicer",
            "slice",
            "model.stl",
            "--technology",
            "fdm",
            "--layer-height",
            "0.2",
        ])
        .unwrap();
        match cli.command {
            Commands::Slice {
                file,
                infill,
                depth,
                material,
                ..
            } => {
                assert_eq!(file, PathBuf::from("model.stl"));
                assert_eq!(infill, 20);
                assert_eq!(depth, 3.0);
                assert_eq!(material, "default");
            }
            _ => panic!("expected slice command"),
        }
    }

    #[test]
    fn command_definition_is_well_formed() {
        Cli::command().debug_assert();
    }
}
