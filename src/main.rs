use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use road_analyzer::api::{ApiServer, AppContext};
use road_analyzer::decoder::DecoderKind;
use road_analyzer::{Config, IngestionCoordinator};

fn cli() -> Command {
    let frame_skip = Arg::new("frame-skip")
        .short('k')
        .long("frame-skip")
        .value_name("N")
        .help("Sample every N-th frame")
        .value_parser(clap::value_parser!(u32));

    let decoder = Arg::new("decoder")
        .long("decoder")
        .value_name("KIND")
        .help("Decoder backend (ffmpeg or synthetic)")
        .value_parser(["ffmpeg", "synthetic"]);

    Command::new("Road Analyzer")
        .version(env!("CARGO_PKG_VERSION"))
        .author("TigreRoll")
        .about("Road survey video ingestion and frame sampling")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file")
                .global(true)
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue)
                .global(true)
        )
        .subcommand(
            Command::new("serve")
                .about("Run the upload API server")
                .arg(
                    Arg::new("host")
                        .long("host")
                        .value_name("HOST")
                        .help("Interface to bind")
                )
                .arg(
                    Arg::new("port")
                        .short('p')
                        .long("port")
                        .value_name("PORT")
                        .help("Port to listen on")
                        .value_parser(clap::value_parser!(u16))
                )
                .arg(frame_skip.clone())
                .arg(decoder.clone())
        )
        .subcommand(
            Command::new("sample")
                .about("Sample a local video file and print its report")
                .arg(
                    Arg::new("video")
                        .value_name("VIDEO")
                        .help("Video file to sample")
                        .required(true)
                )
                .arg(frame_skip)
                .arg(decoder)
        )
}

/// Configuration plus what to report about it once logging is up
#[derive(Debug)]
struct LoadedConfig {
    config: Config,
    source: Option<PathBuf>,
    fallback_reason: Option<String>,
}

impl LoadedConfig {
    fn defaults(reason: String) -> Self {
        Self {
            config: Config::default(),
            source: None,
            fallback_reason: Some(reason),
        }
    }

    fn report(&self) {
        match &self.source {
            Some(path) => info!("📄 Loaded configuration from: {}", path.display()),
            None => debug!("No config file, using environment and defaults"),
        }
        if let Some(reason) = &self.fallback_reason {
            warn!("{}, using defaults", reason);
        }
    }
}

/// An explicit `--config` file must load; a discovered one falls back to
/// defaults
fn resolve_config(explicit: Option<&Path>, discovered: Option<PathBuf>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = Config::load_from(path).with_context(|| format!("loading {}", path.display()))?;
        return Ok(LoadedConfig {
            config,
            source: Some(path.to_path_buf()),
            fallback_reason: None,
        });
    }

    let loaded = match discovered {
        Some(path) => match Config::load_from(&path) {
            Ok(config) => LoadedConfig {
                config,
                source: Some(path),
                fallback_reason: None,
            },
            Err(e) => LoadedConfig::defaults(format!("Failed to load config file {}: {}", path.display(), e)),
        },
        None => match Config::from_env() {
            Ok(config) => LoadedConfig {
                config,
                source: None,
                fallback_reason: None,
            },
            Err(e) => LoadedConfig::defaults(format!("Invalid environment configuration: {}", e)),
        },
    };
    Ok(loaded)
}

fn load_config(matches: &ArgMatches) -> Result<LoadedConfig> {
    let explicit = matches.get_one::<String>("config").map(Path::new);
    let discovered = if explicit.is_none() { Config::locate() } else { None };
    resolve_config(explicit, discovered)
}

/// Apply per-subcommand overrides on top of the loaded configuration
fn apply_overrides(config: &mut Config, matches: &ArgMatches) -> Result<()> {
    if let Some(frame_skip) = matches.get_one::<u32>("frame-skip") {
        config.sampling.frame_skip = *frame_skip;
    }
    if let Some(decoder) = matches.get_one::<String>("decoder") {
        config.decoder.kind = decoder.parse::<DecoderKind>()?;
    }
    if let Ok(Some(host)) = matches.try_get_one::<String>("host") {
        config.server.host = host.clone();
    }
    if let Ok(Some(port)) = matches.try_get_one::<u16>("port") {
        config.server.port = *port;
    }
    Ok(())
}

fn init_logging(config: &Config, verbose: bool) {
    let default_level = if verbose { "debug" } else { config.logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("road_analyzer={},tower_http={},warn", default_level, default_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    let verbose = matches.get_flag("verbose");

    let loaded = load_config(&matches)?;
    init_logging(&loaded.config, verbose);
    loaded.report();
    let mut config = loaded.config;

    if verbose {
        info!("Verbose logging enabled");
    }

    match matches.subcommand() {
        Some(("serve", sub)) => {
            apply_overrides(&mut config, sub)?;
            info!("🚗 Road Analyzer starting...");
            info!("{}", config.summary());

            let context = AppContext::from_config(config)?;
            ApiServer::new(context).start().await
        }
        Some(("sample", sub)) => {
            apply_overrides(&mut config, sub)?;
            config.validate()?;

            let video = PathBuf::from(
                sub.get_one::<String>("video")
                    .context("missing VIDEO argument")?,
            );
            let coordinator = IngestionCoordinator::from_config(&config)?;

            let start_time = std::time::Instant::now();
            let report = tokio::task::spawn_blocking(move || coordinator.process_path(&video)).await??;
            info!("🎉 Sampling completed in {:.2}s", start_time.elapsed().as_secs_f64());

            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        _ => unreachable!("subcommand_required is set"),
    }
}
