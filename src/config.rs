use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::decoder::DecoderKind;
use crate::sampler::DEFAULT_FRAME_SKIP;
use crate::{AnalyzerError, Result};

/// Config files tried in order by [`Config::load`]
const CONFIG_SEARCH_PATHS: [&str; 3] = [
    "road-analyzer.toml",
    "config/road-analyzer.toml",
    "/etc/road-analyzer/config.toml",
];

/// Configuration for the Road Analyzer service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Frame sampling settings
    pub sampling: SamplingConfig,

    /// Video decoder settings
    pub decoder: DecoderConfig,

    /// Transient upload storage
    pub storage: StorageConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Largest accepted request body in megabytes
    pub max_upload_mb: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Emit every `frame_skip`-th frame
    pub frame_skip: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Decoder backend
    pub kind: DecoderKind,

    /// ffmpeg executable
    pub ffmpeg_path: PathBuf,

    /// ffprobe executable
    pub ffprobe_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for transient upload files (system temp dir if unset)
    pub temp_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log filter when RUST_LOG is not set
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            max_upload_mb: 512,
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            frame_skip: DEFAULT_FRAME_SKIP,
        }
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            kind: DecoderKind::Ffmpeg,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            sampling: SamplingConfig::default(),
            decoder: DecoderConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn max_upload_bytes(&self) -> usize {
        usize::try_from(self.max_upload_mb.saturating_mul(1024 * 1024)).unwrap_or(usize::MAX)
    }
}

impl Config {
    /// First config file present on the search path
    pub fn locate() -> Option<PathBuf> {
        CONFIG_SEARCH_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }

    /// Load configuration from the first config file found, or from the
    /// environment when there is none
    pub fn load() -> Result<Self> {
        match Self::locate() {
            Some(path) => Self::load_from(path),
            None => Self::from_env(),
        }
    }

    /// Load configuration from a specific TOML file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config_str = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&config_str)
    }

    pub fn from_toml(config_str: &str) -> Result<Self> {
        toml::from_str(config_str).map_err(|e| AnalyzerError::Config(e.to_string()))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override fields from `ROAD_ANALYZER_*` variables
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(port) = var("ROAD_ANALYZER_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| AnalyzerError::Config(format!("invalid ROAD_ANALYZER_PORT: {}", port)))?;
        }

        if let Some(frame_skip) = var("ROAD_ANALYZER_FRAME_SKIP") {
            self.sampling.frame_skip = frame_skip
                .parse()
                .map_err(|_| AnalyzerError::Config(format!("invalid ROAD_ANALYZER_FRAME_SKIP: {}", frame_skip)))?;
        }

        if let Some(temp_dir) = var("ROAD_ANALYZER_TEMP_DIR") {
            self.storage.temp_dir = Some(PathBuf::from(temp_dir));
        }

        if let Some(decoder) = var("ROAD_ANALYZER_DECODER") {
            self.decoder.kind = decoder.parse()?;
        }

        if let Some(log_level) = var("ROAD_ANALYZER_LOG_LEVEL") {
            self.logging.level = log_level;
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let config_str = toml::to_string_pretty(self).map_err(|e| AnalyzerError::Config(e.to_string()))?;
        std::fs::write(path.as_ref(), config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path.as_ref().display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.sampling.frame_skip == 0 {
            return Err(AnalyzerError::InvalidPolicy("frame_skip must be greater than 0".to_string()));
        }

        if self.server.max_upload_mb == 0 {
            return Err(AnalyzerError::Config("max_upload_mb must be greater than 0".to_string()));
        }

        if let Some(temp_dir) = &self.storage.temp_dir {
            if !temp_dir.exists() {
                std::fs::create_dir_all(temp_dir).map_err(|e| {
                    AnalyzerError::Config(format!("cannot create temp dir {}: {}", temp_dir.display(), e))
                })?;
            }
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Road Analyzer Configuration:\n\
            - Listen: {}:{}\n\
            - Max Upload: {}MB\n\
            - Frame Skip: {}\n\
            - Decoder: {:?}\n\
            - Temp Dir: {}",
            self.server.host,
            self.server.port,
            self.server.max_upload_mb,
            self.sampling.frame_skip,
            self.decoder.kind,
            self.storage
                .temp_dir
                .as_ref()
                .map(|d| d.display().to_string())
                .unwrap_or_else(|| "system default".to_string()),
        )
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.config.server.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    pub fn with_max_upload_mb(mut self, max_upload_mb: u64) -> Self {
        self.config.server.max_upload_mb = max_upload_mb;
        self
    }

    pub fn with_frame_skip(mut self, frame_skip: u32) -> Self {
        self.config.sampling.frame_skip = frame_skip;
        self
    }

    pub fn with_decoder(mut self, kind: DecoderKind) -> Self {
        self.config.decoder.kind = kind;
        self
    }

    pub fn with_temp_dir(mut self, dir: PathBuf) -> Self {
        self.config.storage.temp_dir = Some(dir);
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
