use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use slicer_types::{SlicerError, SlicerResult};
use std::path::Path;

/// Root configuration for the print slicing service.
///
/// Field names match the environment variables named in the operating
/// contract exactly (`ADMIN_API_KEY`, `MAX_UPLOAD_BYTES`, ...) so that
/// [`SlicerConfig::load`] can bind them without a prefix. Ambient concerns
/// the contract is silent on (bind address, CORS, logging) live in nested
/// structs with their own defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlicerConfig {
    /// Admin API key compared against the `x-api-key` header. Unset means
    /// every admin-mutating endpoint returns 503 until an operator sets it.
    #[serde(default)]
    pub admin_api_key: Option<String>,

    /// Maximum accepted multipart upload size, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,

    /// Body size cap for JSON request bodies (pricing mutation endpoints).
    #[serde(default = "default_json_body_limit")]
    pub json_body_limit: u64,

    /// Body size cap for multipart form fields outside the uploaded file itself.
    #[serde(default = "default_form_body_limit")]
    pub form_body_limit: u64,

    /// Fixed rate-limit window length, in milliseconds.
    #[serde(default = "default_rate_limit_window_ms")]
    pub slice_rate_limit_window_ms: u64,

    /// Maximum `/slice` requests a single client IP may make per window.
    #[serde(default = "default_rate_limit_max_requests")]
    pub slice_rate_limit_max_requests: u32,

    /// Worker pool size for concurrent slicing subprocesses.
    #[serde(default = "default_max_concurrent_slices")]
    pub max_concurrent_slices: u32,

    /// Maximum number of slice requests allowed to wait in the admission queue.
    #[serde(default = "default_max_slice_queue_length")]
    pub max_slice_queue_length: u32,

    /// Maximum time a queued request may wait for a free worker, in milliseconds.
    #[serde(default = "default_max_slice_queue_wait_ms")]
    pub max_slice_queue_wait_ms: u64,

    /// Maximum entry count accepted when extracting a zip upload.
    #[serde(default = "default_max_zip_entries")]
    pub max_zip_entries: u32,

    /// Maximum cumulative uncompressed size accepted from a zip upload.
    #[serde(default = "default_max_zip_uncompressed_bytes")]
    pub max_zip_uncompressed_bytes: u64,

    /// Whether stdout/stderr of slicer subprocess invocations are logged
    /// verbatim at debug level. Off by default: slicer output can be large.
    #[serde(default)]
    pub debug_command_logs: bool,

    /// HTTP service configuration.
    pub service: ServiceConfig,

    /// Structured logging configuration.
    pub logging: LoggingConfig,

    /// Filesystem layout for pricing data, slicer profiles, and binaries.
    pub paths: PathsConfig,
}

/// HTTP service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    #[serde(default = "default_allowed_methods")]
    pub allowed_methods: Vec<String>,

    #[serde(default = "default_allowed_headers")]
    pub allowed_headers: Vec<String>,
}

/// Structured logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    #[serde(default)]
    pub file_enabled: bool,

    pub file_path: Option<String>,
}

/// Filesystem locations the service reads/writes at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_pricing_file_path")]
    pub pricing_file_path: String,

    /// Directory holding `{FDM|SLA}_{layerHeight}mm.ini` slicer profiles.
    #[serde(default = "default_profiles_dir")]
    pub profiles_dir: String,

    /// Uploads + archive extraction scratch root (`input/` in the spec layout).
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: String,

    /// Where finished print artifacts are written and served from.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Rolling internal-error log file (`logs/log.json`).
    #[serde(default = "default_error_log_path")]
    pub error_log_path: String,

    /// Retention window, in days, for the rolling error log.
    #[serde(default = "default_error_log_retention_days")]
    pub error_log_retention_days: u32,

    #[serde(default = "default_fdm_binary")]
    pub fdm_slicer_binary: String,

    #[serde(default = "default_sla_binary")]
    pub sla_slicer_binary: String,

    /// Converters invoked by the ingestion pipeline, keyed by source kind.
    #[serde(default = "default_image_to_mesh_binary")]
    pub image_to_mesh_binary: String,

    #[serde(default = "default_vector_to_mesh_binary")]
    pub vector_to_mesh_binary: String,

    #[serde(default = "default_mesh_to_mesh_binary")]
    pub mesh_to_mesh_binary: String,

    #[serde(default = "default_cad_to_mesh_binary")]
    pub cad_to_mesh_binary: String,

    #[serde(default = "default_orientation_optimizer_binary")]
    pub orientation_optimizer_binary: String,

    #[serde(default = "default_subprocess_timeout_seconds")]
    pub subprocess_timeout_seconds: u64,
}

fn default_max_upload_bytes() -> u64 {
    100 * 1024 * 1024
}
fn default_json_body_limit() -> u64 {
    1024 * 1024
}
fn default_form_body_limit() -> u64 {
    1024 * 1024
}
fn default_rate_limit_window_ms() -> u64 {
    60_000
}
fn default_rate_limit_max_requests() -> u32 {
    5
}
fn default_max_concurrent_slices() -> u32 {
    num_cpus::get() as u32
}
fn default_max_slice_queue_length() -> u32 {
    50
}
fn default_max_slice_queue_wait_ms() -> u64 {
    30_000
}
fn default_max_zip_entries() -> u32 {
    256
}
fn default_max_zip_uncompressed_bytes() -> u64 {
    500 * 1024 * 1024
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout_seconds() -> u64 {
    600
}
fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}
fn default_allowed_methods() -> Vec<String> {
    vec![
        "GET".to_string(),
        "POST".to_string(),
        "PATCH".to_string(),
        "DELETE".to_string(),
    ]
}
fn default_allowed_headers() -> Vec<String> {
    vec!["Content-Type".to_string(), "x-api-key".to_string()]
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}
fn default_pricing_file_path() -> String {
    "configs/pricing.json".to_string()
}
fn default_profiles_dir() -> String {
    "configs".to_string()
}
fn default_scratch_dir() -> String {
    "var/scratch".to_string()
}
fn default_output_dir() -> String {
    "var/output".to_string()
}
fn default_fdm_binary() -> String {
    "prusa-slicer".to_string()
}
fn default_sla_binary() -> String {
    "prusa-slicer".to_string()
}
fn default_image_to_mesh_binary() -> String {
    "image-to-mesh".to_string()
}
fn default_vector_to_mesh_binary() -> String {
    "vector-to-mesh".to_string()
}
fn default_mesh_to_mesh_binary() -> String {
    "mesh-to-mesh".to_string()
}
fn default_cad_to_mesh_binary() -> String {
    "cad-to-mesh".to_string()
}
fn default_orientation_optimizer_binary() -> String {
    "orientation-optimizer".to_string()
}
fn default_error_log_path() -> String {
    "logs/log.json".to_string()
}
fn default_error_log_retention_days() -> u32 {
    7
}
fn default_subprocess_timeout_seconds() -> u64 {
    600
}

impl Default for SlicerConfig {
    fn default() -> Self {
        Self {
            admin_api_key: None,
            max_upload_bytes: default_max_upload_bytes(),
            json_body_limit: default_json_body_limit(),
            form_body_limit: default_form_body_limit(),
            slice_rate_limit_window_ms: default_rate_limit_window_ms(),
            slice_rate_limit_max_requests: default_rate_limit_max_requests(),
            max_concurrent_slices: default_max_concurrent_slices(),
            max_slice_queue_length: default_max_slice_queue_length(),
            max_slice_queue_wait_ms: default_max_slice_queue_wait_ms(),
            max_zip_entries: default_max_zip_entries(),
            max_zip_uncompressed_bytes: default_max_zip_uncompressed_bytes(),
            debug_command_logs: false,
            service: ServiceConfig {
                bind_address: default_bind_address(),
                port: default_port(),
                request_timeout_seconds: default_request_timeout_seconds(),
                cors: CorsConfig {
                    allowed_origins: default_allowed_origins(),
                    allowed_methods: default_allowed_methods(),
                    allowed_headers: default_allowed_headers(),
                },
            },
            logging: LoggingConfig {
                level: default_log_level(),
                format: default_log_format(),
                file_enabled: false,
                file_path: None,
            },
            paths: PathsConfig {
                pricing_file_path: default_pricing_file_path(),
                profiles_dir: default_profiles_dir(),
                scratch_dir: default_scratch_dir(),
                output_dir: default_output_dir(),
                error_log_path: default_error_log_path(),
                error_log_retention_days: default_error_log_retention_days(),
                fdm_slicer_binary: default_fdm_binary(),
                sla_slicer_binary: default_sla_binary(),
                image_to_mesh_binary: default_image_to_mesh_binary(),
                vector_to_mesh_binary: default_vector_to_mesh_binary(),
                mesh_to_mesh_binary: default_mesh_to_mesh_binary(),
                cad_to_mesh_binary: default_cad_to_mesh_binary(),
                orientation_optimizer_binary: default_orientation_optimizer_binary(),
                subprocess_timeout_seconds: default_subprocess_timeout_seconds(),
            },
        }
    }
}

impl SlicerConfig {
    /// Load configuration from a TOML file, then validate.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_str = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read config file: {:?}", path.as_ref()))?;

        let config: SlicerConfig =
            toml::from_str(&config_str).with_context(|| "failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration layering (in increasing priority): built-in
    /// defaults, `slicer.config.toml` if present, `/etc/slicer/config.toml`
    /// if present, then environment variables. Environment variables bind
    /// by their literal name for top-level fields (`ADMIN_API_KEY`,
    /// `MAX_UPLOAD_BYTES`, ...) and by `SECTION__FIELD` for nested ones
    /// (`SERVICE__PORT`, `LOGGING__LEVEL`).
    pub fn load() -> Result<Self> {
        let defaults = Self::default();
        let defaults_value = serde_json::to_value(&defaults)
            .context("failed to serialize default configuration")?;

        let mut builder = Config::builder();
        builder = builder
            .add_source(config::Config::try_from(&defaults_value).context("invalid defaults")?);
        builder = builder
            .add_source(File::with_name("slicer.config").required(false))
            .add_source(File::with_name("/etc/slicer/config").required(false))
            .add_source(Environment::default().separator("__").try_parsing(true));

        let built = builder.build().context("failed to build configuration")?;
        let config: SlicerConfig = built
            .try_deserialize()
            .context("failed to deserialize configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Persist configuration as TOML, for operators bootstrapping a config file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let config_str = toml::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(path.as_ref(), config_str)
            .with_context(|| format!("failed to write config file: {:?}", path.as_ref()))?;
        Ok(())
    }

    pub fn validate(&self) -> SlicerResult<()> {
        if self.max_upload_bytes == 0 {
            return Err(SlicerError::Validation(
                "max_upload_bytes must be greater than 0".to_string(),
            ));
        }
        if self.max_concurrent_slices == 0 {
            return Err(SlicerError::Validation(
                "max_concurrent_slices must be greater than 0".to_string(),
            ));
        }
        if self.max_slice_queue_length == 0 {
            return Err(SlicerError::Validation(
                "max_slice_queue_length must be greater than 0".to_string(),
            ));
        }
        if self.slice_rate_limit_max_requests == 0 {
            return Err(SlicerError::Validation(
                "slice_rate_limit_max_requests must be greater than 0".to_string(),
            ));
        }
        if self.slice_rate_limit_window_ms == 0 {
            return Err(SlicerError::Validation(
                "slice_rate_limit_window_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_zip_entries == 0 {
            return Err(SlicerError::Validation(
                "max_zip_entries must be greater than 0".to_string(),
            ));
        }
        if self.service.port == 0 {
            return Err(SlicerError::Validation(
                "service.port must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// True once an operator has set a non-empty admin key. Until then,
    /// admin-mutating endpoints must refuse with 503.
    pub fn admin_key_configured(&self) -> bool {
        self.admin_api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    pub fn effective_log_level(&self) -> tracing::Level {
        match self.logging.level.to_lowercase().as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "warn" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => tracing::Level::INFO,
        }
    }
}

/// Builder for programmatic/test construction of [`SlicerConfig`].
pub struct SlicerConfigBuilder {
    config: SlicerConfig,
}

impl SlicerConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SlicerConfig::default(),
        }
    }

    pub fn with_admin_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.admin_api_key = Some(key.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.config.service.port = port;
        self
    }

    pub fn with_max_concurrent_slices(mut self, n: u32) -> Self {
        self.config.max_concurrent_slices = n;
        self
    }

    pub fn with_max_slice_queue_length(mut self, n: u32) -> Self {
        self.config.max_slice_queue_length = n;
        self
    }

    pub fn with_max_slice_queue_wait_ms(mut self, ms: u64) -> Self {
        self.config.max_slice_queue_wait_ms = ms;
        self
    }

    pub fn with_rate_limit(mut self, window_ms: u64, max_requests: u32) -> Self {
        self.config.slice_rate_limit_window_ms = window_ms;
        self.config.slice_rate_limit_max_requests = max_requests;
        self
    }

    pub fn with_pricing_file_path(mut self, path: impl Into<String>) -> Self {
        self.config.paths.pricing_file_path = path.into();
        self
    }

    pub fn with_scratch_dir(mut self, path: impl Into<String>) -> Self {
        self.config.paths.scratch_dir = path.into();
        self
    }

    pub fn build(self) -> Result<SlicerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for SlicerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn default_config_validates() {
        assert!(SlicerConfig::default().validate().is_ok());
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = SlicerConfigBuilder::new()
            .with_admin_api_key("secret")
            .with_port(9090)
            .with_max_concurrent_slices(4)
            .build()
            .unwrap();

        assert_eq!(config.service.port, 9090);
        assert_eq!(config.max_concurrent_slices, 4);
        assert!(config.admin_key_configured());
    }

    #[test]
    fn admin_key_configured_is_false_when_unset_or_empty() {
        assert!(!SlicerConfig::default().admin_key_configured());
        let mut config = SlicerConfig::default();
        config.admin_api_key = Some(String::new());
        assert!(!config.admin_key_configured());
    }

    #[test]
    fn round_trips_through_toml_file() {
        let config = SlicerConfigBuilder::new()
            .with_admin_api_key("abc123")
            .build()
            .unwrap();
        let file = NamedTempFile::new().unwrap();
        config.save_to_file(file.path()).unwrap();

        let loaded = SlicerConfig::load_from_path(file.path()).unwrap();
        assert_eq!(loaded.admin_api_key, config.admin_api_key);
        assert_eq!(loaded.max_concurrent_slices, config.max_concurrent_slices);
    }

    #[test]
    fn validation_rejects_zero_queue_length() {
        let mut config = SlicerConfig::default();
        config.max_slice_queue_length = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn effective_log_level_falls_back_to_info() {
        let mut config = SlicerConfig::default();
        config.logging.level = "bogus".to_string();
        assert_eq!(config.effective_log_level(), tracing::Level::INFO);
        config.logging.level = "debug".to_string();
        assert_eq!(config.effective_log_level(), tracing::Level::DEBUG);
    }
}
