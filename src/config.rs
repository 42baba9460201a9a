// Configuration module for showtime-enricher
// Handles XDG-compliant directory paths and TOML configuration file

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::resolver::score::MatchTuning;

const APP_NAME: &str = "showtime-enricher";
const CONFIG_FILENAME: &str = "config.toml";
const CACHE_FILENAME: &str = "tmdb_cache.json";
const LISTINGS_FILENAME: &str = "showtimes.json";

/// TOML configuration file structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Enrichment engine configuration
    pub enrichment: EnrichmentConfig,

    /// Directory paths (overrides XDG defaults)
    pub paths: PathsConfig,

    /// Listing input/output files
    pub files: FilesConfig,

    /// Matching thresholds and heuristics
    pub tuning: MatchTuning,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// TMDB API key (or set TMDB_API_KEY)
    pub tmdb_api_key: Option<String>,

    /// Per-request timeout in seconds (default: 10)
    pub request_timeout_secs: u64,

    /// Delay between freshly-resolved titles in milliseconds (default: 300)
    pub title_delay_ms: u64,

    /// Purge cached not-found markers at load so they are retried
    /// (default: false)
    pub retry_not_found: bool,

    /// Market profile TOML (vocabularies, brands, aliases); built-in
    /// defaults when unset
    pub market_profile: Option<PathBuf>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            tmdb_api_key: None,
            request_timeout_secs: 10,
            title_delay_ms: 300,
            retry_not_found: false,
            market_profile: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Override data directory (cache file location)
    pub data_dir: Option<PathBuf>,

    /// Override config directory
    pub config_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    /// Scraped listings JSON to enrich (default: <data_dir>/showtimes.json)
    pub listings: Option<PathBuf>,

    /// Enriched output JSON (default: same as listings, in place)
    pub output: Option<PathBuf>,
}

/// Application paths following XDG Base Directory Specification on Unix
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for configuration files (config.toml, market profiles)
    pub config_dir: PathBuf,

    /// Directory for persistent data (resolution cache, listings)
    pub data_dir: PathBuf,
}

impl AppPaths {
    pub fn new(overrides: &PathsConfig) -> Self {
        Self {
            config_dir: Self::resolve_config_dir(&overrides.config_dir),
            data_dir: Self::resolve_data_dir(&overrides.data_dir),
        }
    }

    /// Current-directory layout (legacy/portable mode), matching the
    /// original pipeline's flat `data/` directory.
    pub fn current_dir() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            config_dir: cwd.clone(),
            data_dir: cwd.join("data"),
        }
    }

    fn resolve_config_dir(config_override: &Option<PathBuf>) -> PathBuf {
        if let Ok(path) = std::env::var("SHOWTIME_ENRICHER_CONFIG_DIR") {
            return PathBuf::from(path);
        }
        if let Some(ref path) = config_override {
            return path.clone();
        }
        if let Some(dir) = dirs::config_dir() {
            return dir.join(APP_NAME);
        }
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }

    fn resolve_data_dir(config_override: &Option<PathBuf>) -> PathBuf {
        if let Ok(path) = std::env::var("SHOWTIME_ENRICHER_DATA_DIR") {
            return PathBuf::from(path);
        }
        if let Some(ref path) = config_override {
            return path.clone();
        }
        if let Some(dir) = dirs::data_dir() {
            return dir.join(APP_NAME);
        }
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join("data")
    }

    pub fn cache_file(&self) -> PathBuf {
        self.data_dir.join(CACHE_FILENAME)
    }

    pub fn config_file_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILENAME)
    }

    /// Ensure all directories exist
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }

    pub fn log_paths(&self) {
        tracing::info!("Configuration directory: {}", self.config_dir.display());
        tracing::info!("Data directory: {}", self.data_dir.display());
        tracing::debug!("Cache file: {}", self.cache_file().display());
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new(&PathsConfig::default())
    }
}

/// Application configuration - combines TOML file with environment overrides
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub paths: AppPaths,
    pub tmdb_api_key: Option<String>,
    pub request_timeout_secs: u64,
    pub title_delay_ms: u64,
    pub retry_not_found: bool,
    pub market_profile: Option<PathBuf>,
    pub listings_path: PathBuf,
    pub output_path: PathBuf,
    pub tuning: MatchTuning,
}

impl AppConfig {
    /// Load configuration from TOML file and environment
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. TOML config file
    /// 3. Default values
    pub fn load() -> Self {
        let portable_mode = std::env::var("SHOWTIME_ENRICHER_PORTABLE")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        if portable_mode {
            tracing::info!("Running in portable mode (using current directory)");
            return Self::build(ConfigFile::default(), AppPaths::current_dir());
        }

        let config_dir = Self::find_config_dir();
        let config_file = Self::load_config_file(&config_dir);
        let paths = AppPaths::new(&config_file.paths);
        Self::build(config_file, paths)
    }

    fn find_config_dir() -> PathBuf {
        if let Ok(path) = std::env::var("SHOWTIME_ENRICHER_CONFIG_DIR") {
            return PathBuf::from(path);
        }
        if let Some(dir) = dirs::config_dir() {
            return dir.join(APP_NAME);
        }
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }

    fn load_config_file(config_dir: &Path) -> ConfigFile {
        let config_path = config_dir.join(CONFIG_FILENAME);

        if !config_path.exists() {
            tracing::debug!(
                "No config file found at {}, using defaults",
                config_path.display()
            );
            return ConfigFile::default();
        }

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded configuration from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse config file {}: {}. Using defaults.",
                        config_path.display(),
                        e
                    );
                    ConfigFile::default()
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read config file {}: {}. Using defaults.",
                    config_path.display(),
                    e
                );
                ConfigFile::default()
            }
        }
    }

    fn build(config_file: ConfigFile, paths: AppPaths) -> Self {
        // TMDB API key: env > config
        let tmdb_api_key = std::env::var("TMDB_API_KEY")
            .ok()
            .or(config_file.enrichment.tmdb_api_key);

        let listings_path = std::env::var("SHOWTIME_ENRICHER_LISTINGS")
            .ok()
            .map(PathBuf::from)
            .or(config_file.files.listings)
            .unwrap_or_else(|| paths.data_dir.join(LISTINGS_FILENAME));

        // Default: enrich in place, like the original pipeline.
        let output_path = std::env::var("SHOWTIME_ENRICHER_OUTPUT")
            .ok()
            .map(PathBuf::from)
            .or(config_file.files.output)
            .unwrap_or_else(|| listings_path.clone());

        Self {
            paths,
            tmdb_api_key,
            request_timeout_secs: config_file.enrichment.request_timeout_secs,
            title_delay_ms: config_file.enrichment.title_delay_ms,
            retry_not_found: config_file.enrichment.retry_not_found,
            market_profile: config_file.enrichment.market_profile,
            listings_path,
            output_path,
            tuning: config_file.tuning,
        }
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }

    pub fn title_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.title_delay_ms)
    }

    /// Log configuration status
    pub fn log_config(&self) {
        self.paths.log_paths();
        tracing::info!("Listings file: {}", self.listings_path.display());
        if self.output_path != self.listings_path {
            tracing::info!("Output file: {}", self.output_path.display());
        }

        if self.tmdb_api_key.is_some() {
            tracing::info!("Metadata provider: TMDB");
        } else {
            tracing::warn!("TMDB_API_KEY not set; enrichment will be skipped");
            tracing::info!("Hint: add tmdb_api_key to config.toml or set TMDB_API_KEY env var");
        }

        if let Some(ref path) = self.market_profile {
            tracing::info!("Market profile: {}", path.display());
        } else {
            tracing::debug!("Market profile: built-in defaults");
        }

        if self.retry_not_found {
            tracing::info!("Retrying previously not-found titles this run");
        }
    }
}
