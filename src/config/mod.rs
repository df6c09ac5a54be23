use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub recognition: RecognitionConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub reports: ReportsConfig,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Camera / stream source configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CameraConfig {
    /// Device index, device path, RTSP URL, file URI or `test`
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Longest a single frame read may block (milliseconds)
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
}

fn default_device() -> String {
    "0".to_string()
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

fn default_read_timeout() -> u64 {
    500
}

/// Task timing for the capture, display and processing loops
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default = "default_capture_interval")]
    pub capture_interval_ms: u64,
    #[serde(default = "default_display_interval")]
    pub display_interval_ms: u64,
    #[serde(default = "default_process_interval")]
    pub process_interval_ms: u64,
    /// Consecutive failed reads before the stream is reported as degraded
    #[serde(default = "default_max_read_failures")]
    pub max_consecutive_read_failures: u32,
}

fn default_capture_interval() -> u64 {
    30
}

fn default_display_interval() -> u64 {
    30
}

fn default_process_interval() -> u64 {
    50
}

fn default_max_read_failures() -> u32 {
    30
}

/// What happens to the other valid plates found in the same frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidatePolicy {
    /// Only the first valid candidate is reviewed, the rest are dropped
    #[default]
    FirstOnly,
    /// Remaining candidates are reviewed one after another in detector order
    Queue,
}

/// Recognition acceptance configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RecognitionConfig {
    /// Regex the normalized plate text must match; any non-empty text when unset
    #[serde(default)]
    pub plate_pattern: Option<String>,
    /// Minimum recognizer confidence, checked only when a confidence is reported
    #[serde(default)]
    pub min_confidence: Option<f32>,
    #[serde(default)]
    pub candidate_policy: CandidatePolicy,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL
    #[serde(default = "default_db_url")]
    pub url: String,
    /// Connection pool max size
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Automatic migration on startup
    #[serde(default = "default_auto_migrate")]
    pub auto_migrate: bool,
}

fn default_db_url() -> String {
    "sqlite://license_plates.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_auto_migrate() -> bool {
    true
}

/// Where confirmed frames are written
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub captured_images_dir: Option<PathBuf>,
}

/// Report and search configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportsConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Minimum similarity (0-100) for a vehicle to appear in free-text search
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

fn default_page_size() -> usize {
    20
}

fn default_similarity_threshold() -> f64 {
    70.0
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            width: default_width(),
            height: default_height(),
            read_timeout_ms: default_read_timeout(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capture_interval_ms: default_capture_interval(),
            display_interval_ms: default_display_interval(),
            process_interval_ms: default_process_interval(),
            max_consecutive_read_failures: default_max_read_failures(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_db_url(),
            max_connections: default_max_connections(),
            auto_migrate: default_auto_migrate(),
        }
    }
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            pipeline: PipelineConfig::default(),
            recognition: RecognitionConfig::default(),
            database: DatabaseConfig::default(),
            storage: StorageConfig::default(),
            reports: ReportsConfig::default(),
            log_level: default_log_level(),
        }
    }
}

/// Load configuration from a file or use default
pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    match config_path {
        Some(path) => {
            let config_str = std::fs::read_to_string(path)
                .context(format!("Failed to read config file: {:?}", path))?;

            let config = if path.extension().map_or(false, |ext| ext == "json") {
                serde_json::from_str(&config_str).context("Failed to parse JSON config")?
            } else if path.extension().map_or(false, |ext| ext == "toml") {
                toml::from_str(&config_str).context("Failed to parse TOML config")?
            } else {
                return Err(anyhow::anyhow!("Unsupported config file format"));
            };

            Ok(config)
        }
        None => Ok(Config::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_toml_uses_defaults() -> Result<()> {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
        writeln!(
            file,
            r#"
            log_level = "debug"

            [camera]
            device = "rtsp://10.0.0.2/stream"

            [recognition]
            plate_pattern = "^[A-Z]{{2}}[0-9]{{2}}[A-Z]{{1,2}}[0-9]{{4}}$"
            candidate_policy = "queue"

            [reports]
            similarity_threshold = 85.0
            "#
        )?;

        let config = load_config(Some(file.path()))?;
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.camera.device, "rtsp://10.0.0.2/stream");
        assert_eq!(config.camera.width, 1280);
        assert_eq!(config.pipeline.process_interval_ms, 50);
        assert_eq!(config.recognition.candidate_policy, CandidatePolicy::Queue);
        assert_eq!(config.reports.similarity_threshold, 85.0);
        assert_eq!(config.reports.page_size, 20);
        assert_eq!(config.database.url, "sqlite://license_plates.db");
        Ok(())
    }

    #[test]
    fn test_json_config() -> Result<()> {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile()?;
        write!(
            file,
            r#"{{"database": {{"url": "sqlite::memory:", "max_connections": 1}}}}"#
        )?;

        let config = load_config(Some(file.path()))?;
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.database.max_connections, 1);
        assert!(config.database.auto_migrate);
        assert_eq!(config.recognition.candidate_policy, CandidatePolicy::FirstOnly);
        Ok(())
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        assert!(load_config(Some(file.path())).is_err());
    }
}
