use std::path::Path;

use serde::Deserialize;

pub const CONFIG_FILENAME: &str = "mpbar.toml";

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;
pub const DEFAULT_TEMPLATE: &str = "{prefix} [{bar:30}] {pos}/{len} {msg}";
pub const DEFAULT_PROGRESS_CHARS: &str = "=> ";
pub const DEFAULT_REFRESH_HZ: u8 = 15;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse mpbar.toml: {0}")]
    Parse(String),
    #[error("config validation error: {0}")]
    Validation(String),
}

/// Full `mpbar.toml` configuration.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MpbarConfig {
    #[serde(default)]
    pub watcher: WatcherConfig,

    #[serde(default)]
    pub display: DisplayConfig,
}

/// How the background watcher drains the update channel.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WatcherConfig {
    /// Receive timeout of the watcher loop. Bounds how long closing a
    /// session waits for the watcher to notice the stop request.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Bounded queue size. `None` means unbounded; producers block on a
    /// full queue rather than dropping updates.
    #[serde(default)]
    pub channel_capacity: Option<usize>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            channel_capacity: None,
        }
    }
}

/// Appearance of terminal bars drawn by the CLI.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DisplayConfig {
    #[serde(default = "default_template")]
    pub template: String,

    #[serde(default = "default_progress_chars")]
    pub progress_chars: String,

    #[serde(default = "default_refresh_hz")]
    pub refresh_hz: u8,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            template: default_template(),
            progress_chars: default_progress_chars(),
            refresh_hz: DEFAULT_REFRESH_HZ,
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_template() -> String {
    DEFAULT_TEMPLATE.to_string()
}

fn default_progress_chars() -> String {
    DEFAULT_PROGRESS_CHARS.to_string()
}

fn default_refresh_hz() -> u8 {
    DEFAULT_REFRESH_HZ
}

/// Load `mpbar.toml` from the given directory.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but cannot be read or parsed.
pub fn load(project_root: &Path) -> Result<Option<MpbarConfig>, ConfigError> {
    let path = project_root.join(CONFIG_FILENAME);
    if !path.exists() {
        return Ok(None);
    }
    load_file(&path).map(Some)
}

/// Load a config file at an explicit path. The file must exist.
pub fn load_file(path: &Path) -> Result<MpbarConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let config = parse(&content)?;
    log::debug!("loaded config from {}", path.display());
    Ok(config)
}

/// Parse and validate config text.
pub fn parse(content: &str) -> Result<MpbarConfig, ConfigError> {
    let config: MpbarConfig =
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &MpbarConfig) -> Result<(), ConfigError> {
    if config.watcher.poll_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "watcher.poll_interval_ms must be greater than 0".to_string(),
        ));
    }
    if config.watcher.channel_capacity == Some(0) {
        return Err(ConfigError::Validation(
            "watcher.channel_capacity must be greater than 0 (omit it for an unbounded channel)"
                .to_string(),
        ));
    }
    if config.display.refresh_hz == 0 {
        return Err(ConfigError::Validation(
            "display.refresh_hz must be greater than 0".to_string(),
        ));
    }
    if config.display.progress_chars.chars().count() < 2 {
        return Err(ConfigError::Validation(
            "display.progress_chars needs at least 2 characters".to_string(),
        ));
    }
    Ok(())
}
