use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use tracing::{debug, info, warn};

use crate::error::MonitorError;

pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_MAX_HISTORY: usize = 50;
pub const DEFAULT_PLOT_WIDTH: u16 = 100;
pub const DEFAULT_PLOT_HEIGHT: u16 = 20;
pub const DEFAULT_EXCHANGE_SUFFIX: &str = ".WA";

const MIN_REFRESH_INTERVAL_SECS: u64 = 1;
const MIN_MAX_HISTORY: usize = 1;
pub const MIN_PLOT_WIDTH: u16 = 10;
pub const MAX_PLOT_WIDTH: u16 = 1000;
pub const MIN_PLOT_HEIGHT: u16 = 5;
pub const MAX_PLOT_HEIGHT: u16 = 500;

const CONFIG_FILE_NAME: &str = "config.ini";
const SETTINGS_SECTION: &str = "Settings";

/// Runtime settings for a monitoring session.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub refresh_interval: Duration,
    pub max_history: usize,
    pub plot_width: u16,
    pub plot_height: u16,
    pub exchange_suffix: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            max_history: DEFAULT_MAX_HISTORY,
            plot_width: DEFAULT_PLOT_WIDTH,
            plot_height: DEFAULT_PLOT_HEIGHT,
            exchange_suffix: DEFAULT_EXCHANGE_SUFFIX.to_string(),
        }
    }
}

/// A config line that was ignored.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigIssue {
    pub line_no: usize,
    pub reason: String,
}

impl Settings {
    /// Read the `[Settings]` section of an ini file. Lines are `key = value`
    /// or `key: value`; `;` and `#` start comments. Entries that cannot be
    /// used are reported and skipped, missing keys keep their defaults and
    /// out-of-range numbers are clamped.
    pub fn from_ini_str(content: &str) -> (Self, Vec<ConfigIssue>) {
        let mut settings = Settings::default();
        let mut issues = Vec::new();
        let mut in_settings = false;

        for (idx, line) in content.lines().enumerate() {
            let line_no = idx + 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                in_settings = section.trim() == SETTINGS_SECTION;
                continue;
            }
            if !in_settings {
                continue;
            }

            let Some((key, value)) = line.split_once(['=', ':']) else {
                issues.push(ConfigIssue {
                    line_no,
                    reason: format!("expected 'key = value', got '{}'", line),
                });
                continue;
            };

            if let Err(reason) = settings.apply(&key.trim().to_lowercase(), value.trim()) {
                issues.push(ConfigIssue { line_no, reason });
            }
        }

        for issue in &issues {
            warn!(line = issue.line_no, reason = %issue.reason, "skipping config entry");
        }
        (settings, issues)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "refresh_interval" => {
                let secs = bounded(key, parse_int(key, value)?, MIN_REFRESH_INTERVAL_SECS as i64, i64::MAX);
                self.refresh_interval = Duration::from_secs(secs as u64);
            }
            "max_history" => {
                self.max_history = bounded(key, parse_int(key, value)?, MIN_MAX_HISTORY as i64, i64::MAX) as usize;
            }
            "plot_width" => {
                let width = bounded(key, parse_int(key, value)?, MIN_PLOT_WIDTH.into(), MAX_PLOT_WIDTH.into());
                self.plot_width = width as u16;
            }
            "plot_height" => {
                let height = bounded(key, parse_int(key, value)?, MIN_PLOT_HEIGHT.into(), MAX_PLOT_HEIGHT.into());
                self.plot_height = height as u16;
            }
            "exchange_suffix" => {
                let suffix = value.trim_matches(|c: char| c == '"' || c == '\'').trim().to_uppercase();
                if suffix.is_empty() {
                    return Err("exchange_suffix is empty".to_string());
                }
                self.exchange_suffix = suffix;
            }
            _ => debug!(key, "ignoring unknown config key"),
        }
        Ok(())
    }

    /// Load settings from an explicit path, or discover `config.ini` in the
    /// working directory and then in the user config directory.
    ///
    /// An explicitly requested file must be readable. A discovered file that
    /// cannot be read is reported and defaults are used instead.
    pub fn load(explicit: Option<&Path>) -> Result<Self, MonitorError> {
        if let Some(path) = explicit {
            let content = fs::read_to_string(path).map_err(|e| MonitorError::Config {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            let (settings, issues) = Self::from_ini_str(&content);
            info!(path = %path.display(), skipped = issues.len(), "loaded configuration");
            return Ok(settings);
        }

        for path in Self::candidate_paths() {
            if !path.exists() {
                continue;
            }
            return match fs::read_to_string(&path) {
                Ok(content) => {
                    let (settings, issues) = Self::from_ini_str(&content);
                    info!(path = %path.display(), skipped = issues.len(), "loaded configuration");
                    Ok(settings)
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "unreadable config, using defaults");
                    Ok(Settings::default())
                }
            };
        }

        info!("no config file found, using defaults");
        Ok(Settings::default())
    }

    fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("gpw-monitor").join(CONFIG_FILE_NAME));
        }
        paths
    }
}

fn parse_int(key: &str, value: &str) -> Result<i64, String> {
    value
        .parse()
        .map_err(|_| format!("{} must be an integer, got '{}'", key, value))
}

fn bounded(key: &str, value: i64, min: i64, max: i64) -> i64 {
    if value < min {
        warn!(key, value, min, "config value below minimum, clamping");
        min
    } else if value > max {
        warn!(key, value, max, "config value above maximum, clamping");
        max
    } else {
        value
    }
}
