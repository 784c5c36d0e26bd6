//! Configuration loading and path resolution
//!
//! Resolution priority for both the config file and the database path:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing config file is not an error: compiled defaults are used and a
//! warning is logged.

use crate::{Error, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the TOML config file
pub const CONFIG_ENV_VAR: &str = "STAYSYNC_CONFIG";

/// Environment variable naming the SQLite database file
pub const DATABASE_ENV_VAR: &str = "STAYSYNC_DATABASE";

/// Complete TOML configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub engine: EngineConfig,
    pub notifier: NotifierConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file; compiled default when absent
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. "info" or "staysync_recon=debug"
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Reconciliation rules that vary per deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// External booking channels; their reservations are always channel-billed
    pub ota_channels: Vec<String>,
    /// Channel name used by the front desk
    pub walk_in_channel: String,
    /// Reservation numbers scrapers emit when the real one is unavailable
    pub sentinel_reservation_numbers: Vec<String>,
    /// Checkout time applied when upstream gives only a date (HH:MM)
    pub default_checkout_time: String,
    /// Markers of hourly/short stays in room descriptions or names
    pub hourly_stay_markers: Vec<String>,
    /// Register unknown tenants on first ingestion instead of failing
    pub auto_register_tenants: bool,
    pub classifier: ClassifierConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ota_channels: [
                "Yanolja", "GoodHotel", "GoodMotel", "Agoda", "CoolStay", "Booking", "Expedia",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            walk_in_channel: "walk-in".to_string(),
            sentinel_reservation_numbers: vec!["N/A".to_string()],
            default_checkout_time: "11:00".to_string(),
            hourly_stay_markers: vec![
                "대실".to_string(),
                "hourly".to_string(),
                "day use".to_string(),
            ],
            auto_register_tenants: true,
            classifier: ClassifierConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parsed default checkout time
    pub fn checkout_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(self.default_checkout_time.trim(), "%H:%M").map_err(|e| {
            Error::Config(format!(
                "default_checkout_time '{}' is not HH:MM: {}",
                self.default_checkout_time, e
            ))
        })
    }

    pub fn is_ota(&self, channel: &str) -> bool {
        self.ota_channels.iter().any(|c| c == channel)
    }
}

/// Marker lists for the keyword cancellation classifier
///
/// All matching is case-insensitive substring matching. Exempt phrases are
/// removed from every field before markers are checked, so rate labels such
/// as "Non-refundable" do not read as cancellations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub status_keywords: Vec<String>,
    pub name_markers: Vec<String>,
    pub room_markers: Vec<String>,
    pub reservation_no_markers: Vec<String>,
    pub exempt_phrases: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            status_keywords: owned(&["cancel", "취소", "no-show", "noshow", "refund", "환불"]),
            name_markers: owned(&["취소", "[canceled]", "[cancelled]"]),
            room_markers: owned(&["취소", "[canceled]", "[cancelled]"]),
            reservation_no_markers: owned(&["cxl", "cancel"]),
            exempt_phrases: owned(&[
                "non-refundable",
                "non refundable",
                "nonrefundable",
                "no refund",
                "환불불가",
                "환불 불가",
                "non-cancellable",
                "non-cancelable",
                "free cancellation",
                "취소불가",
                "취소 불가",
                "무료취소",
                "무료 취소",
            ]),
        }
    }
}

/// Outbound guest notification settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Messaging API endpoint; notifications are only logged when absent
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub sender_key: Option<String>,
    /// Pre-registered template for new walk-in reservations
    pub template_id: String,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            sender_key: None,
            template_id: "ONSITE_RESERVATION".to_string(),
        }
    }
}

impl TomlConfig {
    /// Parse TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        self.engine.checkout_time()?;

        if self.engine.walk_in_channel.trim().is_empty() {
            return Err(Error::Config("walk_in_channel must not be empty".to_string()));
        }
        if self.engine.is_ota(&self.engine.walk_in_channel) {
            return Err(Error::Config(format!(
                "walk_in_channel '{}' is also listed as an OTA channel",
                self.engine.walk_in_channel
            )));
        }
        Ok(())
    }
}

/// Load configuration following the priority order
///
/// An explicitly named file (CLI or environment) must exist and parse;
/// default locations are optional.
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    if let Some(path) = cli_arg {
        info!("Loading config from command line: {}", path.display());
        return TomlConfig::load(path);
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        let path = PathBuf::from(path);
        info!("Loading config from {}: {}", CONFIG_ENV_VAR, path.display());
        return TomlConfig::load(&path);
    }

    for candidate in default_config_paths() {
        if candidate.exists() {
            info!("Loading config file: {}", candidate.display());
            return TomlConfig::load(&candidate);
        }
    }

    warn!("No config file found, using compiled defaults");
    Ok(TomlConfig::default())
}

/// Resolve the database path following the priority order
pub fn resolve_database_path(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(DATABASE_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.database.path {
        return path.clone();
    }

    default_data_folder().join("staysync.db")
}

/// Config file locations checked in order
fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("staysync").join("config.toml"));
    }
    if cfg!(target_os = "linux") {
        paths.push(PathBuf::from("/etc/staysync/config.toml"));
    }
    paths
}

/// OS-dependent default data folder
fn default_data_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/staysync (or /var/lib/staysync for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("staysync"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/staysync"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("staysync"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/staysync"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("staysync"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\staysync"))
    } else {
        PathBuf::from("./staysync_data")
    }
}
