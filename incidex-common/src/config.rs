//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "INCIDEX_ROOT_FOLDER";

/// Environment variable pointing at the config file
pub const CONFIG_PATH_ENV: &str = "INCIDEX_CONFIG";

/// Bootstrap configuration loaded from `config.toml`
///
/// Every field has a default, so an absent or partial file still yields a usable config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Folder holding the document and overrides (relative storage paths resolve against it)
    pub root_folder: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub kpi: KpiConfig,
    /// Sources in enumeration order; later sources win same-run field conflicts
    pub sources: Vec<SourceConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Where the consolidated document and overrides live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub document: PathBuf,
    pub overrides: PathBuf,
    /// Fail instead of starting from an empty document when the stored one is unreadable
    pub strict_load: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            document: PathBuf::from("incidents.json"),
            overrides: PathBuf::from("overrides.json"),
            strict_load: false,
        }
    }
}

/// KPI thresholds
///
/// Signed on purpose: negative values are tolerated and disable the matching metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KpiConfig {
    /// Trailing window for period-scoped metrics
    pub period_days: i64,
    /// Client count at or above which an incident is a master incident
    pub master_threshold_clients: i64,
    /// Days without update after which an active incident is stale
    pub stale_days_threshold: i64,
}

impl Default for KpiConfig {
    fn default() -> Self {
        Self {
            period_days: 30,
            master_threshold_clients: 5,
            stale_days_threshold: 15,
        }
    }
}

/// Supported source file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Json,
    Csv,
}

/// One configured incident source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    pub kind: SourceKind,
    pub path: PathBuf,
}

impl TomlConfig {
    /// Resolve a configured path against the root folder
    pub fn resolve_path(root_folder: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            root_folder.join(path)
        }
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for source in &self.sources {
            if source.id.trim().is_empty() {
                return Err(Error::Config(format!(
                    "Source with path {} has an empty id",
                    source.path.display()
                )));
            }
            if !seen.insert(source.id.as_str()) {
                return Err(Error::Config(format!("Duplicate source id '{}'", source.id)));
            }
        }
        Ok(())
    }
}

/// Locate the config file:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. User config directory (`~/.config/incidex/config.toml`)
/// 4. System config (`/etc/incidex/config.toml`, Linux only)
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(path));
    }

    if let Some(path) = user_config_path() {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/incidex/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Per-user config file location (`<config dir>/incidex/config.toml`)
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("incidex").join("config.toml"))
}

/// Load the TOML config
///
/// A missing file is not fatal: a warning is logged and defaults are used. A file that exists
/// but does not parse is a configuration error.
pub fn load_toml_config(path: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = path else {
        warn!("No config file found, using built-in defaults");
        return Ok(TomlConfig::default());
    };

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Config file {} not found, using built-in defaults", path.display());
            return Ok(TomlConfig::default());
        }
        Err(e) => {
            return Err(Error::Config(format!("Read {} failed: {}", path.display(), e)));
        }
    };

    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
    config.validate()?;

    info!(
        path = %path.display(),
        sources = config.sources.len(),
        "Loaded configuration"
    );
    Ok(config)
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_root: Option<&Path>,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = toml_root {
        return path.to_path_buf();
    }

    default_root_folder()
}

/// Per-user data folder (`<local data dir>/incidex`), or `./incidex_data` when the platform
/// reports none
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::data_dir)
        .map(|base| base.join("incidex"))
        .unwrap_or_else(|| PathBuf::from("incidex_data"))
}

/// Write config atomically (temp file + rename), permissions 0600 on Unix
pub fn write_toml_config(config: &TomlConfig, target: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Serialization(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp_path = target.with_extension("toml.tmp");
    {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o600))?;
    }

    if let Err(e) = fs::rename(&temp_path, target) {
        let _ = fs::remove_file(&temp_path);
        return Err(Error::Io(e));
    }

    Ok(())
}
