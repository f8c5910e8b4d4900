//! Configuration loading, root folder resolution and engine settings

use crate::models::MAX_POSITIONS;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "SENSORY_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "sensory.db";

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file (`root_folder` key)
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&Path>, env_var_name: &str) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(root_folder) = config_file_path().and_then(|p| root_folder_from_toml(&p)) {
        return root_folder;
    }

    default_root_folder()
}

/// Read `root_folder` from a TOML config file, if present and well-formed
pub fn root_folder_from_toml(config_path: &Path) -> Option<PathBuf> {
    let content = std::fs::read_to_string(config_path).ok()?;
    match toml::from_str::<toml::Value>(&content) {
        Ok(config) => config
            .get("root_folder")
            .and_then(|v| v.as_str())
            .map(PathBuf::from),
        Err(e) => {
            warn!("Ignoring malformed config file {}: {}", config_path.display(), e);
            None
        }
    }
}

/// Path to the database file for a root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join(DATABASE_FILE)
}

/// User config file first, then the system-wide one on Linux
fn config_file_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("sensory").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/sensory/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("sensory"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\sensory"))
    } else {
        dirs::data_local_dir()
            .map(|d| d.join("sensory"))
            .unwrap_or_else(|| PathBuf::from("./sensory_data"))
    }
}

/// What to do with a JAR rating outside 1..=5
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JarRangePolicy {
    /// Drop the rating with a warning and keep the rest of the submission
    Drop,
    /// Reject the whole submission
    Reject,
}

impl std::str::FromStr for JarRangePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(JarRangePolicy::Drop),
            "reject" => Ok(JarRangePolicy::Reject),
            other => Err(Error::Config(format!("Unknown jar_out_of_range_policy: {other}"))),
        }
    }
}

/// Engine tunables loaded from the settings table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Evaluator rows per randomization table (1..=12)
    pub evaluator_slots: u8,
    /// Upper bound on any single store call
    pub persistence_timeout: Duration,
    pub jar_range_policy: JarRangePolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            evaluator_slots: MAX_POSITIONS,
            persistence_timeout: Duration::from_millis(5000),
            jar_range_policy: JarRangePolicy::Drop,
        }
    }
}

/// Load engine settings from the database, falling back to defaults for
/// missing or unparseable values
pub async fn load_engine_settings(db: &SqlitePool) -> Result<EngineSettings> {
    let defaults = EngineSettings::default();

    let rows = sqlx::query_as::<_, (String, Option<String>)>(
        "SELECT key, value FROM settings WHERE key IN \
         ('evaluator_slots', 'persistence_timeout_ms', 'jar_out_of_range_policy')",
    )
    .fetch_all(db)
    .await?;

    let mut settings = defaults.clone();
    for (key, value) in rows {
        let Some(value) = value else { continue };
        match key.as_str() {
            "evaluator_slots" => match value.parse::<u8>() {
                Ok(slots) => settings.evaluator_slots = slots.clamp(1, MAX_POSITIONS),
                Err(_) => warn!("Invalid evaluator_slots '{}', using {}", value, defaults.evaluator_slots),
            },
            "persistence_timeout_ms" => match value.parse::<u64>() {
                Ok(ms) if ms > 0 => settings.persistence_timeout = Duration::from_millis(ms),
                _ => warn!(
                    "Invalid persistence_timeout_ms '{}', using {} ms",
                    value,
                    defaults.persistence_timeout.as_millis()
                ),
            },
            "jar_out_of_range_policy" => match value.parse::<JarRangePolicy>() {
                Ok(policy) => settings.jar_range_policy = policy,
                Err(e) => warn!("{}, using drop", e),
            },
            _ => {}
        }
    }

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_argument_wins() {
        let cli = PathBuf::from("/srv/panel");
        assert_eq!(resolve_root_folder(Some(&cli), "SENSORY_TEST_UNSET_VAR"), cli);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("drop".parse::<JarRangePolicy>().unwrap(), JarRangePolicy::Drop);
        assert_eq!(" Reject ".parse::<JarRangePolicy>().unwrap(), JarRangePolicy::Reject);
        assert!("ignore".parse::<JarRangePolicy>().is_err());
    }

    #[test]
    fn test_database_path() {
        assert_eq!(
            database_path(Path::new("/data/sensory")),
            PathBuf::from("/data/sensory/sensory.db")
        );
    }
}
