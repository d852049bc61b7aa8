//! Settings loader with file resolution and environment override support.

use directories::ProjectDirs;
use std::path::{Path, PathBuf};

use super::error::{StoreError, StoreResult};
use super::schema::Settings;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "SERIALBOWL";

/// Settings file name
const CONFIG_FILE_NAME: &str = "serialbowl.toml";

/// Environment variable for explicit settings path
const CONFIG_PATH_ENV: &str = "SERIALBOWL_CONFIG";

/// Settings loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved settings file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded settings
    pub settings: Settings,
}

impl ConfigLoader {
    /// Load settings using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `SERIALBOWL_CONFIG` environment variable (explicit path)
    /// 2. `./serialbowl.toml` (current directory)
    /// 3. the platform config directory (`~/.config/serialbowl/` on Linux)
    /// 4. Built-in defaults (no file required)
    pub fn load() -> StoreResult<Self> {
        let config_path = resolve_config_path();

        let mut settings = match config_path {
            Some(ref path) => load_from_file(path)?,
            None => Settings::default(),
        };
        apply_env_overrides(&mut settings)?;

        Ok(Self {
            config_path,
            settings,
        })
    }

    /// Load settings from a specific file path. A missing file yields
    /// defaults; the path is kept so a later save creates it.
    pub fn load_from(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut settings = if path.exists() {
            load_from_file(&path)?
        } else {
            Settings::default()
        };
        apply_env_overrides(&mut settings)?;

        Ok(Self {
            config_path: Some(path),
            settings,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn into_settings(self) -> Settings {
        self.settings
    }

    /// Save the current settings to the resolved file, or to the default
    /// location if nothing was resolved.
    pub fn save(&self) -> StoreResult<()> {
        let path = self
            .config_path
            .clone()
            .or_else(get_default_config_path)
            .ok_or_else(|| StoreError::NoLocation(PathBuf::from(CONFIG_FILE_NAME)))?;

        save_to_file(&self.settings, &path)
    }
}

/// Resolve the settings file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    get_default_config_path().filter(|p| p.exists())
}

/// Platform config directory for this application.
pub fn get_default_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "serialbowl").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Default settings file path for creating new settings files.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_default_config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

pub(crate) fn load_from_file(path: &Path) -> StoreResult<Settings> {
    let content = std::fs::read_to_string(path).map_err(|e| StoreError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(StoreError::Malformed)
}

pub(crate) fn save_to_file(settings: &Settings, path: &Path) -> StoreResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::Write {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let content = toml::to_string_pretty(settings)?;
    std::fs::write(path, content).map_err(|e| StoreError::Write {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Apply `SERIALBOWL_*` environment overrides.
fn apply_env_overrides(settings: &mut Settings) -> StoreResult<()> {
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_PORT")) {
        settings.connection.port = val;
    }
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_BAUD_RATE")) {
        settings.connection.baud_rate = val.parse().map_err(|_| {
            StoreError::bad_override(format!("{ENV_PREFIX}_BAUD_RATE"), "not a baud rate")
        })?;
    }
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_LOG_LEVEL")) {
        settings.logging.level = val;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("serialbowl.toml");

        let loader = ConfigLoader::load_from(&path).unwrap();
        assert_eq!(loader.settings().connection.baud_rate, 9600);
        assert_eq!(loader.config_path.as_deref(), Some(path.as_path()));
        assert!(!path.exists());
    }

    #[test]
    #[serial]
    fn test_env_override() {
        env::set_var("SERIALBOWL_PORT", "/dev/ttyACM3");
        env::set_var("SERIALBOWL_BAUD_RATE", "57600");

        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::load_from(dir.path().join("serialbowl.toml")).unwrap();
        assert_eq!(loader.settings().connection.port, "/dev/ttyACM3");
        assert_eq!(loader.settings().connection.baud_rate, 57600);

        env::remove_var("SERIALBOWL_PORT");
        env::remove_var("SERIALBOWL_BAUD_RATE");
    }

    #[test]
    #[serial]
    fn test_bad_env_override_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        env::set_var("SERIALBOWL_BAUD_RATE", "lots");

        let result = ConfigLoader::load_from(dir.path().join("serialbowl.toml"));
        env::remove_var("SERIALBOWL_BAUD_RATE");

        assert!(matches!(result, Err(StoreError::BadOverride { .. })));
    }

    #[test]
    #[serial]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("serialbowl.toml");

        let mut loader = ConfigLoader::load_from(&path).unwrap();
        loader.settings.connection.port = "COM7".into();
        loader.save().unwrap();

        let reloaded = ConfigLoader::load_from(&path).unwrap();
        assert_eq!(reloaded.settings().connection.port, "COM7");
    }
}
