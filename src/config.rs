//! Loader configuration
//!
//! Read from a `gtfs-loader.toml` file, then overridden by environment
//! variables and finally by the command line.

use crate::Error;
use std::path::{Path, PathBuf};

/// Default configuration filename, looked up in the working directory
pub const CONFIG_FILENAME: &str = "gtfs-loader.toml";

/// Default SQLite database file
pub const DEFAULT_DATABASE: &str = "gtfs.sqlite";

/// Default number of rows per statement
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Environment variable for the database path
pub const ENV_DATABASE: &str = "GTFS_LOADER_DATABASE";

/// Environment variable for the number of rows per statement
pub const ENV_BATCH_SIZE: &str = "GTFS_LOADER_BATCH_SIZE";

/// Environment variable to switch foreign key enforcement, `true` or `false`
pub const ENV_FOREIGN_KEYS: &str = "GTFS_LOADER_FOREIGN_KEYS";

/// `[database]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSection {
    /// Path of the SQLite database file
    #[serde(default = "default_database")]
    pub path: PathBuf,

    /// Enforce the foreign keys between GTFS tables
    #[serde(default = "default_foreign_keys")]
    pub foreign_keys: bool,
}

fn default_database() -> PathBuf {
    PathBuf::from(DEFAULT_DATABASE)
}

fn default_foreign_keys() -> bool {
    true
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_database(),
            foreign_keys: default_foreign_keys(),
        }
    }
}

/// `[load]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadSection {
    /// Maximum number of rows in one INSERT statement
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl Default for LoadSection {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

/// Settings of the database and of the load
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Where the feed is loaded
    #[serde(default)]
    pub database: DatabaseSection,

    /// How the feed is loaded
    #[serde(default)]
    pub load: LoadSection,
}

impl LoaderConfig {
    /// Loads the configuration and applies the environment overrides
    ///
    /// An explicit `path` must exist, otherwise [CONFIG_FILENAME] is read if
    /// present in the working directory. The result is not validated: callers
    /// apply their own overrides first, then call [LoaderConfig::validate].
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let mut config = match path {
            Some(p) => Self::read(p)?,
            None => {
                let default_path = Path::new(CONFIG_FILENAME);
                if default_path.exists() {
                    Self::read(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::NamedFileIO {
            file_name: format!("{}", path.display()),
            source: Box::new(e),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Result<Self, Error> {
        toml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))
    }

    /// Serializes the configuration, as printed by `--print-config`
    pub fn to_toml(&self) -> Result<String, Error> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("failed to serialize config: {}", e)))
    }

    /// Applies the `GTFS_LOADER_*` variables given by `var`
    pub fn apply_env_overrides<F>(&mut self, var: F) -> Result<(), Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = var(ENV_DATABASE) {
            self.database.path = PathBuf::from(path);
        }
        if let Some(size) = var(ENV_BATCH_SIZE) {
            self.load.batch_size = size.trim().parse().map_err(|_| {
                Error::Config(format!("{} is not a number: {}", ENV_BATCH_SIZE, size))
            })?;
        }
        if let Some(enabled) = var(ENV_FOREIGN_KEYS) {
            self.database.foreign_keys = enabled.trim().parse().map_err(|_| {
                Error::Config(format!("{} must be true or false: {}", ENV_FOREIGN_KEYS, enabled))
            })?;
        }
        Ok(())
    }

    /// Checks the values once every override is applied
    pub fn validate(&self) -> Result<(), Error> {
        if self.load.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".to_owned()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn defaults() {
        let config = LoaderConfig::parse("").unwrap();
        assert_eq!(LoaderConfig::default(), config);
        assert_eq!(PathBuf::from("gtfs.sqlite"), config.database.path);
        assert!(config.database.foreign_keys);
        assert_eq!(500, config.load.batch_size);
    }

    #[test]
    fn parse_sections() {
        let config = LoaderConfig::parse(
            r#"
[database]
path = "/var/lib/transit/gtfs.db"
foreign_keys = false

[load]
batch_size = 1000
"#,
        )
        .unwrap();
        assert_eq!(PathBuf::from("/var/lib/transit/gtfs.db"), config.database.path);
        assert!(!config.database.foreign_keys);
        assert_eq!(1000, config.load.batch_size);
    }

    #[test]
    fn invalid_toml() {
        assert!(matches!(
            LoaderConfig::parse("[load]\nbatch_size = \"many\""),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_DATABASE, "other.sqlite"),
            (ENV_BATCH_SIZE, "20"),
            (ENV_FOREIGN_KEYS, "false"),
        ]
        .into_iter()
        .collect();
        let mut config = LoaderConfig::default();
        config
            .apply_env_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(PathBuf::from("other.sqlite"), config.database.path);
        assert_eq!(20, config.load.batch_size);
        assert!(!config.database.foreign_keys);

        let result = config.apply_env_overrides(|k| {
            if k == ENV_BATCH_SIZE {
                Some("lots".to_owned())
            } else {
                None
            }
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let config = LoaderConfig::parse("[load]\nbatch_size = 0").unwrap();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn overrides_are_applied_before_validation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "[load]\nbatch_size = 0\n").unwrap();
        let mut config = LoaderConfig::load(Some(&path)).unwrap();
        assert!(config.validate().is_err());
        config.load.batch_size = 100;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn round_trip_through_a_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        let mut config = LoaderConfig::default();
        config.load.batch_size = 42;
        std::fs::write(&path, config.to_toml().unwrap()).unwrap();
        assert_eq!(config, LoaderConfig::read(&path).unwrap());
    }

    #[test]
    fn missing_explicit_file() {
        let dir = tempdir().unwrap();
        let result = LoaderConfig::load(Some(&dir.path().join("absent.toml")));
        assert!(matches!(result, Err(Error::NamedFileIO { .. })));
    }
}
