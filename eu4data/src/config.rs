use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::date::Date;
use crate::positions::PositionSource;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("default_date must come after {}", Date::BEGINNING)]
    DefaultDateAtBeginning,
}

/// Data loading configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Date used when a caller asks for "the starting snapshot".
    pub default_date: Date,
    /// Abort a batch load on the first bad file instead of skipping it.
    pub fail_fast: bool,
    /// Where province label positions come from.
    pub position_source: PositionSource,
    pub terrain: TerrainConfig,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            default_date: Date::GAME_START,
            fail_fast: false,
            position_source: PositionSource::default(),
            terrain: TerrainConfig::default(),
        }
    }
}

impl DataConfig {
    /// Reads a JSON config. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_date <= Date::BEGINNING {
            return Err(ConfigError::DefaultDateAtBeginning);
        }
        Ok(())
    }
}

/// Terrain classification settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    /// Bitmap codes never counted in the majority vote (water, wasteland and the like).
    pub ignored_codes: BTreeSet<u8>,
    /// Overrides applied on top of those declared in `terrain.txt`.
    pub extra_overrides: BTreeMap<u32, String>,
    /// Province -> terrain pairs the final classification must reproduce.
    pub fixtures: BTreeMap<u32, String>,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            ignored_codes: [5, 8, 10, 11, 12, 13, 14, 15, 17, 18].into_iter().collect(),
            // Zurich
            extra_overrides: [(1869, "hills")]
                .into_iter()
                .map(|(id, t)| (id, t.to_string()))
                .collect(),
            fixtures: [
                (1983, "coastline"),  // Lolland
                (253, "coastline"),   // Western Isles
                (212, "grasslands"),  // Girona
                (1869, "hills"),      // Zurich
                (205, "mountain"),    // Savoie
                (142, "coastline"),   // Corfu
            ]
            .into_iter()
            .map(|(id, t)| (id, t.to_string()))
            .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = DataConfig::default();
        assert_eq!(config.default_date, Date::new(1444, 11, 11));
        assert!(!config.fail_fast);
        assert_eq!(config.position_source, PositionSource::DefinitionFile);
        assert!(config.terrain.ignored_codes.contains(&17));
        assert_eq!(config.terrain.extra_overrides[&1869], "hills");
        assert_eq!(config.terrain.fixtures.len(), 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "default_date": "1399.10.14", "position_source": "setup_log", "terrain": { "fixtures": {} } }"#,
        )
        .unwrap();

        let config = DataConfig::from_json_file(&path).unwrap();
        assert_eq!(config.default_date, Date::new(1399, 10, 14));
        assert_eq!(config.position_source, PositionSource::SetupLog);
        assert!(config.terrain.fixtures.is_empty());
        assert_eq!(config.terrain.ignored_codes.len(), 10);
    }

    #[test]
    fn test_json_round_trip() {
        let config = DataConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: DataConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_rejects_beginning_of_time() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "default_date": "1.1.1" }"#).unwrap();
        assert!(matches!(
            DataConfig::from_json_file(&path),
            Err(ConfigError::DefaultDateAtBeginning)
        ));
    }

    #[test]
    fn test_bad_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            DataConfig::from_json_file(&path),
            Err(ConfigError::Json { .. })
        ));
        assert!(matches!(
            DataConfig::from_json_file(&dir.path().join("missing.json")),
            Err(ConfigError::Io { .. })
        ));
    }
}
