//! Province label positions, from either `map/positions.txt` or the
//! bounding boxes the game writes to `logs/setup.log`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use eu4txt::{Block, Value};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static BOUNDING_BOX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Bounding Box of ([0-9]+) => \(([0-9]+),([0-9]+)\) - \(([0-9]+),([0-9]+)\)")
        .expect("valid regex")
});

#[derive(Debug, Error)]
pub enum PositionError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Parse(eu4txt::Error),
}

impl From<eu4txt::Error> for PositionError {
    fn from(e: eu4txt::Error) -> Self {
        match e {
            eu4txt::Error::Io { path, source } => PositionError::Io { path, source },
            other => PositionError::Parse(other),
        }
    }
}

/// Province id -> map coordinates.
pub type Positions = BTreeMap<u32, (i64, i64)>;

/// Selects how positions are loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSource {
    /// `map/positions.txt`: `text_position`, else `city`.
    #[default]
    DefinitionFile,
    /// `logs/setup.log`: the centre of each province's bounding box.
    SetupLog,
}

impl PositionSource {
    pub fn source_path(self, game_path: &Path) -> PathBuf {
        match self {
            PositionSource::DefinitionFile => game_path.join("map/positions.txt"),
            PositionSource::SetupLog => game_path.join("logs/setup.log"),
        }
    }

    pub fn load(self, game_path: &Path) -> Result<Positions, PositionError> {
        let path = self.source_path(game_path);
        log::debug!("loading positions from {}", path.display());
        match self {
            PositionSource::DefinitionFile => Ok(positions_from_definitions(&eu4txt::read_file(&path)?)),
            PositionSource::SetupLog => {
                Ok(positions_from_setup_log(&eu4txt::read_to_string(&path)?))
            }
        }
    }
}

fn coordinate(block: &Block, axis: &str) -> Option<i64> {
    block
        .scalar(axis)
        .and_then(|s| s.trim().parse::<f64>().ok())
        .map(|v| v.trunc() as i64)
}

/// Reads `id = { text_position = { x = .. y = .. } city = { .. } }` entries.
///
/// Entries without a usable position are logged and skipped.
pub fn positions_from_definitions(block: &Block) -> Positions {
    let mut positions = Positions::new();
    for (key, value) in block.iter() {
        let Ok(id) = key.parse::<u32>() else {
            log::warn!("skipping position entry with non-numeric key '{}'", key);
            continue;
        };
        let entry = value.as_block();
        let pos = entry
            .and_then(|b| b.get("text_position"))
            .or_else(|| entry.and_then(|b| b.get("city")))
            .and_then(Value::as_block)
            .and_then(|p| Some((coordinate(p, "x")?, coordinate(p, "y")?)));
        match pos {
            Some(xy) => {
                positions.insert(id, xy);
            }
            None => log::warn!("province {} lacks text_position and city", id),
        }
    }
    positions
}

/// Scans setup.log lines for bounding boxes and keeps their centres.
pub fn positions_from_setup_log(text: &str) -> Positions {
    let mut positions = Positions::new();
    for caps in BOUNDING_BOX.captures_iter(text) {
        let nums: Option<Vec<i64>> = (1..=5).map(|i| caps[i].parse().ok()).collect();
        let Some(n) = nums else {
            continue;
        };
        let centre = |lo: i64, hi: i64| lo.checked_add(hi).map(|sum| sum / 2);
        let entry = u32::try_from(n[0])
            .ok()
            .and_then(|id| Some((id, (centre(n[1], n[3])?, centre(n[2], n[4])?))));
        match entry {
            Some((id, xy)) => {
                positions.insert(id, xy);
            }
            None => log::warn!("skipping out-of-range bounding box for '{}'", &caps[1]),
        }
    }
    positions
}
