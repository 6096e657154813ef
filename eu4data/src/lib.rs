//! Game data built on top of `eu4txt`: dated province and country
//! histories, grouping tables, ideas and terrain.

pub mod cache;
pub mod config;
pub mod date;
pub mod governments;
pub mod groups;
pub mod history;
pub mod ideas;
pub mod loader;
pub mod map;
pub mod path;
pub mod positions;
pub mod terrain;

// Re-export common types
pub use config::{ConfigError, DataConfig, TerrainConfig};
pub use date::{Date, SnapshotDate};
pub use history::{
    Countries, EntityCode, Field, HistoryError, ProvinceId, Provinces, Registry, Snapshot, Tag,
    TimedEntity,
};
pub use loader::{GameData, LoadError, LoadReport};
pub use positions::PositionSource;
