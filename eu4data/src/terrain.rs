//! Province terrain by majority vote over the terrain bitmap.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use eu4txt::{Block, Value};
use thiserror::Error;

use crate::cache::{Cache, CacheError};
use crate::config::TerrainConfig;
use crate::map::ProvinceColors;

/// Province id -> terrain category.
pub type TerrainMap = BTreeMap<u32, String>;

#[derive(Debug, Error)]
pub enum TerrainError {
    #[error("failed to read {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error(transparent)]
    Parse(#[from] eu4txt::Error),
    #[error("pixel grid is {width}x{height} but has {provinces} province and {terrain} terrain pixels")]
    SizeMismatch {
        width: u32,
        height: u32,
        provinces: usize,
        terrain: usize,
    },
    #[error("province {province} should be {expected}, classified as {}", .found.as_deref().unwrap_or("nothing"))]
    FixtureMismatch {
        province: u32,
        expected: String,
        found: Option<String>,
    },
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// What `map/terrain.txt` declares.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TerrainDefinitions {
    /// Terrain bitmap palette index -> category.
    pub color_map: BTreeMap<u8, String>,
    /// Provinces whose category is fixed regardless of their pixels.
    pub overrides: BTreeMap<u32, String>,
}

impl TerrainDefinitions {
    /// Reads `terrain = { name = { type = T color = { idx } } }` and each
    /// category's `terrain_override`, then applies `extra_overrides`.
    pub fn from_block(block: &Block, extra_overrides: &BTreeMap<u32, String>) -> Self {
        let mut definitions = Self::default();

        for (name, def) in block.get("terrain").and_then(Value::as_block).into_iter().flatten() {
            let def = def.as_block();
            let category = def.and_then(|d| d.scalar("type"));
            let index = def
                .and_then(|d| d.get("color"))
                .and_then(|c| c.members().next())
                .and_then(Value::as_scalar)
                .and_then(|c| c.trim().parse::<u8>().ok());
            match (index, category) {
                (Some(index), Some(category)) => {
                    definitions.color_map.insert(index, category.to_string());
                }
                _ => log::debug!("terrain '{}' has no usable type and colour", name),
            }
        }

        let categories = block.get("categories").and_then(Value::as_block);
        for (category, body) in categories.into_iter().flatten() {
            let Some(ids) = body.get("terrain_override") else {
                continue;
            };
            for id in ids.members().filter_map(Value::as_scalar) {
                match id.trim().parse::<u32>() {
                    Ok(id) => {
                        definitions.overrides.insert(id, category.to_string());
                    }
                    Err(_) => log::warn!("{}: bad terrain_override entry '{}'", category, id),
                }
            }
        }

        for (id, category) in extra_overrides {
            definitions.overrides.insert(*id, category.clone());
        }
        definitions
    }
}

pub fn load_terrain_definitions(
    path: &Path,
    config: &TerrainConfig,
) -> Result<TerrainDefinitions, TerrainError> {
    let block = eu4txt::read_file(path)?;
    let definitions = TerrainDefinitions::from_block(&block, &config.extra_overrides);
    log::info!(
        "loaded {} terrain colours and {} overrides",
        definitions.color_map.len(),
        definitions.overrides.len()
    );
    Ok(definitions)
}

/// The two bitmaps terrain classification samples, pixel for pixel.
pub trait PixelSource {
    /// `(width, height)`.
    fn dimensions(&self) -> (u32, u32);
    /// Colour of the pixel in the province bitmap.
    fn province_color(&self, x: u32, y: u32) -> [u8; 3];
    /// Palette index of the pixel in the terrain bitmap.
    fn terrain_code(&self, x: u32, y: u32) -> u8;
}

/// Both bitmaps held in memory, row-major.
#[derive(Debug, Clone)]
pub struct PixelGrid {
    width: u32,
    height: u32,
    provinces: Vec<[u8; 3]>,
    terrain: Vec<u8>,
}

impl PixelGrid {
    pub fn new(
        width: u32,
        height: u32,
        provinces: Vec<[u8; 3]>,
        terrain: Vec<u8>,
    ) -> Result<Self, TerrainError> {
        let expected = width as usize * height as usize;
        if provinces.len() != expected || terrain.len() != expected {
            return Err(TerrainError::SizeMismatch {
                width,
                height,
                provinces: provinces.len(),
                terrain: terrain.len(),
            });
        }
        Ok(Self {
            width,
            height,
            provinces,
            terrain,
        })
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

impl PixelSource for PixelGrid {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn province_color(&self, x: u32, y: u32) -> [u8; 3] {
        self.provinces[self.index(x, y)]
    }

    fn terrain_code(&self, x: u32, y: u32) -> u8 {
        self.terrain[self.index(x, y)]
    }
}

/// Pixel counts for one province, remembering the first category to reach
/// the highest count.
#[derive(Default)]
struct Tally<'a> {
    counts: HashMap<&'a str, usize>,
    best: Option<(&'a str, usize)>,
}

impl<'a> Tally<'a> {
    fn add(&mut self, category: &'a str) {
        let count = self.counts.entry(category).or_default();
        *count += 1;
        if self.best.is_none_or(|(_, best)| *count > best) {
            self.best = Some((category, *count));
        }
    }
}

/// Majority terrain of every province without an override.
///
/// Pixels are scanned column by column. Ignored codes, override provinces,
/// unknown province colours and unknown terrain codes don't vote.
pub fn classify(
    source: &impl PixelSource,
    colors: &ProvinceColors,
    terrain: &TerrainDefinitions,
    config: &TerrainConfig,
) -> TerrainMap {
    let (width, height) = source.dimensions();
    let mut tallies: BTreeMap<u32, Tally<'_>> = BTreeMap::new();
    let mut unknown_colors = BTreeSet::new();
    let mut unknown_codes = BTreeSet::new();

    for x in 0..width {
        for y in 0..height {
            let color = source.province_color(x, y);
            let Some(&province) = colors.get(&color) else {
                unknown_colors.insert(color);
                continue;
            };
            if terrain.overrides.contains_key(&province) {
                continue;
            }
            let code = source.terrain_code(x, y);
            if config.ignored_codes.contains(&code) {
                continue;
            }
            let Some(category) = terrain.color_map.get(&code) else {
                unknown_codes.insert(code);
                continue;
            };
            tallies.entry(province).or_default().add(category);
        }
    }

    if !unknown_colors.is_empty() {
        log::debug!("{} province colours not in definitions", unknown_colors.len());
    }
    if !unknown_codes.is_empty() {
        log::debug!("terrain codes without a category: {:?}", unknown_codes);
    }

    tallies
        .into_iter()
        .filter_map(|(province, tally)| {
            tally
                .best
                .map(|(category, _)| (province, category.to_string()))
        })
        .collect()
}

/// Sampled terrain with the overrides applied on top.
pub fn province_terrain(
    source: &impl PixelSource,
    colors: &ProvinceColors,
    terrain: &TerrainDefinitions,
    config: &TerrainConfig,
) -> TerrainMap {
    let mut map = classify(source, colors, terrain, config);
    for (province, category) in &terrain.overrides {
        map.insert(*province, category.clone());
    }
    log::info!("classified terrain for {} provinces", map.len());
    map
}

/// Checks that every fixture province has its expected terrain.
pub fn verify_fixtures(
    map: &TerrainMap,
    fixtures: &BTreeMap<u32, String>,
) -> Result<(), TerrainError> {
    for (province, expected) in fixtures {
        let found = map.get(province);
        if found != Some(expected) {
            return Err(TerrainError::FixtureMismatch {
                province: *province,
                expected: expected.clone(),
                found: found.cloned(),
            });
        }
    }
    Ok(())
}

/// [`province_terrain`] through a cache keyed on the input files, then
/// checked against the configured fixtures.
pub fn classify_cached(
    cache: &impl Cache,
    source_files: &[PathBuf],
    source: &impl PixelSource,
    colors: &ProvinceColors,
    terrain: &TerrainDefinitions,
    config: &TerrainConfig,
) -> Result<TerrainMap, TerrainError> {
    let map = cache.get_or_compute("province_terrain", source_files, || {
        province_terrain(source, colors, terrain, config)
    })?;
    verify_fixtures(&map, &config.fixtures)?;
    Ok(map)
}
