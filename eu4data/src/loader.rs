//! Batch loading of game directories into an explicit [`GameData`] repository.

use std::path::{Path, PathBuf};

use eu4txt::Block;
use rayon::prelude::*;
use thiserror::Error;

use crate::config::DataConfig;
use crate::date::SnapshotDate;
use crate::governments::{self, Governments};
use crate::groups::{self, GroupIndex};
use crate::history::{
    Countries, EntityCode, HistoryError, ProvinceId, Provinces, Registry, Snapshot, Tag,
    TimedEntity, split_file_name, title_case,
};
use crate::ideas::{self, CustomIdeas, IdeaError, IdeaGroup, NationalIdeas, TriggerContext};
use crate::positions::{PositionError, Positions};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("game directory {} does not exist", .path.display())]
    MissingGameDir { path: PathBuf },
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: eu4txt::Error,
    },
    #[error("{}: {source}", .path.display())]
    History {
        path: PathBuf,
        #[source]
        source: HistoryError,
    },
    #[error("{}: {source}", .path.display())]
    Ideas {
        path: PathBuf,
        #[source]
        source: IdeaError,
    },
    #[error(transparent)]
    Positions(#[from] PositionError),
}

/// Outcome of a batch load that skips bad files.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: usize,
    pub failures: Vec<LoadError>,
}

impl LoadReport {
    /// Records a per-file failure, or returns it when `fail_fast` is set.
    pub(crate) fn record(&mut self, err: LoadError, fail_fast: bool) -> Result<(), LoadError> {
        if fail_fast {
            return Err(err);
        }
        log::warn!("skipping: {}", err);
        self.failures.push(err);
        Ok(())
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn absorb(&mut self, other: LoadReport) {
        self.loaded += other.loaded;
        self.failures.extend(other.failures);
    }
}

/// Lists the `.txt` files of a directory in sorted order. A missing
/// directory yields no files.
pub(crate) fn txt_files(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    if !dir.is_dir() {
        log::debug!("{} not found, nothing to load", dir.display());
        return Ok(Vec::new());
    }
    let io_err = |source| LoadError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.extension().is_some_and(|ext| ext == "txt") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Parses every `.txt` file of a directory in parallel.
///
/// Files that fail to parse are recorded in `report` (or abort the load when
/// `fail_fast` is set). The result keeps sorted path order.
pub(crate) fn parse_dir(
    dir: &Path,
    fail_fast: bool,
    report: &mut LoadReport,
) -> Result<Vec<(PathBuf, Block)>, LoadError> {
    let paths = txt_files(dir)?;
    let parsed: Vec<_> = paths
        .into_par_iter()
        .map(|path| {
            let result = eu4txt::read_file(&path);
            (path, result)
        })
        .collect();

    let mut blocks = Vec::with_capacity(parsed.len());
    for (path, result) in parsed {
        match result {
            Ok(block) => {
                report.loaded += 1;
                blocks.push((path, block));
            }
            Err(source) => report.record(LoadError::Parse { path, source }, fail_fast)?,
        }
    }
    Ok(blocks)
}

fn build_entity<K: EntityCode>(path: &Path, config: &DataConfig) -> Result<(K, TimedEntity), LoadError> {
    let history_err = |source| LoadError::History {
        path: path.to_path_buf(),
        source,
    };
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    let (raw_code, name) = split_file_name(&file_name);
    let code = K::parse_code(&raw_code).map_err(history_err)?;
    let block = eu4txt::read_file(path).map_err(|source| LoadError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    let entity = TimedEntity::build(block, title_case(&name), code.to_string(), config.default_date)
        .map_err(history_err)?;
    Ok((code, entity))
}

/// Loads every history file under `K::DIRECTORY`.
///
/// Files are parsed in parallel and inserted in sorted path order. A code
/// defined by two files is always fatal; other per-file failures are skipped
/// unless `config.fail_fast` is set.
pub fn load_registry<K: EntityCode>(
    game_path: &Path,
    config: &DataConfig,
) -> Result<(Registry<K>, LoadReport), LoadError> {
    let dir = game_path.join(K::DIRECTORY);
    let paths = txt_files(&dir)?;
    let built: Vec<_> = paths
        .into_par_iter()
        .map(|path| {
            let result = build_entity::<K>(&path, config);
            (path, result)
        })
        .collect();

    let mut registry = Registry::new();
    let mut report = LoadReport::default();
    for (path, result) in built {
        match result {
            Ok((code, entity)) => {
                registry
                    .insert(code, entity)
                    .map_err(|source| LoadError::History { path, source })?;
                report.loaded += 1;
            }
            Err(err) => report.record(err, config.fail_fast)?,
        }
    }
    log::info!(
        "loaded {} {} histories ({} failed)",
        report.loaded,
        K::KIND,
        report.failed()
    );
    Ok((registry, report))
}

pub fn load_provinces(
    game_path: &Path,
    config: &DataConfig,
) -> Result<(Provinces, LoadReport), LoadError> {
    load_registry(game_path, config)
}

pub fn load_countries(
    game_path: &Path,
    config: &DataConfig,
) -> Result<(Countries, LoadReport), LoadError> {
    load_registry(game_path, config)
}

/// Everything loaded from one game directory.
#[derive(Debug)]
pub struct GameData {
    pub provinces: Provinces,
    pub countries: Countries,
    pub cultures: GroupIndex,
    pub religions: GroupIndex,
    pub governments: Governments,
    pub custom_ideas: CustomIdeas,
    pub national_ideas: NationalIdeas,
    pub positions: Positions,
    pub report: LoadReport,
    config: DataConfig,
}

impl GameData {
    /// Loads all supported data. Missing directories yield empty collections.
    pub fn load(game_path: &Path, config: &DataConfig) -> Result<Self, LoadError> {
        if !game_path.is_dir() {
            return Err(LoadError::MissingGameDir {
                path: game_path.to_path_buf(),
            });
        }
        log::info!("loading game data from {}", game_path.display());
        let fail_fast = config.fail_fast;

        let (provinces, mut report) = load_provinces(game_path, config)?;
        let (countries, country_report) = load_countries(game_path, config)?;
        report.absorb(country_report);

        let cultures = groups::load_culture_groups(game_path, fail_fast, &mut report)?;
        let religions = groups::load_religion_groups(game_path, fail_fast, &mut report)?;
        let governments = governments::load_governments(game_path, fail_fast, &mut report)?;
        let custom_ideas = ideas::load_custom_ideas(game_path, fail_fast, &mut report)?;
        let national_ideas = ideas::load_national_ideas(game_path, fail_fast, &mut report)?;

        let positions = match config.position_source.load(game_path) {
            Ok(positions) => positions,
            Err(PositionError::Io { path, .. }) if !path.exists() => {
                log::debug!("no position data at {}", path.display());
                Positions::new()
            }
            Err(err) => {
                report.record(err.into(), fail_fast)?;
                Positions::new()
            }
        };

        log::info!(
            "loaded {} provinces, {} countries, {} idea groups",
            provinces.len(),
            countries.len(),
            national_ideas.len()
        );

        Ok(Self {
            provinces,
            countries,
            cultures,
            religions,
            governments,
            custom_ideas,
            national_ideas,
            positions,
            report,
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &DataConfig {
        &self.config
    }

    /// Snapshots of the provinces whose `owner` is `tag` at the given date.
    pub fn owned_provinces(
        &self,
        tag: &Tag,
        when: SnapshotDate,
    ) -> Result<Vec<(ProvinceId, Snapshot)>, HistoryError> {
        let mut owned = Vec::new();
        for (id, province) in self.provinces.iter() {
            let snapshot = province.at(when)?;
            let is_owner = snapshot
                .get("owner")
                .and_then(|f| f.as_scalar())
                .is_some_and(|owner| owner.eq_ignore_ascii_case(tag.as_str()));
            if is_owner {
                owned.push((*id, snapshot));
            }
        }
        Ok(owned)
    }

    /// The national ideas a country starts with: its own group, else the
    /// first group whose trigger matches its starting snapshot.
    pub fn ideas_for_tag(&self, tag: &str) -> Result<Option<&IdeaGroup>, HistoryError> {
        let (code, country) = self.countries.resolve(tag)?;
        let snapshot = country.start()?;
        let context = TriggerContext {
            tag: code.as_str(),
            country: &snapshot,
            cultures: &self.cultures,
            religions: &self.religions,
            governments: &self.governments,
        };
        Ok(self.national_ideas.for_tag(&context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut file = fs::File::create(path).unwrap();
        write!(file, "{}", contents).unwrap();
    }

    #[test]
    fn test_load_provinces() {
        let dir = tempdir().unwrap();

        // 1. Valid file
        write(
            dir.path(),
            "history/provinces/1 - Stockholm.txt",
            r#"
            trade_goods = grain
            owner = SWE
            base_tax = 10
            add_core = SWE
            1521.1.1 = { owner = DAN }
            "#,
        );
        // 2. File with irregular name
        write(dir.path(), "history/provinces/2-Svealand.txt", "owner = SWE");
        // 3. Broken file (non-parsable ID)
        write(dir.path(), "history/provinces/invalid_name.txt", "");
        // 4. Broken file (bad syntax)
        write(
            dir.path(),
            "history/provinces/3 - Kalmar.txt",
            "this is not legitimate eu4 script",
        );
        // 5. Not a text file
        write(dir.path(), "history/provinces/4 - Notes.md", "owner = SWE");

        let (provinces, report) = load_provinces(dir.path(), &DataConfig::default()).unwrap();
        assert_eq!(report.loaded, 2);
        assert_eq!(report.failed(), 2);
        assert!(report.failures.iter().any(|e| matches!(
            e,
            LoadError::History {
                source: HistoryError::InvalidCode { .. },
                ..
            }
        )));
        assert!(report.failures.iter().any(|e| matches!(e, LoadError::Parse { .. })));

        let stockholm = provinces.lookup("Stockholm").unwrap();
        assert_eq!(stockholm.code(), "1");
        let start = stockholm.start().unwrap();
        assert_eq!(start["owner"].as_scalar(), Some("SWE"));
        let later = stockholm.at_str("1521.1.1").unwrap();
        assert_eq!(later["owner"].as_scalar(), Some("DAN"));
        assert_eq!(start["base_tax"].as_number(), Some(10.0));
        assert_eq!(provinces.lookup("2").unwrap().name(), "Svealand");
    }

    #[test]
    fn test_fail_fast() {
        let dir = tempdir().unwrap();
        write(dir.path(), "history/provinces/1 - A.txt", "owner = SWE");
        write(dir.path(), "history/provinces/2 - B.txt", "owner = {");
        let config = DataConfig {
            fail_fast: true,
            ..DataConfig::default()
        };
        assert!(matches!(
            load_provinces(dir.path(), &config),
            Err(LoadError::Parse { .. })
        ));
    }

    #[test]
    fn test_duplicate_codes_are_fatal() {
        let dir = tempdir().unwrap();
        write(dir.path(), "history/countries/SWE - Sweden.txt", "government = monarchy");
        write(dir.path(), "history/countries/swe - Svea.txt", "government = monarchy");
        let err = load_countries(dir.path(), &DataConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            LoadError::History {
                source: HistoryError::DuplicateCode { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_country_names_and_codes() {
        let dir = tempdir().unwrap();
        write(dir.path(), "history/countries/swe - sweden.txt", "capital = 1");
        let (countries, _) = load_countries(dir.path(), &DataConfig::default()).unwrap();
        let sweden = countries.lookup("SWE").unwrap();
        assert_eq!(sweden.name(), "Sweden");
        assert_eq!(sweden.base()["code"].as_scalar(), Some("SWE"));
        assert_eq!(countries.lookup("sweden").unwrap(), sweden);
    }

    #[test]
    fn test_missing_game_dir() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            GameData::load(&missing, &DataConfig::default()),
            Err(LoadError::MissingGameDir { .. })
        ));
    }

    fn fake_game() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(
            root,
            "history/provinces/1 - Stockholm.txt",
            "owner = SWE\nbase_tax = 5\n1521.1.1 = { owner = DAN }",
        );
        write(root, "history/provinces/2 - Uppsala.txt", "owner = SWE\nbase_tax = 3");
        write(root, "history/provinces/6 - Skane.txt", "owner = DAN\nbase_tax = 4");
        write(
            root,
            "history/countries/SWE - Sweden.txt",
            "government = feudal_monarchy\nprimary_culture = swedish\nreligion = catholic\ntechnology_group = western",
        );
        write(
            root,
            "history/countries/NOR - Norway.txt",
            "government = feudal_monarchy\nprimary_culture = norwegian\nreligion = catholic\ntechnology_group = western",
        );
        write(
            root,
            "common/cultures/00_cultures.txt",
            "scandinavian = { swedish = { } norwegian = { } }",
        );
        write(
            root,
            "common/religions/00_religion.txt",
            "christian = { catholic = { icon = 1 } }",
        );
        write(
            root,
            "common/governments/00_governments.txt",
            "feudal_monarchy = { monarchy = yes }\ntheocratic_government = { religion = yes }",
        );
        write(
            root,
            "common/ideas/00_country_ideas.txt",
            r#"
            SWE_ideas = {
                start = { land_morale = 0.1 }
                bonus = { discipline = 0.05 }
                trigger = { tag = SWE }
                free = yes
                swe_one = { infantry_power = 0.1 }
            }
            scandinavian_ideas = {
                start = { land_morale = 0.1 }
                bonus = { discipline = 0.05 }
                trigger = { culture_group = scandinavian }
                free = yes
                scan_one = { infantry_power = 0.1 }
            }
            "#,
        );
        write(root, "map/positions.txt", "1 = { city = { x = 10 y = 20 } }");
        dir
    }

    #[test]
    fn test_game_data_load() {
        let dir = fake_game();
        let data = GameData::load(dir.path(), &DataConfig::default()).unwrap();
        assert_eq!(data.provinces.len(), 3);
        assert_eq!(data.countries.len(), 2);
        assert_eq!(data.cultures.group_of("swedish"), Some("scandinavian"));
        assert_eq!(data.religions.group_of("catholic"), Some("christian"));
        assert!(data.governments.is_monarchy("feudal_monarchy"));
        assert_eq!(data.national_ideas.len(), 2);
        assert_eq!(data.positions[&1], (10, 20));
        assert!(data.report.failures.is_empty());
    }

    #[test]
    fn test_owned_provinces() {
        let dir = fake_game();
        let data = GameData::load(dir.path(), &DataConfig::default()).unwrap();
        let swe = Tag::parse_code("SWE").unwrap();

        let at_start: Vec<_> = data
            .owned_provinces(&swe, SnapshotDate::Start)
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(at_start, vec![ProvinceId(1), ProvinceId(2)]);

        let later: Vec<_> = data
            .owned_provinces(&swe, SnapshotDate::parse("1530.1.1").unwrap())
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(later, vec![ProvinceId(2)]);
    }

    #[test]
    fn test_ideas_for_tag() {
        let dir = fake_game();
        let data = GameData::load(dir.path(), &DataConfig::default()).unwrap();
        assert_eq!(data.ideas_for_tag("swe").unwrap().unwrap().key, "swe");
        assert_eq!(
            data.ideas_for_tag("NOR").unwrap().unwrap().key,
            "scandinavian"
        );
        assert!(data.ideas_for_tag("XXX").is_err());
    }
}
