//! Government types from `common/governments`.

use std::collections::BTreeMap;
use std::path::Path;

use eu4txt::Block;

use crate::loader::{LoadError, LoadReport, parse_dir};

pub const GOVERNMENTS_DIR: &str = "common/governments";

/// The government properties idea triggers care about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Government {
    /// Declares a `religion` key.
    pub theocracy: bool,
    /// Declares a `monarchy` key.
    pub monarchy: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Governments {
    by_name: BTreeMap<String, Government>,
}

impl Governments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds every block-valued entry of a parsed file. Later files win.
    pub fn add_block(&mut self, block: &Block) {
        for (name, body) in block.iter() {
            let Some(body) = body.as_block() else {
                continue;
            };
            let government = Government {
                theocracy: body.get("religion").is_some(),
                monarchy: body.get("monarchy").is_some(),
            };
            self.by_name.insert(name.to_string(), government);
        }
    }

    pub fn from_blocks<'a>(blocks: impl IntoIterator<Item = &'a Block>) -> Self {
        let mut governments = Self::new();
        for block in blocks {
            governments.add_block(block);
        }
        governments
    }

    pub fn get(&self, name: &str) -> Option<&Government> {
        self.by_name.get(name)
    }

    pub fn is_theocracy(&self, name: &str) -> bool {
        self.get(name).is_some_and(|g| g.theocracy)
    }

    pub fn is_monarchy(&self, name: &str) -> bool {
        self.get(name).is_some_and(|g| g.monarchy)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

pub fn load_governments(
    game_path: &Path,
    fail_fast: bool,
    report: &mut LoadReport,
) -> Result<Governments, LoadError> {
    let dir = game_path.join(GOVERNMENTS_DIR);
    let files = parse_dir(&dir, fail_fast, report)?;
    let governments = Governments::from_blocks(files.iter().map(|(_, block)| block));
    log::info!("loaded {} governments", governments.len());
    Ok(governments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use eu4txt::parse_str;

    #[test]
    fn test_government_flags() {
        let block = parse_str(
            r#"
            feudal_monarchy = { monarchy = yes rank = { 1 2 3 } }
            theocratic_government = { religion = yes }
            merchant_republic = { republic = yes }
            pre_dharma_mapping = yes
            "#,
        )
        .unwrap();
        let governments = Governments::from_blocks([&block]);
        assert_eq!(governments.len(), 3);
        assert!(governments.is_monarchy("feudal_monarchy"));
        assert!(!governments.is_theocracy("feudal_monarchy"));
        assert!(governments.is_theocracy("theocratic_government"));
        assert_eq!(
            governments.get("merchant_republic"),
            Some(&Government::default())
        );
        assert!(!governments.is_monarchy("unknown"));
    }

    #[test]
    fn test_load_governments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(GOVERNMENTS_DIR);
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("00_governments.txt"), "a = { monarchy = yes }").unwrap();
        std::fs::write(path.join("01_more.txt"), "a = { religion = yes }").unwrap();

        let mut report = LoadReport::default();
        let governments = load_governments(dir.path(), true, &mut report).unwrap();
        assert_eq!(report.loaded, 2);
        assert!(governments.is_theocracy("a"));
        assert!(!governments.is_monarchy("a"));
    }
}
