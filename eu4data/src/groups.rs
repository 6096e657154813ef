//! Inverted grouping tables (`group = { member = { ... } }`).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use eu4txt::{Block, Value};

use crate::loader::{LoadError, LoadReport, parse_dir};

pub const CULTURES_DIR: &str = "common/cultures";
pub const RELIGIONS_DIR: &str = "common/religions";

/// Maps members to the group that declares them.
///
/// A member declared under more than one group is ambiguous and left out of
/// the inverse map, though it still appears in [`GroupIndex::members_of`].
#[derive(Debug, Clone, Default)]
pub struct GroupIndex {
    groups: BTreeMap<String, Vec<String>>,
    member_to_group: HashMap<String, String>,
    ambiguous: BTreeSet<String>,
}

impl GroupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds every group of a parsed file. Only block-valued members count, so
    /// group-level settings such as `graphical_culture = x` are ignored.
    pub fn add_block(&mut self, block: &Block) {
        for (group, body) in block.iter() {
            for body in body.items() {
                let Some(body) = body.as_block() else {
                    continue;
                };
                for (member, value) in body.iter() {
                    if matches!(value, Value::Block(_) | Value::Empty) {
                        self.add_member(group, member);
                    }
                }
            }
        }
    }

    fn add_member(&mut self, group: &str, member: &str) {
        self.groups
            .entry(group.to_string())
            .or_default()
            .push(member.to_string());
        if self.ambiguous.contains(member) {
            return;
        }
        match self.member_to_group.get(member) {
            Some(existing) if existing != group => {
                log::debug!(
                    "'{}' listed under both '{}' and '{}', dropping it",
                    member,
                    existing,
                    group
                );
                self.member_to_group.remove(member);
                self.ambiguous.insert(member.to_string());
            }
            Some(_) => {}
            None => {
                self.member_to_group
                    .insert(member.to_string(), group.to_string());
            }
        }
    }

    pub fn from_blocks<'a>(blocks: impl IntoIterator<Item = &'a Block>) -> Self {
        let mut index = Self::new();
        for block in blocks {
            index.add_block(block);
        }
        index
    }

    pub fn group_of(&self, member: &str) -> Option<&str> {
        self.member_to_group.get(member).map(String::as_str)
    }

    pub fn members_of(&self, group: &str) -> &[String] {
        self.groups.get(group).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn is_ambiguous(&self, member: &str) -> bool {
        self.ambiguous.contains(member)
    }

    /// Number of unambiguous members.
    pub fn len(&self) -> usize {
        self.member_to_group.len()
    }

    pub fn is_empty(&self) -> bool {
        self.member_to_group.is_empty()
    }
}

fn load_groups(
    dir: &Path,
    fail_fast: bool,
    report: &mut LoadReport,
) -> Result<GroupIndex, LoadError> {
    let files = parse_dir(dir, fail_fast, report)?;
    let index = GroupIndex::from_blocks(files.iter().map(|(_, block)| block));
    log::info!(
        "loaded {} groups with {} members from {}",
        index.groups.len(),
        index.len(),
        dir.display()
    );
    Ok(index)
}

/// Culture -> culture group, from `common/cultures`.
pub fn load_culture_groups(
    game_path: &Path,
    fail_fast: bool,
    report: &mut LoadReport,
) -> Result<GroupIndex, LoadError> {
    load_groups(&game_path.join(CULTURES_DIR), fail_fast, report)
}

/// Religion -> religion group, from `common/religions`.
pub fn load_religion_groups(
    game_path: &Path,
    fail_fast: bool,
    report: &mut LoadReport,
) -> Result<GroupIndex, LoadError> {
    load_groups(&game_path.join(RELIGIONS_DIR), fail_fast, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use eu4txt::parse_str;

    #[test]
    fn test_inverts_groups() {
        let block = parse_str(
            r#"
            germanic = {
                graphical_culture = northerngfx
                swedish = { primary = SWE }
                danish = { }
            }
            latin = {
                italian = { primary = ITA }
            }
            "#,
        )
        .unwrap();
        let index = GroupIndex::from_blocks([&block]);
        assert_eq!(index.group_of("swedish"), Some("germanic"));
        assert_eq!(index.group_of("danish"), Some("germanic"));
        assert_eq!(index.group_of("italian"), Some("latin"));
        assert_eq!(index.group_of("graphical_culture"), None);
        assert_eq!(index.len(), 3);
        assert_eq!(index.members_of("germanic"), ["swedish", "danish"]);
        assert!(index.members_of("slavic").is_empty());
    }

    #[test]
    fn test_ambiguous_members_dropped() {
        let a = parse_str("one = { x = { } y = { } }").unwrap();
        let b = parse_str("two = { x = { } }\nthree = { x = { } }").unwrap();
        let index = GroupIndex::from_blocks([&a, &b]);
        assert_eq!(index.group_of("x"), None);
        assert!(index.is_ambiguous("x"));
        assert_eq!(index.group_of("y"), Some("one"));
        assert_eq!(index.groups().collect::<Vec<_>>(), ["one", "three", "two"]);
    }

    #[test]
    fn test_repeated_group_keys_merge() {
        let block = parse_str("christian = { catholic = { } }\nchristian = { orthodox = { } }").unwrap();
        let index = GroupIndex::from_blocks([&block]);
        assert_eq!(index.group_of("catholic"), Some("christian"));
        assert_eq!(index.group_of("orthodox"), Some("christian"));
    }

    #[test]
    fn test_load_culture_groups() {
        let dir = tempfile::tempdir().unwrap();
        let cultures = dir.path().join(CULTURES_DIR);
        std::fs::create_dir_all(&cultures).unwrap();
        std::fs::write(
            cultures.join("00_cultures.txt"),
            "germanic = { swedish = { primary = SWE } danish = { primary = DAN } }",
        )
        .unwrap();
        std::fs::write(cultures.join("01_broken.txt"), "latin = { italian = {").unwrap();

        let mut report = LoadReport::default();
        let index = load_culture_groups(dir.path(), false, &mut report).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.group_of("danish"), Some("germanic"));
        assert_eq!(report.loaded, 1);
        assert_eq!(report.failed(), 1);

        let mut report = LoadReport::default();
        assert!(load_culture_groups(dir.path(), true, &mut report).is_err());

        let mut report = LoadReport::default();
        let religions = load_religion_groups(dir.path(), true, &mut report).unwrap();
        assert!(religions.is_empty());
    }
}
