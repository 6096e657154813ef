use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::{TempDir, tempdir};

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn fake_game() -> TempDir {
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
        "government = feudal_monarchy\nprimary_culture = norwegian\nreligion = catholic",
    );
    write(
        root,
        "common/cultures/00_cultures.txt",
        "scandinavian = { swedish = { } norwegian = { } }",
    );
    write(
        root,
        "common/custom_ideas/00_custom_ideas.txt",
        "mil_ideas = { category = MIL custom_morale = { land_morale = 0.05 } }",
    );
    write(
        root,
        "common/ideas/00_country_ideas.txt",
        r#"
        SWE_ideas = {
            start = { land_morale = 0.1 }
            bonus = { land_morale = 0.05 }
            trigger = { tag = SWE }
            free = yes
            swe_one = { land_morale = 0.05 }
        }
        scandinavian_ideas = {
            start = { made_up_effect = 1 }
            trigger = { culture_group = scandinavian }
            free = yes
        }
        "#,
    );
    dir
}

fn eu4stats(game: &Path) -> Command {
    let mut cmd = Command::cargo_bin("eu4stats").unwrap();
    cmd.env_remove("EU4_PATH").arg("--game-path").arg(game);
    cmd
}

#[test]
fn test_cli_help() {
    Command::cargo_bin("eu4stats")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("snapshot"));
}

#[test]
fn test_parse_json_and_text() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("test.txt");
    fs::write(&file, "a = 1\nb = { c = 2 }").unwrap();

    Command::cargo_bin("eu4stats")
        .unwrap()
        .arg("parse")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"c\": \"2\""));

    Command::cargo_bin("eu4stats")
        .unwrap()
        .args(["parse", "--format", "text"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("a = 1").and(predicate::str::contains("c = 2")));
}

#[test]
fn test_parse_error_exits_nonzero() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("broken.txt");
    fs::write(&file, "a = {").unwrap();
    Command::cargo_bin("eu4stats")
        .unwrap()
        .arg("parse")
        .arg(&file)
        .assert()
        .failure();
}

#[test]
fn test_snapshot_province_by_name() {
    let game = fake_game();
    eu4stats(game.path())
        .args(["snapshot", "province", "Stockholm"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"owner\": \"SWE\""));

    eu4stats(game.path())
        .args(["snapshot", "province", "1", "--date", "1521.1.1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"owner\": \"DAN\""));
}

#[test]
fn test_snapshot_unknown_country() {
    let game = fake_game();
    eu4stats(game.path())
        .args(["snapshot", "country", "XXX"])
        .assert()
        .failure();
}

#[test]
fn test_stats_table() {
    let game = fake_game();
    let assert = eu4stats(game.path()).arg("stats").assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let lines: Vec<_> = stdout.lines().collect();

    assert!(lines[0].starts_with("tag\tname\tgovernment\t"));
    assert!(lines[0].ends_with("provinces\tbase_tax\tbase_production\tbase_manpower"));
    // NOR owns nothing and DAN has no history file
    assert_eq!(lines.len(), 2);
    assert!(lines[1].starts_with("SWE\tSweden\tfeudal_monarchy\t"));
    assert!(lines[1].ends_with("\t2\t8\t0\t0"));
}

#[test]
fn test_stats_at_date() {
    let game = fake_game();
    eu4stats(game.path())
        .args(["stats", "--date", "1530.1.1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\t1\t3\t0\t0"));
}

#[test]
fn test_ideas_for_tag() {
    let game = fake_game();
    eu4stats(game.path())
        .args(["ideas", "SWE"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("SWE_ideas (swe)")
                .and(predicate::str::contains("Total: 10.00")),
        );

    // NOR has no own group and falls through to the culture group trigger
    eu4stats(game.path())
        .args(["ideas", "NOR"])
        .assert()
        .success()
        .stdout(predicate::str::contains("scandinavian_ideas (scandinavian*)"));
}

#[test]
fn test_ideas_totals() {
    let game = fake_game();
    eu4stats(game.path())
        .arg("ideas")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Legend:")
                .and(predicate::str::contains("0.00 scandinavian*"))
                .and(predicate::str::contains("10.00 swe")),
        );
}

#[test]
fn test_ideas_unknown_tag() {
    let game = fake_game();
    eu4stats(game.path())
        .args(["ideas", "XXX"])
        .assert()
        .failure();
}

#[test]
fn test_missing_game_dir() {
    let dir = tempdir().unwrap();
    eu4stats(&dir.path().join("missing"))
        .arg("stats")
        .assert()
        .failure()
        .stderr(predicate::str::contains("loading game data"));
}
