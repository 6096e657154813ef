mod args;
mod report;

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use args::{Cli, Commands, EntityKind, Format};
use eu4data::path::{GAME_PATH_ENV, resolve_game_path};
use eu4data::{DataConfig, GameData, SnapshotDate, loader};

fn game_path(cli: &Cli) -> Result<PathBuf> {
    match resolve_game_path(cli.game_path.as_deref()) {
        Some(path) => Ok(path),
        None => bail!(
            "EU4 installation not found; pass --game-path or set {}",
            GAME_PATH_ENV
        ),
    }
}

fn load_config(path: Option<&Path>) -> Result<DataConfig> {
    match path {
        Some(path) => Ok(DataConfig::from_json_file(path)?),
        None => Ok(DataConfig::default()),
    }
}

fn load_game(cli: &Cli, config: &DataConfig) -> Result<GameData> {
    let path = game_path(cli)?;
    let data = GameData::load(&path, config)
        .with_context(|| format!("loading game data from {}", path.display()))?;
    if !data.report.failures.is_empty() {
        log::warn!("{} files could not be loaded", data.report.failed());
    }
    Ok(data)
}

fn print_json(out: &mut impl Write, value: &impl serde::Serialize) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

fn snapshot(
    cli: &Cli,
    config: &DataConfig,
    kind: EntityKind,
    query: &str,
    date: SnapshotDate,
    out: &mut impl Write,
) -> Result<()> {
    let path = game_path(cli)?;
    let snapshot = match kind {
        EntityKind::Country => {
            let (countries, _) = loader::load_countries(&path, config)?;
            countries.lookup(query)?.at(date)?
        }
        EntityKind::Province => {
            let (provinces, _) = loader::load_provinces(&path, config)?;
            provinces.lookup(query)?.at(date)?
        }
    };
    print_json(out, &snapshot)
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level)
        .format_timestamp(None)
        .init();

    let config = load_config(cli.config.as_deref())?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match &cli.command {
        Commands::Parse { file, format } => {
            let block = eu4txt::read_file(file)?;
            match format {
                Format::Json => print_json(&mut out, &block)?,
                Format::Text => writeln!(out, "{}", block)?,
            }
        }
        Commands::Snapshot { kind, query, date } => {
            let date = date.unwrap_or(SnapshotDate::Start);
            snapshot(&cli, &config, *kind, query, date, &mut out)?;
        }
        Commands::Stats { date } => {
            let data = load_game(&cli, &config)?;
            report::write_stats(&mut out, &data, date.unwrap_or(SnapshotDate::Start))?;
        }
        Commands::Ideas { tag } => {
            let data = load_game(&cli, &config)?;
            match tag {
                Some(tag) => report::write_ideas_for(&mut out, &data, tag)?,
                None => report::write_idea_totals(&mut out, &data)?,
            }
        }
    }
    Ok(())
}
