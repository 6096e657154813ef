use std::collections::HashMap;
use std::path::Path;

use crate::terrain::TerrainError;

/// Province bitmap colour -> province id.
pub type ProvinceColors = HashMap<[u8; 3], u32>;

fn parse_row(record: &csv::ByteRecord) -> Option<(u32, [u8; 3])> {
    let field = |i: usize| std::str::from_utf8(record.get(i)?).ok().map(str::trim);
    let id = field(0)?.parse().ok()?;
    let r = field(1)?.parse().ok()?;
    let g = field(2)?.parse().ok()?;
    let b = field(3)?.parse().ok()?;
    Some((id, [r, g, b]))
}

/// Loads `map/definition.csv` (`province;red;green;blue;name;x`).
///
/// The header row is skipped. Names are not decoded, so the Windows-1252
/// bytes in them do not matter; rows with unreadable numbers are skipped.
pub fn load_definitions(path: &Path) -> Result<ProvinceColors, TerrainError> {
    let csv_err = |source| TerrainError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;

    let mut definitions = ProvinceColors::new();
    for (line, record) in reader.byte_records().enumerate() {
        let record = record.map_err(csv_err)?;
        match parse_row(&record) {
            Some((id, color)) => {
                definitions.insert(color, id);
            }
            // +2: the header, and 1-based lines
            None => log::warn!("{}:{}: skipping malformed row", path.display(), line + 2),
        }
    }
    log::debug!("loaded {} province colours", definitions.len());
    Ok(definitions)
}
