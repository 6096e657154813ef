use std::path::{Path, PathBuf};

/// Environment variable naming the game directory.
pub const GAME_PATH_ENV: &str = "EU4_PATH";

/// Detects the Europa Universalis IV installation path.
///
/// Checks common Steam installation directories on Windows, Linux, and macOS.
pub fn detect_game_path() -> Option<PathBuf> {
    let candidates = [
        // Windows
        r"C:\Program Files (x86)\Steam\steamapps\common\Europa Universalis IV",
        // Linux
        ".local/share/Steam/steamapps/common/Europa Universalis IV",
        // macOS
        "Library/Application Support/Steam/steamapps/common/Europa Universalis IV",
    ];

    let home = dirs::home_dir();
    candidates
        .iter()
        .filter_map(|candidate| {
            if candidate.starts_with("C:") {
                Some(PathBuf::from(candidate))
            } else {
                home.as_ref().map(|home| home.join(candidate))
            }
        })
        .find(|path| path.exists())
}

/// Picks the game directory: an explicit path wins, then `EU4_PATH`, then Steam.
///
/// An explicit path is returned even if it does not exist, so the caller
/// reports it instead of silently loading another installation.
pub fn resolve_game_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = std::env::var_os(GAME_PATH_ENV).filter(|v| !v.is_empty()) {
        log::debug!("using {} from {}", PathBuf::from(&path).display(), GAME_PATH_ENV);
        return Some(PathBuf::from(path));
    }
    detect_game_path()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_game_path_does_not_panic() {
        let _ = detect_game_path();
    }

    #[test]
    fn test_explicit_path_wins() {
        let explicit = Path::new("/nonexistent/eu4");
        assert_eq!(
            resolve_game_path(Some(explicit)),
            Some(PathBuf::from("/nonexistent/eu4"))
        );
    }
}
