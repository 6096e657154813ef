use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Source file not found: {0}")]
    SourceNotFound(PathBuf),
}

/// Mode for cache validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheValidationMode {
    /// Only compare source modification times.
    Fast,
    /// Compare source hashes and verify the cached data's own hash.
    Strict,
}

/// Sidecar written next to every cached value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// SHA256 hashes of the source files
    #[serde(default)]
    pub source_hashes: HashMap<PathBuf, String>,
    /// Modification times of the source files
    #[serde(default)]
    pub source_mtimes: HashMap<PathBuf, SystemTime>,
    /// SHA256 of the cached data itself
    #[serde(default)]
    pub data_hash: Option<[u8; 32]>,
    pub generated_at: SystemTime,
}

impl CacheMetadata {
    pub fn from_sources(source_files: &[PathBuf]) -> Result<Self, CacheError> {
        let mut source_hashes = HashMap::new();
        let mut source_mtimes = HashMap::new();

        for path in source_files {
            if !path.exists() {
                return Err(CacheError::SourceNotFound(path.clone()));
            }
            let mtime = fs::metadata(path)?.modified()?;
            source_mtimes.insert(path.clone(), mtime);
            source_hashes.insert(path.clone(), compute_file_hash(path)?);
        }

        Ok(Self {
            source_hashes,
            source_mtimes,
            data_hash: None,
            generated_at: SystemTime::now(),
        })
    }

    /// Every source still has the recorded modification time.
    pub fn is_valid_quick(&self, source_files: &[PathBuf]) -> bool {
        source_files.iter().all(|path| {
            let mtime = fs::metadata(path).and_then(|m| m.modified());
            match (mtime, self.source_mtimes.get(path)) {
                (Ok(mtime), Some(cached)) => mtime == *cached,
                _ => false,
            }
        })
    }

    /// Every source still has the recorded content hash.
    pub fn is_valid(&self, source_files: &[PathBuf]) -> bool {
        source_files.iter().all(|path| {
            match (compute_file_hash(path), self.source_hashes.get(path)) {
                (Ok(hash), Some(cached)) => hash == *cached,
                _ => false,
            }
        })
    }
}

/// Get-or-compute collaborator for expensive derived data.
pub trait Cache {
    /// Returns the value stored under `name` if it is still valid for
    /// `source_files`, otherwise computes and stores it.
    fn get_or_compute<T, F>(
        &self,
        name: &str,
        source_files: &[PathBuf],
        compute: F,
    ) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T;
}

/// Always computes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl Cache for NoCache {
    fn get_or_compute<T, F>(&self, _name: &str, _source_files: &[PathBuf], compute: F) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        Ok(compute())
    }
}

/// Stores `<name>.json` and `<name>.meta.json` under a directory.
#[derive(Debug, Clone)]
pub struct JsonCache {
    dir: PathBuf,
    mode: CacheValidationMode,
}

impl JsonCache {
    pub fn new(dir: impl Into<PathBuf>, mode: CacheValidationMode) -> Self {
        Self {
            dir: dir.into(),
            mode,
        }
    }

    /// `~/.cache/eu4stats`, or `.cache/eu4stats` without a home directory.
    pub fn in_home(mode: CacheValidationMode) -> Self {
        let dir = match dirs::home_dir() {
            Some(home) => home.join(".cache").join("eu4stats"),
            None => PathBuf::from(".cache/eu4stats"),
        };
        Self::new(dir, mode)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn paths(&self, name: &str) -> (PathBuf, PathBuf) {
        (
            self.dir.join(format!("{}.json", name)),
            self.dir.join(format!("{}.meta.json", name)),
        )
    }

    /// The stored value, or `None` when it is missing, stale or corrupt.
    fn load<T: DeserializeOwned>(&self, name: &str, source_files: &[PathBuf]) -> Option<T> {
        let (cache_path, meta_path) = self.paths(name);
        if !cache_path.exists() || !meta_path.exists() {
            log::info!("No cache found for {}, generating", name);
            return None;
        }

        let metadata: CacheMetadata = match fs::read_to_string(&meta_path)
            .map_err(CacheError::from)
            .and_then(|json| Ok(serde_json::from_str(&json)?))
        {
            Ok(metadata) => metadata,
            Err(e) => {
                log::warn!("Unreadable cache metadata for {} ({}), regenerating", name, e);
                return None;
            }
        };

        let valid = match self.mode {
            CacheValidationMode::Fast => metadata.is_valid_quick(source_files),
            CacheValidationMode::Strict => metadata.is_valid(source_files),
        };
        if !valid {
            log::info!("Cache invalid for {}, regenerating", name);
            return None;
        }

        let cache_json = fs::read_to_string(&cache_path).ok()?;
        if self.mode == CacheValidationMode::Strict {
            let current = compute_sha256_bytes(cache_json.as_bytes());
            if metadata.data_hash != Some(current) {
                log::warn!("Cache data corruption detected for {}, regenerating", name);
                return None;
            }
        }

        match serde_json::from_str(&cache_json) {
            Ok(value) => {
                log::info!("Using cached {}", name);
                Some(value)
            }
            Err(e) => {
                log::warn!("Failed to deserialize cache for {} ({}), regenerating", name, e);
                None
            }
        }
    }
}

impl Cache for JsonCache {
    fn get_or_compute<T, F>(&self, name: &str, source_files: &[PathBuf], compute: F) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        if let Some(value) = self.load(name, source_files) {
            return Ok(value);
        }

        let value = compute();

        fs::create_dir_all(&self.dir)?;
        let (cache_path, meta_path) = self.paths(name);
        let cache_json = serde_json::to_string_pretty(&value)?;
        fs::write(&cache_path, &cache_json)?;

        let mut metadata = CacheMetadata::from_sources(source_files)?;
        metadata.data_hash = Some(compute_sha256_bytes(cache_json.as_bytes()));
        fs::write(&meta_path, serde_json::to_string_pretty(&metadata)?)?;

        log::info!("Cached {} at {}", name, cache_path.display());
        Ok(value)
    }
}

fn compute_sha256_bytes(bytes: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Hex SHA256 of a file.
pub fn compute_file_hash(path: &Path) -> Result<String, CacheError> {
    use sha2::{Digest, Sha256};

    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0; 8192];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn test_cache_metadata_from_sources() {
        let temp = TempDir::new().unwrap();
        let file1 = temp.path().join("file1.txt");
        fs::write(&file1, b"content1").unwrap();

        let metadata = CacheMetadata::from_sources(std::slice::from_ref(&file1)).unwrap();
        assert_eq!(metadata.source_hashes.len(), 1);
        assert_eq!(metadata.source_mtimes.len(), 1);
        assert!(metadata.source_hashes.contains_key(&file1));

        let missing = temp.path().join("missing.txt");
        assert!(matches!(
            CacheMetadata::from_sources(&[missing]),
            Err(CacheError::SourceNotFound(_))
        ));
    }

    #[test]
    fn test_cache_metadata_validation() {
        let temp = TempDir::new().unwrap();
        let file1 = temp.path().join("file1.txt");
        fs::write(&file1, b"content1").unwrap();

        let metadata = CacheMetadata::from_sources(std::slice::from_ref(&file1)).unwrap();
        assert!(metadata.is_valid(std::slice::from_ref(&file1)));

        fs::write(&file1, b"content2").unwrap();
        assert!(!metadata.is_valid(&[file1]));
    }

    #[test]
    fn test_cache_mtime_fast_path() {
        let temp = TempDir::new().unwrap();
        let file1 = temp.path().join("file1.txt");
        fs::write(&file1, b"content1").unwrap();

        let metadata = CacheMetadata::from_sources(std::slice::from_ref(&file1)).unwrap();
        assert!(metadata.is_valid_quick(std::slice::from_ref(&file1)));

        std::thread::sleep(std::time::Duration::from_millis(100));
        fs::write(&file1, b"content2").unwrap();
        assert!(!metadata.is_valid_quick(&[file1]));
    }

    #[test]
    fn test_compute_file_hash() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("test.txt");
        fs::write(&file, b"hello world").unwrap();

        // SHA256 of "hello world"
        assert_eq!(
            compute_file_hash(&file).unwrap(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_no_cache_always_computes() {
        let calls = Cell::new(0);
        for _ in 0..2 {
            let value: u32 = NoCache
                .get_or_compute("n", &[], || {
                    calls.set(calls.get() + 1);
                    7
                })
                .unwrap();
            assert_eq!(value, 7);
        }
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_json_cache_reuses_value() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("terrain.txt");
        fs::write(&source, "a").unwrap();
        let sources = vec![source.clone()];

        for mode in [CacheValidationMode::Fast, CacheValidationMode::Strict] {
            let cache = JsonCache::new(temp.path().join(format!("{:?}", mode)), mode);
            let calls = Cell::new(0);
            let compute = || {
                calls.set(calls.get() + 1);
                BTreeMap::from([(1u32, "hills".to_string())])
            };
            let first = cache.get_or_compute("terrain", &sources, compute).unwrap();
            let second = cache.get_or_compute("terrain", &sources, compute).unwrap();
            assert_eq!(first, second);
            assert_eq!(calls.get(), 1);
            assert!(cache.dir().join("terrain.json").exists());
            assert!(cache.dir().join("terrain.meta.json").exists());
        }
    }

    #[test]
    fn test_json_cache_recomputes_on_source_change() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("terrain.txt");
        fs::write(&source, "a").unwrap();
        let sources = vec![source.clone()];
        let cache = JsonCache::new(temp.path().join("cache"), CacheValidationMode::Strict);

        let first: String = cache.get_or_compute("v", &sources, || "one".to_string()).unwrap();
        fs::write(&source, "b").unwrap();
        let second: String = cache.get_or_compute("v", &sources, || "two".to_string()).unwrap();
        assert_eq!(first, "one");
        assert_eq!(second, "two");
    }

    #[test]
    fn test_corrupt_cache_triggers_regeneration() {
        let temp = TempDir::new().unwrap();
        let cache = JsonCache::new(temp.path(), CacheValidationMode::Fast);

        let first: Vec<u32> = cache.get_or_compute("corrupt", &[], || vec![1, 2]).unwrap();
        assert_eq!(first, vec![1, 2]);

        fs::write(temp.path().join("corrupt.json"), "[1, INVALID").unwrap();
        let second: Vec<u32> = cache.get_or_compute("corrupt", &[], || vec![3]).unwrap();
        assert_eq!(second, vec![3]);

        fs::write(temp.path().join("corrupt.meta.json"), "{").unwrap();
        let third: Vec<u32> = cache.get_or_compute("corrupt", &[], || vec![4]).unwrap();
        assert_eq!(third, vec![4]);
    }

    #[test]
    fn test_strict_mode_checks_data_hash() {
        let temp = TempDir::new().unwrap();
        let cache = JsonCache::new(temp.path(), CacheValidationMode::Strict);

        let _: Vec<u32> = cache.get_or_compute("hashed", &[], || vec![1]).unwrap();
        // Valid JSON, but not what was written.
        fs::write(temp.path().join("hashed.json"), "[9]").unwrap();
        let value: Vec<u32> = cache.get_or_compute("hashed", &[], || vec![2]).unwrap();
        assert_eq!(value, vec![2]);
    }
}
