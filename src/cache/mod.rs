//! The persistent build cache.
//!
//! The cache lives in `<project>/.eventchains/cache.dat` — deliberately
//! *outside* the build directory, so that deleting `build/` (or running
//! `--clean`) leaves the metadata intact and the next build only has to
//! regenerate object files whose content actually changed.
//!
//! On disk the snapshot is an rkyv archive loaded zero-copy through a memory
//! map. Every load failure is recoverable: a missing, corrupt, or
//! version-mismatched file simply resets the cache to empty and the build
//! proceeds as a full rebuild. Saves are atomic (temp file + rename).
//!
//! # Staleness decision
//!
//! [`BuildCache::needs_recompilation`] is purely content-driven: it compares
//! the stored FNV-1a hash of the source and of each recorded *direct*
//! dependency against the bytes on disk right now. Object-file existence is
//! deliberately not part of the decision — the caching middleware re-checks
//! that separately — because the whole point is that the decision must
//! survive build-directory deletion.
//!
//! Dependencies whose file no longer exists are treated as unchanged. That
//! accommodates system headers but means a deleted user header does not by
//! itself invalidate its includers; the compile that eventually fails will.
//! Tracking is direct-only: a change deep in the include tree reaches a
//! given source only when one of that source's own recorded dependencies
//! changes bytes.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use memmap2::Mmap;
use rayon::prelude::*;
use rkyv::{Archive, Deserialize, Serialize};

use crate::error::{BuildError, Result};
use crate::fsutil::file_mtime;
use crate::graph::DependencyGraph;
use crate::hashing::{self, hash_file_content};
use crate::logging::Logger;


/// Current version of the cache format.
///
/// A mismatch on load discards the file and starts empty; it never errors.
pub const CACHE_VERSION: u32 = 1;

/// Upper bound on cached entries; a larger count on disk means corruption.
pub const MAX_CACHE_ENTRIES: usize = 2048;

/// Upper bound on recorded direct dependencies per entry.
pub const MAX_DEPENDENCIES_PER_FILE: usize = 128;

const CACHE_DIR_NAME: &str = ".eventchains";
const CACHE_FILENAME: &str = "cache.dat";

/// One recorded direct dependency: the resolved path and the FNV-1a hash of
/// its bytes at the time of the last successful compilation.
#[derive(Archive, Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct DependencyRecord {
    #[rkyv(with = rkyv::with::AsString)]
    pub path: PathBuf,
    pub hash: u64,
}

/// Cached compilation state for one translation unit.
#[derive(Archive, Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Absolute path of the compiled source.
    #[rkyv(with = rkyv::with::AsString)]
    pub source_path: PathBuf,
    /// Absolute path of the object file produced.
    #[rkyv(with = rkyv::with::AsString)]
    pub object_path: PathBuf,
    /// FNV-1a hash of the source bytes at the last successful compile.
    pub source_hash: u64,
    /// Source mtime at the last successful compile (informational).
    pub source_mtime: i64,
    /// Wall-clock time of the last successful compile, seconds since epoch.
    pub last_compiled: i64,
    /// Direct includes recorded at the last compile, with their hashes.
    pub dependencies: Vec<DependencyRecord>,
    /// Tombstone: invalidated entries stay in the map but never hit.
    pub valid: bool,
}

/// The persisted portion of the cache.
#[derive(Archive, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
struct CacheSnapshot {
    version: u32,
    entries: HashMap<String, CacheEntry>,
}

impl CacheSnapshot {
    fn new() -> Self {
        Self {
            version: CACHE_VERSION,
            entries: HashMap::new(),
        }
    }
}

/// The build cache: persisted snapshot plus per-run counters.
#[derive(Debug)]
pub struct BuildCache {
    snapshot: CacheSnapshot,
    cache_dir: PathBuf,
    hits: u64,
    misses: u64,
    invalidations: u64,
}

impl BuildCache {
    /// Creates `<project>/.eventchains/` and loads any existing snapshot.
    ///
    /// Load problems (corruption, version mismatch, oversized entry count)
    /// are reported through the logger and reset the cache to empty; only a
    /// failure to create the cache directory itself is an error, and the
    /// caller treats even that as a warning and builds uncached.
    pub fn open(project_dir: &Path, logger: &Logger) -> Result<Self> {
        let cache_dir = project_dir.join(CACHE_DIR_NAME);
        fs::create_dir_all(&cache_dir).map_err(|source| BuildError::Io {
            path: cache_dir.clone(),
            source,
        })?;

        let cache_file = cache_dir.join(CACHE_FILENAME);
        let snapshot = load_snapshot(&cache_file, logger);

        Ok(Self {
            snapshot,
            cache_dir,
            hits: 0,
            misses: 0,
            invalidations: 0,
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn cache_file(&self) -> PathBuf {
        self.cache_dir.join(CACHE_FILENAME)
    }

    pub fn len(&self) -> usize {
        self.snapshot.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn invalidations(&self) -> u64 {
        self.invalidations
    }

    /// Fraction of decisions that were hits, in `[0.0, 1.0]`.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }

    /// Looks up the entry for a source path.
    pub fn entry(&self, source_path: &Path) -> Option<&CacheEntry> {
        let key = source_path.to_str()?;
        self.snapshot.entries.get(key)
    }

    /// Drops all entries and resets the counters.
    pub fn clear(&mut self) {
        self.snapshot.entries.clear();
        self.hits = 0;
        self.misses = 0;
        self.invalidations = 0;
    }

    /// Decides whether a source must be recompiled. Counts a hit or a miss.
    ///
    /// Misses: no entry, invalidated entry, unreadable source, source hash
    /// mismatch, or any recorded dependency whose file exists with different
    /// bytes. Dependencies missing on disk are skipped (system headers).
    pub fn needs_recompilation(&mut self, source_path: &Path) -> bool {
        let entry = match source_path.to_str().and_then(|k| self.snapshot.entries.get(k)) {
            Some(entry) if entry.valid => entry,
            _ => {
                self.misses += 1;
                return true;
            }
        };

        let current_hash = hash_file_content(source_path);
        if current_hash == hashing::UNREADABLE || current_hash != entry.source_hash {
            self.misses += 1;
            return true;
        }

        let dependency_changed = entry.dependencies.par_iter().any(|dep| {
            let hash = hash_file_content(&dep.path);
            hash != hashing::UNREADABLE && hash != dep.hash
        });
        if dependency_changed {
            self.misses += 1;
            return true;
        }

        self.hits += 1;
        false
    }

    /// Upserts the entry for a freshly compiled source.
    ///
    /// Records the current source hash and mtime, the compile time, and the
    /// source's *direct* includes (bounded) with their current hashes.
    pub fn update(
        &mut self,
        source_path: &Path,
        object_path: &Path,
        graph: &DependencyGraph,
        logger: &Logger,
    ) {
        let Some(key) = source_path.to_str() else {
            logger.warn(format!(
                "cache entry skipped, non-UTF-8 path: {}",
                source_path.display()
            ));
            return;
        };

        if !self.snapshot.entries.contains_key(key)
            && self.snapshot.entries.len() >= MAX_CACHE_ENTRIES
        {
            logger.warn(format!(
                "cache full ({MAX_CACHE_ENTRIES} entries), cannot add more"
            ));
            return;
        }

        let dependencies: Vec<DependencyRecord> = graph
            .find(source_path)
            .map(|index| {
                let node = graph.node(index);
                let dep_paths: Vec<PathBuf> = node
                    .includes()
                    .iter()
                    .take(MAX_DEPENDENCIES_PER_FILE)
                    .map(|&dep| graph.node(dep).path().to_path_buf())
                    .collect();
                dep_paths
                    .into_par_iter()
                    .map(|path| {
                        let hash = hash_file_content(&path);
                        DependencyRecord { path, hash }
                    })
                    .collect()
            })
            .unwrap_or_default();

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        self.snapshot.entries.insert(
            key.to_string(),
            CacheEntry {
                source_path: source_path.to_path_buf(),
                object_path: object_path.to_path_buf(),
                source_hash: hash_file_content(source_path),
                source_mtime: file_mtime(source_path),
                last_compiled: now,
                dependencies,
                valid: true,
            },
        );
    }

    /// Clears the valid bit on one entry, if present.
    pub fn invalidate(&mut self, source_path: &Path) {
        let Some(key) = source_path.to_str() else {
            return;
        };
        if let Some(entry) = self.snapshot.entries.get_mut(key)
            && entry.valid
        {
            entry.valid = false;
            self.invalidations += 1;
        }
    }

    /// Invalidates every valid entry that lists `changed` as a direct
    /// dependency. Deeper invalidation happens implicitly across rebuild
    /// cycles as intermediate files' hashes change.
    pub fn invalidate_dependents(&mut self, changed: &Path) {
        let mut invalidated = 0;
        for entry in self.snapshot.entries.values_mut() {
            if entry.valid && entry.dependencies.iter().any(|d| d.path == changed) {
                entry.valid = false;
                invalidated += 1;
            }
        }
        self.invalidations += invalidated;
    }

    /// Saves the snapshot atomically: serialize, write `cache.dat.tmp`,
    /// fsync, rename over `cache.dat`. On any write failure the temp file is
    /// removed and the previous snapshot on disk stays intact.
    pub fn save(&self) -> Result<()> {
        let bytes = rkyv::to_bytes::<rkyv::rancor::BoxedError>(&self.snapshot)
            .map_err(|e| BuildError::CacheSerialization(Box::new(e)))?;

        let cache_file = self.cache_file();
        let temp_file = cache_file.with_extension("dat.tmp");

        let write_result = (|| {
            let mut file = File::create(&temp_file)?;
            file.write_all(&bytes)?;
            file.sync_all()
        })();
        if let Err(source) = write_result {
            let _ = fs::remove_file(&temp_file);
            return Err(BuildError::Io {
                path: temp_file,
                source,
            });
        }

        // Windows cannot rename over an existing file.
        #[cfg(windows)]
        let _ = fs::remove_file(&cache_file);

        if let Err(source) = fs::rename(&temp_file, &cache_file) {
            let _ = fs::remove_file(&temp_file);
            return Err(BuildError::Io {
                path: cache_file,
                source,
            });
        }

        Ok(())
    }

    /// Logs hit/miss counters and the hit rate.
    pub fn log_stats(&self, logger: &Logger) {
        logger.info("Cache statistics:");
        logger.info(format!("  Entries:       {}", self.len()));
        logger.info(format!("  Hits:          {}", self.hits));
        logger.info(format!("  Misses:        {}", self.misses));
        logger.info(format!("  Invalidations: {}", self.invalidations));
        if self.hits + self.misses > 0 {
            logger.info(format!("  Hit rate:      {:.1}%", self.hit_rate() * 100.0));
        }
    }
}

/// Loads a snapshot, recovering from every failure mode by starting empty.
fn load_snapshot(cache_file: &Path, logger: &Logger) -> CacheSnapshot {
    let file = match File::open(cache_file) {
        Ok(file) => file,
        // Absent cache is the normal first-build state.
        Err(_) => return CacheSnapshot::new(),
    };

    let is_empty = file.metadata().map(|m| m.len() == 0).unwrap_or(true);
    if is_empty {
        return CacheSnapshot::new();
    }

    let mmap = match unsafe { Mmap::map(&file) } {
        Ok(mmap) => mmap,
        Err(err) => {
            logger.warn(format!("failed to map cache file, rebuilding cache: {err}"));
            return CacheSnapshot::new();
        }
    };

    let snapshot = match rkyv::from_bytes::<CacheSnapshot, rkyv::rancor::BoxedError>(&mmap[..]) {
        Ok(snapshot) => snapshot,
        Err(_) => {
            logger.warn("cache file is corrupt or from an old version, rebuilding cache");
            return CacheSnapshot::new();
        }
    };

    if snapshot.version != CACHE_VERSION {
        logger.warn(format!(
            "cache version mismatch (expected {CACHE_VERSION}, got {}), rebuilding cache",
            snapshot.version
        ));
        return CacheSnapshot::new();
    }

    if snapshot.entries.len() > MAX_CACHE_ENTRIES {
        logger.warn(format!(
            "invalid cache entry count ({}), rebuilding cache",
            snapshot.entries.len()
        ));
        return CacheSnapshot::new();
    }

    snapshot
}
