//! Fingerprint-keyed documentation cache.
//!
//! Each entry is one JSON file named after the SHA-256 of its key. It stores the serialized
//! result together with the fingerprint (content hash and modification time) of every file
//! the result was derived from. An entry is served only while all of those fingerprints still
//! match; anything else, including an unreadable entry, is a miss and the value is recomputed
//! and rewritten.

use crate::class_resolver::ClassResolver;
use crate::error::{Error, Result};
use crate::resource_analyzer::ResourceStructure;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tempfile::NamedTempFile;

/// Entries written by another version of the tool are ignored
const CACHE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Identity of a dependency file at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub path: PathBuf,
    /// Hex SHA-256 of the file content
    pub hash: String,
    /// Modification time in milliseconds since the epoch
    pub mtime: u64,
}

impl Fingerprint {
    /// Fingerprint a file as it is on disk now
    pub fn of(path: &Path) -> Result<Self> {
        let content = fs::read(path)?;
        let mtime = fs::metadata(path)?
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Ok(Self {
            path: path.to_path_buf(),
            hash: hex::encode(Sha256::digest(&content)),
            mtime,
        })
    }

    /// Whether the file still has this fingerprint
    pub fn is_current(&self) -> bool {
        match Fingerprint::of(&self.path) {
            Ok(now) => now == *self,
            Err(_) => false,
        }
    }
}

/// On-disk cache entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub key: String,
    pub version: String,
    pub dependencies: Vec<Fingerprint>,
    pub value: T,
}

/// Counters for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub writes: usize,
    /// Entries that existed but could not be read back
    pub corrupted: usize,
}

pub struct DocumentationCache {
    dir: PathBuf,
    enabled: bool,
    stats: CacheStats,
}

impl DocumentationCache {
    pub fn new(dir: impl Into<PathBuf>, enabled: bool) -> Self {
        let dir = dir.into();
        debug!(
            "Documentation cache {} at {}",
            if enabled { "enabled" } else { "disabled" },
            dir.display()
        );
        Self {
            dir,
            enabled,
            stats: CacheStats::default(),
        }
    }

    /// A cache that always computes
    pub fn disabled() -> Self {
        Self::new(PathBuf::new(), false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Return the cached value for `key`, or run `compute` and cache its result.
    ///
    /// The entry is valid while every file in `dependencies` keeps its fingerprint.
    ///
    /// # Errors
    ///
    /// Only errors from `compute` are returned; cache read and write failures are logged and
    /// otherwise ignored.
    pub fn remember<T, F>(&mut self, key: &str, dependencies: &[PathBuf], compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        self.remember_with(key, dependencies, || compute().map(|value| (value, Vec::new())))
    }

    /// Like [`remember`](Self::remember), but `compute` also returns dependency files it
    /// discovered while running. They are fingerprinted along with `dependencies`.
    pub fn remember_with<T, F>(
        &mut self,
        key: &str,
        dependencies: &[PathBuf],
        compute: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<(T, Vec<PathBuf>)>,
    {
        if !self.enabled {
            return compute().map(|(value, _)| value);
        }

        let path = self.entry_path(key);
        match self.lookup::<T>(&path, key, dependencies) {
            Ok(Some(value)) => {
                debug!("Cache hit for {}", key);
                self.stats.hits += 1;
                return Ok(value);
            }
            Ok(None) => debug!("Cache miss for {}", key),
            Err(e) => {
                warn!("{}; recomputing", e);
                self.stats.corrupted += 1;
            }
        }
        self.stats.misses += 1;

        let (value, discovered) = compute()?;

        let mut fingerprints: Vec<Fingerprint> = Vec::new();
        for file in dependencies.iter().chain(discovered.iter()) {
            if fingerprints.iter().any(|f| &f.path == file) {
                continue;
            }
            match Fingerprint::of(file) {
                Ok(fingerprint) => fingerprints.push(fingerprint),
                Err(e) => debug!("Not fingerprinting {}: {}", file.display(), e),
            }
        }

        let entry = CacheEntry {
            key: key.to_string(),
            version: CACHE_VERSION.to_string(),
            dependencies: fingerprints,
            value,
        };
        if let Err(e) = self.write(&path, &entry) {
            warn!("Could not write cache entry {}: {}", path.display(), e);
        } else {
            self.stats.writes += 1;
        }
        Ok(entry.value)
    }

    /// Cache a resource analysis.
    ///
    /// Files of the resources it nests, and every file read while analyzing it (enum casts
    /// included), are added to the dependency set, so editing one of them invalidates the
    /// parent's entry.
    pub fn remember_resource<F>(
        &mut self,
        key: &str,
        dependencies: &[PathBuf],
        resolver: &mut ClassResolver,
        compute: F,
    ) -> Result<Option<ResourceStructure>>
    where
        F: FnOnce(&mut ClassResolver) -> Result<Option<ResourceStructure>>,
    {
        self.remember_with(key, dependencies, || {
            let (structure, mut nested_files) = resolver.track(|resolver| compute(resolver));
            let structure = structure?;
            if let Some(structure) = &structure {
                for nested in &structure.nested_resources {
                    match resolver.find_class(nested) {
                        Ok(Some(class)) => nested_files.push(class.path().to_path_buf()),
                        Ok(None) => {}
                        Err(e) => debug!("Nested resource {} not fingerprinted: {}", nested, e),
                    }
                }
            }
            Ok((structure, nested_files))
        })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(format!("{}:{}", CACHE_VERSION, key).as_bytes());
        self.dir.join(format!("{}.json", hex::encode(digest)))
    }

    /// `Ok(None)` for a missing or stale entry, `Err(CacheCorruption)` for an unreadable one
    fn lookup<T: DeserializeOwned>(
        &self,
        path: &Path,
        key: &str,
        dependencies: &[PathBuf],
    ) -> Result<Option<T>> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::CacheCorruption {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }
        };
        let entry: CacheEntry<T> =
            serde_json::from_str(&content).map_err(|e| Error::CacheCorruption {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        if entry.key != key || entry.version != CACHE_VERSION {
            return Ok(None);
        }
        let covers_requested = dependencies
            .iter()
            .all(|dep| entry.dependencies.iter().any(|f| &f.path == dep));
        if !covers_requested {
            return Ok(None);
        }
        if let Some(stale) = entry.dependencies.iter().find(|f| !f.is_current()) {
            debug!("{} changed since {} was cached", stale.path.display(), key);
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    fn write<T: Serialize>(&self, path: &Path, entry: &CacheEntry<T>) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        // each writer gets its own temporary file; the last rename wins
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer(&mut tmp, entry)?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class_resolver::resolver_for;
    use crate::resource_analyzer::ResourceAnalyzer;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let dep = dir.path().join("UserRequest.php");
        fs::write(&dep, "<?php class UserRequest {}").unwrap();
        (dir, dep)
    }

    #[test]
    fn test_second_call_is_served_from_cache() {
        let (dir, dep) = setup();
        let mut cache = DocumentationCache::new(dir.path().join("cache"), true);
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            Ok::<_, Error>(vec!["required".to_string(), "email".to_string()])
        };

        let first: Vec<String> = cache.remember("request:User", &[dep.clone()], compute).unwrap();
        let second: Vec<String> = cache.remember("request:User", &[dep.clone()], compute).unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.get(), 1);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().writes, 1);
    }

    #[test]
    fn test_changed_dependency_recomputes() {
        let (dir, dep) = setup();
        let mut cache = DocumentationCache::new(dir.path().join("cache"), true);
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            Ok::<_, Error>(calls.get())
        };

        assert_eq!(cache.remember("k", &[dep.clone()], compute).unwrap(), 1);
        fs::write(&dep, "<?php class UserRequest { public function rules() {} }").unwrap();
        assert_eq!(cache.remember("k", &[dep.clone()], compute).unwrap(), 2);
        // The recomputed entry replaced the stale one
        assert_eq!(cache.remember("k", &[dep.clone()], compute).unwrap(), 2);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_corrupted_entry_is_a_miss() {
        let (dir, dep) = setup();
        let mut cache = DocumentationCache::new(dir.path().join("cache"), true);
        fs::create_dir_all(dir.path().join("cache")).unwrap();
        fs::write(cache.entry_path("k"), "{not json").unwrap();

        let value: String = cache.remember("k", &[dep], || Ok("fresh".to_string())).unwrap();
        assert_eq!(value, "fresh");
        assert_eq!(cache.stats().corrupted, 1);
        assert_eq!(cache.stats().writes, 1);
    }

    #[test]
    fn test_interleaved_writers_leave_one_entry() {
        let (dir, dep) = setup();
        let cache_dir = dir.path().join("cache");
        let mut outer = DocumentationCache::new(cache_dir.clone(), true);

        let value: String = outer
            .remember("k", &[dep.clone()], || {
                // another run stores the same key while this one is still computing
                let mut inner = DocumentationCache::new(cache_dir.clone(), true);
                inner
                    .remember("k", &[dep.clone()], || Ok("inner".to_string()))
                    .map(|_: String| "outer".to_string())
            })
            .unwrap();
        assert_eq!(value, "outer");
        assert_eq!(fs::read_dir(&cache_dir).unwrap().count(), 1);

        let mut next = DocumentationCache::new(cache_dir, true);
        let cached: String = next.remember("k", &[dep], || Ok("recomputed".to_string())).unwrap();
        assert_eq!(cached, "outer");
    }

    #[test]
    fn test_disabled_cache_always_computes() {
        let (_dir, dep) = setup();
        let mut cache = DocumentationCache::disabled();
        let calls = Cell::new(0);
        for _ in 0..2 {
            let _: u8 = cache
                .remember("k", &[dep.clone()], || {
                    calls.set(calls.get() + 1);
                    Ok(0)
                })
                .unwrap();
        }
        assert_eq!(calls.get(), 2);
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn test_compute_error_is_not_cached() {
        let (dir, dep) = setup();
        let mut cache = DocumentationCache::new(dir.path().join("cache"), true);
        let err = cache
            .remember::<u8, _>("k", &[dep.clone()], || Err(Error::MissingClass("X".to_string())))
            .unwrap_err();
        assert_eq!(err.kind(), "missing_class");
        assert_eq!(cache.remember("k", &[dep], || Ok(7u8)).unwrap(), 7);
    }

    #[test]
    fn test_entry_roundtrip() {
        let (_dir, dep) = setup();
        let entry = CacheEntry {
            key: "resource:App\\Http\\Resources\\UserResource".to_string(),
            version: CACHE_VERSION.to_string(),
            dependencies: vec![Fingerprint::of(&dep).unwrap()],
            value: serde_json::json!({"id": {"type": "integer"}}),
        };
        let json = serde_json::to_string(&entry).unwrap();
        let back: CacheEntry<serde_json::Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_nested_resource_change_invalidates_parent() {
        let dir = TempDir::new().unwrap();
        let mut resolver = resolver_for(
            &dir,
            &[
                (
                    "app/Http/Resources/PostResource.php",
                    r#"<?php
namespace App\Http\Resources;
use Illuminate\Http\Resources\Json\JsonResource;
class PostResource extends JsonResource {
    public function toArray($request) {
        return ['id' => $this->id, 'author' => new UserResource($this->author)];
    }
}
"#,
                ),
                (
                    "app/Http/Resources/UserResource.php",
                    r#"<?php
namespace App\Http\Resources;
use Illuminate\Http\Resources\Json\JsonResource;
class UserResource extends JsonResource {
    public function toArray($request) { return ['id' => $this->id]; }
}
"#,
                ),
            ],
        );
        let post = dir.path().join("app/Http/Resources/PostResource.php");
        let user = dir.path().join("app/Http/Resources/UserResource.php");
        let mut cache = DocumentationCache::new(dir.path().join("cache"), true);
        let calls = Cell::new(0);
        let run = |cache: &mut DocumentationCache, resolver: &mut ClassResolver| {
            cache
                .remember_resource("resource:Post", &[post.clone()], resolver, |r| {
                    calls.set(calls.get() + 1);
                    ResourceAnalyzer::new(r).analyze("App\\Http\\Resources\\PostResource")
                })
                .unwrap()
                .unwrap()
        };

        let first = run(&mut cache, &mut resolver);
        assert_eq!(
            first.nested_resources,
            vec!["App\\Http\\Resources\\UserResource".to_string()]
        );
        run(&mut cache, &mut resolver);
        assert_eq!(calls.get(), 1);

        fs::write(
            &user,
            "<?php\nnamespace App\\Http\\Resources;\nclass UserResource extends \\Illuminate\\Http\\Resources\\Json\\JsonResource {}\n",
        )
        .unwrap();
        run(&mut cache, &mut resolver);
        assert_eq!(calls.get(), 2);
    }
}
