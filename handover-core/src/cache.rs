//! Content-addressed round cache.
//!
//! Keys are derived from file bytes, never sizes: the analysis fingerprint
//! hashes every discovered file's content (sorted by path, so reordering the
//! file list changes nothing), and each round hash chains the fingerprint
//! with every upstream round hash in declared order. Any upstream edit
//! therefore invalidates all downstream rounds deterministically.
//!
//! Entries carry a version tag; a version mismatch on open discards the
//! whole cache once and emits a single migration notice. Read and write
//! failures degrade to cache misses and skipped writes.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::HandoverConfig;
use crate::error::CacheError;
use crate::types::{FileEntry, Round, RoundStatus};

/// Bump when the entry layout changes; old caches are cleared on sight.
pub const CACHE_VERSION: u32 = 2;

const VERSION_MARKER: &str = "VERSION";

/// One cached round output, keyed by `{round, model, fingerprint}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub version: u32,
    pub round: Round,
    pub model: String,
    /// The round hash this entry was written under.
    pub fingerprint: String,
    pub status: RoundStatus,
    pub output: serde_json::Value,
    pub written_at: DateTime<Utc>,
}

/// SHA-256 fingerprint over the discovered file set.
///
/// Each file contributes `path:sha256(bytes)`; files are sorted by path so
/// the fingerprint is independent of discovery order, and editing any byte
/// of any file changes it.
pub fn analysis_fingerprint(files: &[FileEntry]) -> String {
    let mut hashed: Vec<(String, String)> = files
        .par_iter()
        .map(|file| {
            let digest = match std::fs::read(&file.abs_path) {
                Ok(bytes) => hex(&Sha256::digest(&bytes)),
                Err(_) => "unreadable".to_string(),
            };
            (file.path.clone(), digest)
        })
        .collect();
    hashed.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = Sha256::new();
    for (path, digest) in &hashed {
        hasher.update(path.as_bytes());
        hasher.update(b":");
        hasher.update(digest.as_bytes());
        hasher.update(b"\n");
    }
    hex(&hasher.finalize())
}

/// Cascade hash for one round: the analysis fingerprint plus the output
/// hash of every upstream round in declared order. Any change to an
/// upstream round's output therefore changes every downstream round's key.
pub fn round_hash(round: Round, model: &str, fingerprint: &str, prior_hashes: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("round:{}\n", round.number()));
    hasher.update(format!("model:{model}\n"));
    hasher.update(format!("analysis:{fingerprint}\n"));
    for prior in prior_hashes {
        hasher.update(format!("prior:{prior}\n"));
    }
    hex(&hasher.finalize())
}

/// Hash of a round's output. `serde_json::Value` objects serialize with
/// sorted keys, so the digest is stable across runs and platforms.
pub fn output_hash(output: &serde_json::Value) -> String {
    let serialized = serde_json::to_string(output).unwrap_or_default();
    hex(&Sha256::digest(serialized.as_bytes()))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Cache read policy. `no-cache` skips reads but still writes, so the next
/// normal run sees a warm cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    ReadWrite,
    WriteOnly,
}

#[derive(Debug)]
pub struct RoundCache {
    dir: PathBuf,
    repo_root: PathBuf,
    mode: CacheMode,
    /// Set when opening found an older version and cleared the store.
    pub migration: Option<(u32, u32)>,
}

impl RoundCache {
    /// Open (and if necessary migrate) the cache under the repo root.
    pub fn open(repo_root: &Path, config: &HandoverConfig) -> Self {
        let dir = repo_root.join(&config.cache.dir);
        let mode = if config.cache.no_cache {
            CacheMode::WriteOnly
        } else {
            CacheMode::ReadWrite
        };

        let mut migration = None;
        let marker = dir.join(VERSION_MARKER);
        if let Ok(text) = std::fs::read_to_string(&marker) {
            match text.trim().parse::<u32>() {
                Ok(found) if found == CACHE_VERSION => {}
                Ok(found) => {
                    info!(from = found, to = CACHE_VERSION, "Cache version changed, clearing");
                    let _ = std::fs::remove_dir_all(&dir);
                    migration = Some((found, CACHE_VERSION));
                }
                Err(_) => {
                    warn!("Unreadable cache version marker, clearing");
                    let _ = std::fs::remove_dir_all(&dir);
                    migration = Some((0, CACHE_VERSION));
                }
            }
        }

        Self {
            dir,
            repo_root: repo_root.to_path_buf(),
            mode,
            migration,
        }
    }

    fn entry_path(&self, round: Round, model: &str, hash: &str) -> PathBuf {
        let model_slug: String = model
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        self.dir
            .join(format!("round-{}-{model_slug}-{}.json", round.number(), &hash[..32.min(hash.len())]))
    }

    /// Load a cached entry; any failure is a miss.
    pub fn load(&self, round: Round, model: &str, hash: &str) -> Option<CacheEntry> {
        if self.mode == CacheMode::WriteOnly {
            return None;
        }
        let path = self.entry_path(round, model, hash);
        let text = std::fs::read_to_string(&path).ok()?;
        let entry: CacheEntry = match serde_json::from_str(&text) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt cache entry ignored");
                return None;
            }
        };
        if entry.version != CACHE_VERSION || entry.fingerprint != hash || entry.model != model {
            return None;
        }
        debug!(round = round.number(), "Cache hit");
        Some(entry)
    }

    /// Write an entry (ok or degraded, so reruns are stable). Failures are
    /// logged and swallowed: a broken cache never breaks the pipeline.
    pub fn store(
        &self,
        round: Round,
        model: &str,
        hash: &str,
        status: RoundStatus,
        output: &serde_json::Value,
    ) {
        let first_write = !self.dir.exists();
        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            warn!(error = %e, "Cannot create cache directory, skipping write");
            return;
        }
        if first_write {
            self.append_gitignore();
        }

        let marker = self.dir.join(VERSION_MARKER);
        if !marker.exists() {
            let _ = std::fs::write(&marker, format!("{CACHE_VERSION}\n"));
        }

        let entry = CacheEntry {
            version: CACHE_VERSION,
            round,
            model: model.to_string(),
            fingerprint: hash.to_string(),
            status,
            output: output.clone(),
            written_at: Utc::now(),
        };
        let path = self.entry_path(round, model, hash);
        match serde_json::to_string_pretty(&entry) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&path, json) {
                    warn!(path = %path.display(), error = %e, "Cache write failed");
                }
            }
            Err(e) => warn!(error = %e, "Cache entry serialization failed"),
        }
    }

    /// Remove every entry and the version marker.
    pub fn flush(&self) -> crate::error::Result<()> {
        if self.dir.exists() {
            std::fs::remove_dir_all(&self.dir)
                .map_err(|e| crate::error::HandoverError::Cache(CacheError::Io(e)))?;
        }
        Ok(())
    }

    /// Number of stored entries.
    pub fn entry_count(&self) -> usize {
        std::fs::read_dir(&self.dir)
            .map(|entries| {
                entries
                    .flatten()
                    .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Add the cache directory to the repo's `.gitignore` on first write.
    fn append_gitignore(&self) {
        let Some(dir_name) = self.dir.file_name().map(|n| n.to_string_lossy().to_string())
        else {
            return;
        };
        let line = format!("{dir_name}/");
        let gitignore = self.repo_root.join(".gitignore");
        let existing = std::fs::read_to_string(&gitignore).unwrap_or_default();
        if existing.lines().any(|l| l.trim() == line || l.trim() == dir_name) {
            return;
        }
        let mut updated = existing;
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push('\n');
        }
        updated.push_str(&line);
        updated.push('\n');
        if let Err(e) = std::fs::write(&gitignore, updated) {
            warn!(error = %e, "Cannot update .gitignore");
        }
    }
}
