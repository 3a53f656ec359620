//! TOML-backed entry store: the configuration provider for the ranking core.
//!
//! Every `*.toml` file under the entries directory is a table of
//! `key -> { cmd | cli_cmd | url | file | snippet, description, tags, created_at, position }`.
//! Files are read in sorted path order and keys within a file in sorted order,
//! which fixes the catalog order used for ranking tie-breaks.
use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::error::Error;
use crate::traits::EntryProvider;
use crate::types::{Entry, EntryCatalog, RawEntry};

/// File that captured entries are written to.
pub const CAPTURED_FILE: &str = "captured.toml";

pub struct TomlEntryStore {
    dir: PathBuf,
    cached: Mutex<Option<EntryCatalog>>,
}

impl TomlEntryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), cached: Mutex::new(None) }
    }

    pub fn dir(&self) -> &Path { &self.dir }

    /// Parse every entry file. Any unreadable file makes the whole catalog
    /// unavailable; a half-loaded catalog would silently drop entries.
    pub fn read_catalog(&self) -> Result<EntryCatalog> {
        let files = self.list_toml_files()?;
        let mut entries = Vec::new();
        let mut origin: HashMap<String, PathBuf> = HashMap::new();
        for file_path in &files {
            let parsed = self.read_file(file_path)?;
            for (key, raw) in parsed {
                if let Some(first) = origin.get(&key) {
                    return Err(Error::DuplicateKey { key, first: first.display().to_string() }.into());
                }
                origin.insert(key.clone(), file_path.clone());
                entries.push(Entry::from_raw(key, raw));
            }
        }
        tracing::debug!(files = files.len(), entries = entries.len(), dir = %self.dir.display(), "loaded entry catalog");
        Ok(EntryCatalog::new(entries))
    }

    /// Add a new entry to the captured-entries file. Keys must be unique across
    /// the whole store.
    pub fn insert(&self, key: &str, raw: RawEntry) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| unavailable(&self.dir, e))?;
        let catalog = self.read_catalog()?;
        if catalog.contains(key) {
            return Err(Error::DuplicateKey { key: key.to_string(), first: self.dir.display().to_string() }.into());
        }
        let path = self.dir.join(CAPTURED_FILE);
        let mut captured = if path.exists() { self.read_file(&path)? } else { BTreeMap::new() };
        captured.insert(key.to_string(), raw);
        let body = toml::to_string(&captured).context("serialize captured entries")?;
        let tmp = path.with_extension("toml.tmp");
        fs::write(&tmp, body).with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("rename into {}", path.display()))?;
        tracing::info!(key, file = %path.display(), "stored new entry");
        self.invalidate();
        Ok(())
    }

    fn invalidate(&self) {
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn read_file(&self, file_path: &Path) -> Result<BTreeMap<String, RawEntry>> {
        let content = match fs::read_to_string(file_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                String::from_utf8_lossy(&fs::read(file_path).map_err(|e| unavailable(file_path, e))?).to_string()
            }
            Err(e) => return Err(unavailable(file_path, e).into()),
        };
        toml::from_str(&content).map_err(|e| {
            Error::ConfigurationUnavailable(format!("{}: {}", file_path.display(), e)).into()
        })
    }

    fn list_toml_files(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.is_dir() {
            return Err(Error::ConfigurationUnavailable(format!(
                "entries directory {} does not exist",
                self.dir.display()
            ))
            .into());
        }
        let mut toml_files = Vec::new();
        for entry in walkdir::WalkDir::new(&self.dir).follow_links(true) {
            let entry = entry.map_err(|e| {
                let at = e.path().unwrap_or(&self.dir).display().to_string();
                Error::ConfigurationUnavailable(format!("{at}: {e}"))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some("toml") { toml_files.push(path.to_path_buf()); }
        }
        toml_files.sort();
        Ok(toml_files)
    }
}

fn unavailable(path: &Path, e: std::io::Error) -> Error {
    Error::ConfigurationUnavailable(format!("{}: {}", path.display(), e))
}

impl EntryProvider for TomlEntryStore {
    fn load_config(&self) -> Result<EntryCatalog> {
        if let Some(catalog) = self.cached.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            return Ok(catalog.clone());
        }
        self.reload()
    }

    fn reload(&self) -> Result<EntryCatalog> {
        let catalog = self.read_catalog()?;
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = Some(catalog.clone());
        Ok(catalog)
    }
}
