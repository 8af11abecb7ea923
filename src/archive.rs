//! Zip packaging of stem files
//!
//! Entries are written straight into an archive file in the request
//! workspace. Already compressed entries (mp3) are stored as-is; lossless
//! entries are deflated.

use crate::error::{Result, StemsplitError};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// One archive entry as reported to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub name: String,
    pub size_bytes: u64,
}

impl ManifestEntry {
    /// Entry size in KiB, rounded to two decimals
    pub fn size_kb(&self) -> f64 {
        round2(self.size_bytes as f64 / 1024.0)
    }
}

/// Ordered list of archive entries, in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveManifest {
    entries: Vec<ManifestEntry>,
}

impl ArchiveManifest {
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Sum of uncompressed entry sizes
    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size_bytes).sum()
    }
}

/// Incrementally builds a zip archive on disk
pub struct ArchiveBuilder {
    path: PathBuf,
    writer: ZipWriter<File>,
    names: HashSet<String>,
    manifest: ArchiveManifest,
}

impl ArchiveBuilder {
    /// Create a new archive file at `path`
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: ZipWriter::new(file),
            names: HashSet::new(),
            manifest: ArchiveManifest::default(),
        })
    }

    /// Add a named entry; names must be unique within the archive
    pub fn add_entry(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        if name.is_empty() {
            return Err(StemsplitError::archive("Entry name must not be empty"));
        }
        if !self.names.insert(name.to_string()) {
            return Err(StemsplitError::archive(format!(
                "Duplicate entry name '{}'",
                name
            )));
        }

        let method = compression_for(name);
        let options = SimpleFileOptions::default()
            .compression_method(method)
            .large_file(bytes.len() as u64 >= u32::MAX as u64);

        self.writer
            .start_file(name, options)
            .map_err(|e| StemsplitError::archive(format!("Failed to start entry {}: {}", name, e)))?;
        self.writer.write_all(bytes)?;

        debug!("Archived {} ({} bytes, {:?})", name, bytes.len(), method);

        self.manifest.entries.push(ManifestEntry {
            name: name.to_string(),
            size_bytes: bytes.len() as u64,
        });
        Ok(())
    }

    /// Manifest of the entries added so far
    pub fn manifest(&self) -> &ArchiveManifest {
        &self.manifest
    }

    /// Write the central directory and return the archive bytes
    pub fn finalize(self) -> Result<(Vec<u8>, ArchiveManifest)> {
        let file = self
            .writer
            .finish()
            .map_err(|e| StemsplitError::archive(format!("Failed to finish archive: {}", e)))?;
        file.sync_all()?;
        drop(file);

        let bytes = fs::read(&self.path)?;
        Ok((bytes, self.manifest))
    }
}

/// Pick a compression method from the entry's extension
fn compression_for(name: &str) -> CompressionMethod {
    let compressed = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("mp3"))
        .unwrap_or(false);

    if compressed {
        CompressionMethod::Stored
    } else {
        CompressionMethod::Deflated
    }
}

/// Round to two decimal places
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
