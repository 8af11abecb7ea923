//! Separation model file management
//!
//! Locates the ONNX model for a stem count and, when a download URL is
//! configured, fetches missing models into the cache directory.

use crate::error::{Result, StemsplitError};
use crate::types::StemCount;
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};
#[cfg(feature = "onnx")]
use tracing::{debug, info, warn};

/// Model filename for a stem count
pub fn model_filename(stems: StemCount) -> String {
    format!("spleeter-{}.onnx", stems)
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "stemsplit", "stemsplit")
}

/// Candidate locations for a model file, in search order
///
/// 1. Explicit model directory (`--model-dir` / `STEMSPLIT_MODEL_DIR`)
/// 2. ProjectDirs cache: ~/.cache/stemsplit/models (Linux)
/// 3. ProjectDirs data: ~/.local/share/stemsplit/models (Linux)
/// 4. Current directory: ./models
pub fn candidate_paths(model_dir: Option<&Path>, stems: StemCount) -> Vec<PathBuf> {
    let filename = model_filename(stems);
    let mut candidates = Vec::new();

    if let Some(dir) = model_dir {
        candidates.push(dir.join(&filename));
    }

    if let Some(proj_dirs) = project_dirs() {
        candidates.push(proj_dirs.cache_dir().join("models").join(&filename));
        candidates.push(proj_dirs.data_dir().join("models").join(&filename));
    }

    candidates.push(PathBuf::from("./models").join(&filename));
    candidates
}

/// Find an existing model file, or download it if a base URL is configured
pub fn find_model_path(
    model_dir: Option<&Path>,
    model_url: Option<&str>,
    stems: StemCount,
) -> Result<PathBuf> {
    let candidates = candidate_paths(model_dir, stems);

    if let Some(found) = candidates.iter().find(|p| p.is_file()) {
        return Ok(found.clone());
    }

    if let Some(base_url) = model_url {
        return ensure_model(base_url, stems);
    }

    let locations_list = candidates
        .iter()
        .map(|loc| format!("  - {}", loc.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(StemsplitError::model_load(
        stems.count(),
        format!(
            "{} not found.\n\nLocations checked:\n{}\n\n\
             Set STEMSPLIT_MODEL_DIR, or STEMSPLIT_MODEL_URL to download it",
            model_filename(stems),
            locations_list
        ),
    ))
}

/// Get the model cache directory, creating it if needed
pub fn cache_dir() -> Result<PathBuf> {
    let proj_dirs = project_dirs().ok_or_else(|| {
        StemsplitError::Config("Could not determine cache directory".to_string())
    })?;

    let cache_dir = proj_dirs.cache_dir().join("models");
    fs::create_dir_all(&cache_dir)?;
    Ok(cache_dir)
}

/// Download URL for a model under a base URL
pub fn model_url(base_url: &str, stems: StemCount) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), model_filename(stems))
}

/// Download the model into the cache directory
#[cfg(feature = "onnx")]
pub fn ensure_model(base_url: &str, stems: StemCount) -> Result<PathBuf> {
    let dest = cache_dir()?.join(model_filename(stems));
    let url = model_url(base_url, stems);

    info!("Downloading {} from {}", model_filename(stems), url);
    download_model(&url, &dest, stems)?;

    match fetch_expected_hash(&format!("{}.sha256", url)) {
        Some(expected) => {
            if !verify_model_hash(&dest, &expected)? {
                fs::remove_file(&dest).ok();
                return Err(StemsplitError::model_load(
                    stems.count(),
                    "Downloaded model hash verification failed",
                ));
            }
            debug!("Model hash verified");
        }
        None => warn!("No checksum published for {}, skipping verification", url),
    }

    Ok(dest)
}

#[cfg(not(feature = "onnx"))]
pub fn ensure_model(_base_url: &str, stems: StemCount) -> Result<PathBuf> {
    Err(StemsplitError::model_load(
        stems.count(),
        "Model download requires the 'onnx' feature",
    ))
}

/// Stream a model to disk through a temp file, then rename into place
#[cfg(feature = "onnx")]
fn download_model(url: &str, dest: &Path, stems: StemCount) -> Result<()> {
    use std::io::Write;

    let mut response = reqwest::blocking::get(url).map_err(|e| {
        StemsplitError::model_load(stems.count(), format!("Failed to download model: {}", e))
    })?;

    if !response.status().is_success() {
        return Err(StemsplitError::model_load(
            stems.count(),
            format!("Model download failed with status: {}", response.status()),
        ));
    }

    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    let bytes = response.copy_to(&mut temp).map_err(|e| {
        StemsplitError::model_load(stems.count(), format!("Failed to read model data: {}", e))
    })?;
    temp.flush()?;
    temp.persist(dest).map_err(|e| StemsplitError::Io(e.error))?;

    info!(
        "Model downloaded to {} ({:.1} MB)",
        dest.display(),
        bytes as f64 / (1024.0 * 1024.0)
    );
    Ok(())
}

/// Fetch a published `<sha256>  <file>` checksum, if the server has one
#[cfg(feature = "onnx")]
fn fetch_expected_hash(url: &str) -> Option<String> {
    let response = reqwest::blocking::get(url).ok()?;
    if !response.status().is_success() {
        return None;
    }
    let body = response.text().ok()?;
    body.split_whitespace()
        .next()
        .filter(|h| h.len() == 64 && h.chars().all(|c| c.is_ascii_hexdigit()))
        .map(|h| h.to_lowercase())
}

/// Verify the SHA-256 hash of a model file
#[cfg(feature = "onnx")]
fn verify_model_hash(path: &Path, expected_hash: &str) -> Result<bool> {
    use sha2::{Digest, Sha256};
    use std::io::Read;

    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    let actual_hash = hex::encode(hasher.finalize());
    let matches = actual_hash == expected_hash;

    if !matches {
        warn!(
            "Model hash mismatch: expected {}, got {}",
            expected_hash, actual_hash
        );
    }

    Ok(matches)
}
