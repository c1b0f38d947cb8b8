//! Input resolution: find the page images and prepare the working directory.
//!
//! Page order is the lexical order of file names, so `page_01.png` …
//! `page_10.png` sort correctly as long as the caller zero-pads. Each image
//! is decoded lazily, right before its page is processed, so a corrupt file
//! costs one page rather than the run.

use crate::error::Scan2DocError;
use image::DynamicImage;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File extensions accepted as page images (compared case-insensitively).
pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "tiff", "tif"];

/// Check if a path has a supported image extension.
pub fn is_page_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// List the page images directly inside `dir`, sorted by file name.
///
/// Sub-directories (including a previous run's region directory) are not
/// descended into.
pub fn discover_images(dir: &Path) -> Result<Vec<PathBuf>, Scan2DocError> {
    if !dir.is_dir() {
        return Err(Scan2DocError::InputDirNotFound {
            path: dir.to_path_buf(),
        });
    }

    let entries = std::fs::read_dir(dir).map_err(|_| Scan2DocError::InputDirNotFound {
        path: dir.to_path_buf(),
    })?;

    let mut images: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_page_image(p))
        .collect();
    images.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    info!("Found {} page images in {}", images.len(), dir.display());
    Ok(images)
}

/// Decode one page image.
pub fn load_page_image(path: &Path) -> Result<DynamicImage, String> {
    let img = image::open(path).map_err(|e| e.to_string())?;
    debug!(
        "Loaded {} → {}x{} px",
        path.display(),
        img.width(),
        img.height()
    );
    Ok(img)
}

/// Create the region-image directory, wiping leftovers first when `reset`.
pub fn prepare_regions_dir(dir: &Path, reset: bool) -> Result<(), Scan2DocError> {
    let fail = |source| Scan2DocError::WorkspaceFailed {
        path: dir.to_path_buf(),
        source,
    };
    if reset && dir.exists() {
        debug!("Clearing previous region images in {}", dir.display());
        std::fs::remove_dir_all(dir).map_err(fail)?;
    }
    std::fs::create_dir_all(dir).map_err(fail)
}

/// Reduce an uploaded file name to a safe single path component.
///
/// Keeps ASCII alphanumerics, `.`, `-`, `_` and non-ASCII letters (CJK names
/// are common for scanned documents); everything else becomes `_`. Leading
/// dots are stripped so the result is never hidden or a parent reference.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| {
            let keep = c.is_ascii_alphanumeric()
                || matches!(c, '.' | '-' | '_')
                || (!c.is_ascii() && c.is_alphanumeric());
            if keep {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// Write in-memory page images (name, bytes) into a fresh temp folder.
///
/// Names are sanitised and prefixed with their zero-padded position, so the
/// folder's lexical order is the order the images were given in. A `.json`
/// entry whose stem matches an image is staged as that image's layout
/// sidecar (`0002_scan.png` gets `0002_scan.json`); other entries without an
/// image extension are skipped. The folder is removed when the returned
/// guard drops.
pub fn stage_images(files: &[(String, Vec<u8>)]) -> Result<tempfile::TempDir, Scan2DocError> {
    let dir = tempfile::tempdir().map_err(|e| Scan2DocError::Internal(format!("tempdir: {e}")))?;

    let sidecars: HashMap<String, &[u8]> = files
        .iter()
        .filter_map(|(name, bytes)| {
            let name = sanitize_file_name(name);
            let path = Path::new(&name);
            let is_json = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("json"));
            let stem = path.file_stem()?.to_str()?.to_string();
            is_json.then_some((stem, bytes.as_slice()))
        })
        .collect();

    let mut staged = 0;
    for (i, (name, bytes)) in files.iter().enumerate() {
        let name = sanitize_file_name(name);
        let path = Path::new(&name);
        if !is_page_image(path) {
            debug!("Not staging '{}' as a page", name);
            continue;
        }
        let target = dir.path().join(format!("{:04}_{}", i + 1, name));
        write_staged(&target, bytes)?;

        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        if let Some(json) = sidecars.get(stem) {
            write_staged(&target.with_extension("json"), json)?;
        }
        staged += 1;
    }

    info!(
        "Staged {} of {} uploaded files ({} layout sidecars)",
        staged,
        files.len(),
        sidecars.len()
    );
    Ok(dir)
}

fn write_staged(path: &Path, bytes: &[u8]) -> Result<(), Scan2DocError> {
    std::fs::write(path, bytes).map_err(|source| Scan2DocError::WorkspaceFailed {
        path: path.to_path_buf(),
        source,
    })
}
