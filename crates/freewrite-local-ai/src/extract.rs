//! Zip extraction and normalisation of model archives.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use tracing::{debug, info};

use crate::error::LocalAIError;

/// Folder that macOS' archiver adds next to the real content.
const MACOS_METADATA_DIR: &str = "__MACOSX";

/// Unpack `archive` into `dest` and flatten a single wrapping folder.
///
/// `marker` is the file expected at the root of a usable model; when it is
/// already present at `dest` after unpacking, the layout is left untouched.
pub fn extract_archive(archive: &Path, dest: &Path, marker: &str) -> Result<(), LocalAIError> {
    info!("Extracting {:?} into {:?}", archive, dest);

    fs::create_dir_all(dest)?;

    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)?;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;

        // Skip entries that would land outside `dest`.
        let Some(relative) = entry.enclosed_name() else {
            debug!("Skipping unsafe archive entry {}", entry.name());
            continue;
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
        } else {
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&out_path)?;
            io::copy(&mut entry, &mut out)?;
        }
    }

    debug!("Extracted {} entries", zip.len());

    flatten_single_root(dest, marker)
}

/// Whether a top-level entry is archiver metadata rather than model content.
pub fn is_platform_metadata(name: &str) -> bool {
    name == MACOS_METADATA_DIR || name.starts_with('.')
}

/// Move the children of a lone wrapping directory up into `dest`.
pub fn flatten_single_root(dest: &Path, marker: &str) -> Result<(), LocalAIError> {
    if dest.join(marker).exists() {
        return Ok(());
    }

    let mut relevant = Vec::new();
    let mut metadata = Vec::new();
    for entry in fs::read_dir(dest)? {
        let entry = entry?;
        let name = entry.file_name();
        if is_platform_metadata(&name.to_string_lossy()) {
            metadata.push(entry.path());
        } else {
            relevant.push(entry);
        }
    }

    let [nested] = relevant.as_slice() else {
        return Ok(());
    };
    if !nested.file_type()?.is_dir() {
        return Ok(());
    }

    debug!("Flattening nested directory {:?}", nested.path());

    // Move the wrapper aside first: it may hold a child with its own name.
    let nested_dir = holding_dir(dest, &nested.path());
    fs::rename(nested.path(), &nested_dir)?;

    for child in fs::read_dir(&nested_dir)? {
        let child = child?;
        let target = dest.join(child.file_name());
        if target.exists() {
            remove_path(&target)?;
        }
        fs::rename(child.path(), &target)?;
    }

    fs::remove_dir_all(&nested_dir)?;
    for path in metadata {
        if path.file_name().is_some_and(|name| name == MACOS_METADATA_DIR) {
            remove_path(&path)?;
        }
    }

    Ok(())
}

/// A name in `dest` that clashes with neither `dest` nor the children of `nested`.
fn holding_dir(dest: &Path, nested: &Path) -> std::path::PathBuf {
    let mut attempt = 0;
    loop {
        let name = format!(".flatten-{}", attempt);
        if !dest.join(&name).exists() && !nested.join(&name).exists() {
            return dest.join(name);
        }
        attempt += 1;
    }
}

/// Remove a file or directory, treating a missing path as success.
pub fn remove_path(path: &Path) -> io::Result<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) => Err(e),
    };

    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
