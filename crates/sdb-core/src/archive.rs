//! Zip packaging of multi-track results.
//!
//! Audio payloads are already compressed, so entries are stored as-is.

use std::{
    fs::File,
    io::{Cursor, Write},
    path::{Component, Path, PathBuf},
};

use zip::{write::FileOptions, CompressionMethod, ZipWriter};

use crate::{errors::Error, format::AudioFormat, Result};

/// File name of the archive sent to the user.
pub fn archive_file_name(format: AudioFormat) -> String {
    format!("spotify_download.{}.zip", format.as_str())
}

/// Zip `files` into an in-memory archive. Entry names are the paths relative
/// to `base_dir`, `/`-separated.
pub fn zip_files(base_dir: &Path, files: &[PathBuf]) -> Result<Vec<u8>> {
    let mut zw = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .large_file(true);

    for path in files {
        let name = entry_name(base_dir, path)?;
        zw.start_file(name, options)?;
        let mut f = File::open(path)?;
        std::io::copy(&mut f, &mut zw)?;
    }

    let mut cursor = zw.finish()?;
    cursor.flush()?;
    Ok(cursor.into_inner())
}

fn entry_name(base_dir: &Path, path: &Path) -> Result<String> {
    let rel = path.strip_prefix(base_dir).map_err(|_| Error::InvalidPath {
        path: path.to_path_buf(),
        reason: format!("not inside {}", base_dir.display()),
    })?;

    let mut parts: Vec<String> = Vec::new();
    for comp in rel.components() {
        match comp {
            Component::Normal(os) => parts.push(os.to_string_lossy().to_string()),
            Component::CurDir => {}
            _ => {
                return Err(Error::InvalidPath {
                    path: path.to_path_buf(),
                    reason: "unexpected path component".to_string(),
                })
            }
        }
    }

    if parts.is_empty() {
        return Err(Error::InvalidPath {
            path: path.to_path_buf(),
            reason: "empty entry name".to_string(),
        });
    }
    Ok(parts.join("/"))
}
