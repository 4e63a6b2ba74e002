use std::fs;
use std::io;
use std::path::Path;

pub fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Writes `contents` to `staging` then renames it over `path`, so readers see
/// either the old or the new file.
pub fn replace_file(staging: &Path, path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = staging.parent() {
        fs::create_dir_all(parent)?;
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(staging, contents)?;
    if let Err(err) = fs::rename(staging, path) {
        let _ = remove_file_if_exists(staging);
        return Err(err);
    }
    Ok(())
}
