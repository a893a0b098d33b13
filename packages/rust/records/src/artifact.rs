use std::path::{Path, PathBuf};

use tracing::debug;

use curator_shared::{CuratorError, Result};

/// Replace `path` with `contents` by writing a sibling temp file and renaming it.
///
/// The target is never left half-written; on failure the temp file is removed.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| CuratorError::io(&dir, e))?;

    let file_name = path
        .file_name()
        .ok_or_else(|| CuratorError::validation(format!("{} has no file name", path.display())))?;
    let temp = dir.join(format!(".{}.tmp", file_name.to_string_lossy()));

    std::fs::write(&temp, contents).map_err(|e| CuratorError::io(&temp, e))?;
    if let Err(e) = std::fs::rename(&temp, path) {
        let _ = std::fs::remove_file(&temp);
        return Err(CuratorError::io(path, e));
    }

    debug!(path = %path.display(), size = contents.len(), "wrote file");
    Ok(())
}

/// Write a text artifact named `file_name` into `dir`.
pub fn write_artifact(dir: &Path, file_name: &str, contents: &str) -> Result<PathBuf> {
    let target = dir.join(file_name);
    write_atomic(&target, contents.as_bytes())?;
    Ok(target)
}
