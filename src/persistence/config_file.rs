use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use tracing::debug;

use crate::constants::TMP_FILENAME_EXT;
use crate::Result;
use crate::StorageError;

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(TMP_FILENAME_EXT);
    PathBuf::from(name)
}

fn path_error(
    path: &Path,
    source: std::io::Error,
) -> StorageError {
    StorageError::PathError {
        path: path.to_path_buf(),
        source,
    }
}

/// Atomically replaces the config text file at `path`.
///
/// The text goes to a `.tmp` sibling, is fsynced, and is then renamed over
/// `path`; readers see either the old or the new file.
pub fn write_config_file(
    path: &Path,
    text: &str,
) -> Result<()> {
    let tmp = tmp_sibling(path);

    let mut file = File::create(&tmp).map_err(|e| path_error(&tmp, e))?;
    file.write_all(text.as_bytes()).map_err(|e| path_error(&tmp, e))?;
    file.sync_all().map_err(|e| path_error(&tmp, e))?;
    drop(file);

    std::fs::rename(&tmp, path).map_err(|e| path_error(path, e))?;
    debug!("wrote config file {} ({} bytes)", path.display(), text.len());
    Ok(())
}
