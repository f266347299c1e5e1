//! Writing a message to its resolved path.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::error::{Result, SinkError};

/// Write `data` verbatim to `path`, creating or truncating it.
///
/// On Unix the file is created with mode `0666` before the umask.
pub fn write_artifact(path: &Path, data: &[u8]) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o666);
    }

    let mut file = options.open(path).map_err(|e| SinkError::io(path, e))?;
    file.write_all(data).map_err(|e| SinkError::io(path, e))?;
    Ok(())
}
