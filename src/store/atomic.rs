use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);
const TEMP_PREFIX: &str = ".strata.tmp.";

/// Write-then-rename so a crashed run never leaves a half-written store
/// document behind. The temp file lives in the target's parent directory
/// so the final rename stays on one filesystem.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("`{}` has no parent directory", path.display()),
        )
    })?;
    fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid target filename"))?;
    let seq = WRITE_SEQ.fetch_add(1, Ordering::Relaxed);
    let tmp = parent.join(format!("{TEMP_PREFIX}{}.{seq}.{file_name}", std::process::id()));

    match write_and_swap(&tmp, path, parent, bytes) {
        Ok(()) => Ok(()),
        Err(err) => {
            let _ = fs::remove_file(&tmp);
            Err(err)
        }
    }
}

fn write_and_swap(tmp: &PathBuf, path: &Path, parent: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().create_new(true).write(true).open(tmp)?;
    file.write_all(bytes)?;
    file.flush()?;
    file.sync_all()?;
    drop(file);

    if let Err(err) = fs::rename(tmp, path) {
        // Windows refuses to rename over an existing file.
        if path.exists() {
            fs::remove_file(path)?;
            fs::rename(tmp, path)?;
        } else {
            return Err(err);
        }
    }
    sync_dir(parent)
}

#[cfg(unix)]
fn sync_dir(parent: &Path) -> io::Result<()> {
    File::open(parent)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_parent: &Path) -> io::Result<()> {
    Ok(())
}
