use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// `<target>.lock`, the advisory lock file guarding `target`.
pub fn lock_path_for(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("autohosts"));
    name.push(".lock");
    target.with_file_name(name)
}

fn parent_dir(target: &Path) -> PathBuf {
    target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn write_atomic_blocking(target: &Path, content: &[u8]) -> std::io::Result<()> {
    let dir = parent_dir(target);
    std::fs::create_dir_all(&dir)?;

    // 每個 writer 各自的暫存檔，同目錄才能 rename
    let mut temp = NamedTempFile::new_in(&dir)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    {
        use std::os::unix::fs::PermissionsExt;
        temp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))?;
    }
    temp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

/// Whole-file replace: write a uniquely named temp file next to `target`,
/// fsync, rename over `target`.
///
/// Readers see either the previous generation or the new one, never a
/// truncated mix, even with several writers racing. Parent directories are
/// created as needed.
pub async fn write_atomic(target: &Path, content: &[u8]) -> std::io::Result<()> {
    let target = target.to_path_buf();
    let content = content.to_vec();
    tokio::task::spawn_blocking(move || write_atomic_blocking(&target, &content))
        .await
        .map_err(std::io::Error::other)?
}

/// Exclusive `flock(2)` on a lock file, released on drop.
///
/// The lock belongs to the open file description, so it excludes other
/// processes and other `FileLock`s in this process alike.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    fn open(path: &Path) -> std::io::Result<File> {
        std::fs::create_dir_all(parent_dir(path))?;
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
    }

    fn flock(file: &File, operation: libc::c_int) -> std::io::Result<()> {
        // SAFETY: fd 由 `file` 持有，在呼叫期間有效
        let rc = unsafe { libc::flock(file.as_raw_fd(), operation) };
        if rc == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }

    /// Blocks until the lock is held.
    pub fn acquire(path: &Path) -> std::io::Result<Self> {
        let file = Self::open(path)?;
        Self::flock(&file, libc::LOCK_EX)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// `None` when someone else holds the lock.
    pub fn try_acquire(path: &Path) -> std::io::Result<Option<Self>> {
        let file = Self::open(path)?;
        match Self::flock(&file, libc::LOCK_EX | libc::LOCK_NB) {
            Ok(()) => Ok(Some(Self {
                file,
                path: path.to_path_buf(),
            })),
            Err(e) if e.raw_os_error() == Some(libc::EWOULDBLOCK) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// `acquire` off the async runtime.
    pub async fn lock(path: &Path) -> std::io::Result<Self> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::acquire(&path))
            .await
            .map_err(std::io::Error::other)?
    }

    pub async fn try_lock(path: &Path) -> std::io::Result<Option<Self>> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::try_acquire(&path))
            .await
            .map_err(std::io::Error::other)?
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = Self::flock(&self.file, libc::LOCK_UN) {
            tracing::debug!("Cannot unlock {}: {}", self.path.display(), e);
        }
    }
}
