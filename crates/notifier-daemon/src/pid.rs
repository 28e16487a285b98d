//! PID file handling for `start`, `stop` and `status`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

/// Location of the running daemon's PID.
#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<runtime dir>/user-notifier/daemon.pid`, falling back to the cache
    /// dir and then `/tmp`.
    pub fn default_location() -> Self {
        let base = directories::BaseDirs::new()
            .map(|dirs| {
                #[cfg(unix)]
                {
                    dirs.runtime_dir()
                        .map(|p| p.to_path_buf())
                        .unwrap_or_else(|| dirs.cache_dir().to_path_buf())
                }
                #[cfg(not(unix))]
                {
                    dirs.cache_dir().to_path_buf()
                }
            })
            .unwrap_or_else(|| PathBuf::from("/tmp"));

        Self::new(base.join("user-notifier").join("daemon.pid"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write this process's PID.
    pub fn write(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&self.path, std::process::id().to_string())
            .with_context(|| format!("Failed to write PID file {}", self.path.display()))?;
        info!("Wrote PID file: {:?}", self.path);
        Ok(())
    }

    pub fn read(&self) -> Option<u32> {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    pub fn remove(&self) {
        if self.path.exists() {
            if let Err(e) = fs::remove_file(&self.path) {
                warn!("Failed to remove PID file: {}", e);
            } else {
                info!("Removed PID file");
            }
        }
    }
}

/// Check if a process is running
#[cfg(unix)]
pub fn is_process_running(pid: u32) -> bool {
    // Signal 0 only checks that the process exists.
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(not(unix))]
pub fn is_process_running(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_location() {
        let pid_file = PidFile::default_location();
        assert!(pid_file.path().ends_with("daemon.pid"));
        assert!(pid_file
            .path()
            .parent()
            .unwrap()
            .to_string_lossy()
            .contains("user-notifier"));
    }

    #[test]
    fn test_write_read_remove() {
        let dir = TempDir::new().unwrap();
        let pid_file = PidFile::new(dir.path().join("nested").join("daemon.pid"));

        assert_eq!(pid_file.read(), None);

        pid_file.write().unwrap();
        assert_eq!(pid_file.read(), Some(std::process::id()));

        pid_file.remove();
        assert!(!pid_file.path().exists());
        assert_eq!(pid_file.read(), None);
    }

    #[test]
    fn test_garbage_pid_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("daemon.pid");
        fs::write(&path, "not-a-pid").unwrap();

        assert_eq!(PidFile::new(path).read(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_current_process_is_running() {
        assert!(is_process_running(std::process::id()));
    }
}
