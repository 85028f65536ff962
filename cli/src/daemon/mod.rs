//! Daemon lifecycle: starting Gordon as a background service, finding out
//! whether one is already running, and stopping it gracefully.

pub mod client;
pub mod server;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonStatus {
    Running(u32),
    NotRunning,
    /// A PID file exists but the process it names is gone — a crash left
    /// it behind.
    Stale(u32),
}

pub fn pid_file_path(data_dir: &Path) -> PathBuf {
    data_dir.join("gordon.pid")
}

pub fn write_pid_file(data_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(data_dir)?;
    std::fs::write(pid_file_path(data_dir), std::process::id().to_string())
        .context("failed to write PID file")
}

pub fn remove_pid_file(data_dir: &Path) -> Result<()> {
    let path = pid_file_path(data_dir);
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

pub fn read_pid_file(data_dir: &Path) -> Option<u32> {
    std::fs::read_to_string(pid_file_path(data_dir))
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    // signal 0 performs no action but still fails if the process doesn't
    // exist or isn't ours to signal.
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    false
}

pub fn status(data_dir: &Path) -> DaemonStatus {
    match read_pid_file(data_dir) {
        Some(pid) if process_alive(pid) => DaemonStatus::Running(pid),
        Some(pid) => DaemonStatus::Stale(pid),
        None => DaemonStatus::NotRunning,
    }
}

#[cfg(unix)]
pub fn stop(data_dir: &Path) -> Result<()> {
    match status(data_dir) {
        DaemonStatus::Running(pid) => {
            let result = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
            if result != 0 {
                anyhow::bail!("failed to signal daemon process {pid}");
            }
            remove_pid_file(data_dir)?;
            Ok(())
        }
        DaemonStatus::Stale(_) => remove_pid_file(data_dir),
        DaemonStatus::NotRunning => anyhow::bail!("no running daemon found"),
    }
}

#[cfg(not(unix))]
pub fn stop(_data_dir: &Path) -> Result<()> {
    anyhow::bail!("daemon stop is only supported on Unix in this build")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_pid_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(status(dir.path()), DaemonStatus::NotRunning);

        write_pid_file(dir.path()).unwrap();
        assert_eq!(status(dir.path()), DaemonStatus::Running(std::process::id()));

        remove_pid_file(dir.path()).unwrap();
        assert_eq!(status(dir.path()), DaemonStatus::NotRunning);
    }

    #[test]
    fn detects_stale_pid_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(pid_file_path(dir.path()), "999999").unwrap();
        assert_eq!(status(dir.path()), DaemonStatus::Stale(999999));
    }
}
