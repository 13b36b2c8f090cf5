//! Single-instance locking through a PID file, and stopping the process it names.

use anyhow::{bail, Context, Result};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidStatus {
    /// No PID file.
    Absent,
    /// The file exists but holds no usable pid.
    Empty,
    Running(Pid),
    /// The file names a process that no longer exists.
    Stale(Pid),
}

fn read_pid(path: &Path) -> Result<Option<Option<Pid>>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("reading {}", path.display()));
        }
    };
    // pid 0 and negatives would address process groups; never signal those.
    let pid = contents
        .lines()
        .next()
        .and_then(|l| l.trim().parse::<i32>().ok())
        .filter(|&p| p > 0)
        .map(Pid::from_raw);
    Ok(Some(pid))
}

fn is_alive(pid: Pid) -> bool {
    match kill(pid, None::<Signal>) {
        Ok(()) => true,
        // Exists, but owned by someone we may not signal.
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

pub fn status(path: &Path) -> Result<PidStatus> {
    Ok(match read_pid(path)? {
        None => PidStatus::Absent,
        Some(None) => PidStatus::Empty,
        Some(Some(pid)) if is_alive(pid) => PidStatus::Running(pid),
        Some(Some(pid)) => PidStatus::Stale(pid),
    })
}

/// Fail if the PID file names a live process.
pub fn ensure_not_running(path: &Path) -> Result<()> {
    if let PidStatus::Running(pid) = status(path)? {
        bail!("already running (pid {})", pid);
    }
    Ok(())
}

/// A PID file owned by this process, removed again on drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Record the current pid in `path`. A stale or empty file is replaced;
    /// a file naming a live process is an error.
    pub fn acquire(path: &Path) -> Result<Self> {
        match status(path)? {
            PidStatus::Running(pid) => bail!("already running (pid {})", pid),
            PidStatus::Stale(_) | PidStatus::Empty => {
                std::fs::remove_file(path)
                    .with_context(|| format!("removing stale {}", path.display()))?;
            }
            PidStatus::Absent => {}
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .with_context(|| format!("creating {}", path.display()))?;
        writeln!(file, "{}", Pid::this())
            .with_context(|| format!("writing {}", path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Send SIGTERM to the process named in `path` and remove the file.
///
/// The file is removed on every path that finds it, including when it is
/// empty or the signal cannot be delivered.
pub fn terminate(path: &Path) -> Result<Pid> {
    let pid = match read_pid(path)? {
        None => bail!("not running"),
        Some(None) => {
            let _ = std::fs::remove_file(path);
            bail!("nothing in {}", path.display());
        }
        Some(Some(pid)) => pid,
    };

    let sent = kill(pid, Signal::SIGTERM);
    let _ = std::fs::remove_file(path);
    sent.with_context(|| format!("error terminating pid {} from {}", pid, path.display()))?;
    Ok(pid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn dead_pid() -> Pid {
        let mut child = Command::new("true").spawn().unwrap();
        let pid = Pid::from_raw(child.id() as i32);
        child.wait().unwrap();
        pid
    }

    #[test]
    fn missing_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(status(&dir.path().join("mowz.pid")).unwrap(), PidStatus::Absent);
    }

    #[test]
    fn garbage_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mowz.pid");
        std::fs::write(&path, "not a pid\n").unwrap();
        assert_eq!(status(&path).unwrap(), PidStatus::Empty);
    }

    #[test]
    fn pid_zero_is_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mowz.pid");
        std::fs::write(&path, "0\n").unwrap();
        assert_eq!(status(&path).unwrap(), PidStatus::Empty);
    }

    #[test]
    fn own_pid_is_running() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mowz.pid");
        std::fs::write(&path, format!("{}\n", Pid::this())).unwrap();
        assert_eq!(status(&path).unwrap(), PidStatus::Running(Pid::this()));
        assert!(ensure_not_running(&path).is_err());
    }

    #[test]
    fn exited_pid_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mowz.pid");
        let pid = dead_pid();
        std::fs::write(&path, format!("{}\n", pid)).unwrap();
        assert_eq!(status(&path).unwrap(), PidStatus::Stale(pid));
        assert!(ensure_not_running(&path).is_ok());
    }

    #[test]
    fn acquire_writes_own_pid_and_drop_removes_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mowz.pid");
        {
            let pid_file = PidFile::acquire(&path).unwrap();
            assert_eq!(pid_file.path(), path.as_path());
            let contents = std::fs::read_to_string(&path).unwrap();
            assert_eq!(contents.trim(), Pid::this().to_string());
        }
        assert!(!path.exists());
    }

    #[test]
    fn acquire_refuses_live_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mowz.pid");
        std::fs::write(&path, format!("{}\n", Pid::this())).unwrap();
        assert!(PidFile::acquire(&path).is_err());
        // The other instance's file is left alone.
        assert!(path.exists());
    }

    #[test]
    fn acquire_replaces_stale_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mowz.pid");
        std::fs::write(&path, format!("{}\n", dead_pid())).unwrap();
        let _pid_file = PidFile::acquire(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim(), Pid::this().to_string());
    }

    #[test]
    fn terminate_without_file_is_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let err = terminate(&dir.path().join("mowz.pid")).unwrap_err();
        assert_eq!(err.to_string(), "not running");
    }

    #[test]
    fn terminate_empty_file_removes_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mowz.pid");
        std::fs::write(&path, "").unwrap();
        let err = terminate(&path).unwrap_err();
        assert!(err.to_string().starts_with("nothing in"));
        assert!(!path.exists());
    }

    #[test]
    fn terminate_dead_pid_fails_and_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mowz.pid");
        std::fs::write(&path, format!("{}\n", dead_pid())).unwrap();
        assert!(terminate(&path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn terminate_signals_live_process() {
        use std::os::unix::process::ExitStatusExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mowz.pid");
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        std::fs::write(&path, format!("{}\n", child.id())).unwrap();

        let pid = terminate(&path).unwrap();
        assert_eq!(pid.as_raw(), child.id() as i32);
        assert!(!path.exists());

        let exit = child.wait().unwrap();
        assert_eq!(exit.signal(), Some(Signal::SIGTERM as i32));
    }
}
