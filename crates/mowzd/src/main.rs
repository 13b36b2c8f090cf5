mod emitter;
mod engine;
mod keyboard;

use anyhow::{Context, Result};
use clap::Parser;
use mowz_core::config::Config;
use mowz_core::pidfile::{self, PidFile};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};

/// Rotated log files kept next to the current one.
const KEPT_LOG_FILES: usize = 7;

#[derive(Parser)]
#[command(name = "mowzd", about = "Move the mouse pointer with the keyboard")]
struct Args {
    /// Config file to load instead of the default location
    #[arg(long)]
    config: Option<PathBuf>,
    /// Keyboard evdev node, overriding the config and auto-detection
    #[arg(long)]
    keyboard: Option<PathBuf>,
    /// Fork into the background and log to the configured log file
    #[arg(long)]
    detach: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if !nix::unistd::geteuid().is_root() {
        anyhow::bail!("run as root");
    }

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load().context("loading config")?,
    };
    if let Some(keyboard) = args.keyboard {
        config.device.keyboard = Some(keyboard);
    }

    // Everything that can fail on setup happens while stderr is still the
    // terminal. Open descriptors (log file, devices) survive daemon().
    let pid_path = config.pid_file();
    pidfile::ensure_not_running(&pid_path)?;

    let log_file = if args.detach {
        Some(log_appender(&config.daemon.log_file)?)
    } else {
        None
    };
    init_logging(log_file)?;
    info!("mowzd starting");

    let path = keyboard::select_keyboard(config.device.keyboard.as_deref(), &config.device.name)
        .context("finding keyboard")?;
    let mut kbd = keyboard::Keyboard::open(&path)?;
    let mut vdev = emitter::create_virtual_device(&config.device.name)
        .context("creating virtual device")?;

    if args.detach {
        nix::unistd::daemon(false, false).context("detaching from terminal")?;
    }

    if let Err(e) = serve(&mut kbd, &mut vdev, &pid_path) {
        error!("mowzd exiting: {e:#}");
        return Err(e);
    }
    Ok(())
}

/// Daily-rotated appender for `log_file`: rotated copies are named
/// `<file name>.<date>` in the same directory.
fn log_appender(log_file: &Path) -> Result<RollingFileAppender> {
    let log_file = std::path::absolute(log_file)
        .with_context(|| format!("resolving log file {}", log_file.display()))?;
    let name = log_file
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("log file {} has no file name", log_file.display()))?;
    let dir = log_file.parent().unwrap_or(Path::new("/"));

    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(name)
        .max_log_files(KEPT_LOG_FILES)
        .build(dir)
        .with_context(|| format!("opening log file {}", log_file.display()))
}

fn init_logging(log_file: Option<RollingFileAppender>) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("mowzd=info".parse().context("parsing log filter")?);
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match log_file {
        Some(appender) => builder.with_ansi(false).with_writer(appender).init(),
        None => builder.init(),
    }
    Ok(())
}

fn serve(
    kbd: &mut keyboard::Keyboard,
    vdev: &mut evdev::uinput::VirtualDevice,
    pid_path: &Path,
) -> Result<()> {
    let pid_file = PidFile::acquire(pid_path)?;
    info!(pid_file = %pid_file.path().display(), "ready");

    match engine::run(kbd, vdev) {
        Ok(never) => match never {},
        Err(e) => Err(e).context("translation loop stopped"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_appender_opens_file_in_configured_directory() {
        let dir = tempfile::tempdir().unwrap();
        let _appender = log_appender(&dir.path().join("mowz.log")).unwrap();
        let created: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(created.iter().any(|n| n.starts_with("mowz.log")), "{created:?}");
    }

    #[test]
    fn log_appender_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("log");
        let _appender = log_appender(&log_dir.join("mowz.log")).unwrap();
        assert!(log_dir.is_dir());
    }

    #[test]
    fn log_appender_reports_unusable_directory() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the log directory should be
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();

        let err = log_appender(&blocker.join("mowz.log")).unwrap_err();
        assert!(err.to_string().starts_with("opening log file"), "{err:#}");
    }

    #[test]
    fn log_appender_rejects_path_without_file_name() {
        assert!(log_appender(Path::new("/")).is_err());
    }
}
