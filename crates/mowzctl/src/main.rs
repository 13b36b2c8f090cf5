use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mowz_core::bindings;
use mowz_core::config::Config;
use mowz_core::pidfile::{self, PidStatus};
use std::path::PathBuf;
use std::process::Command as Process;

#[derive(Parser)]
#[command(name = "mowzctl", about = "Control the mowz daemon")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the daemon in the background (root)
    Start,
    /// Stop the running daemon (root)
    Stop,
    /// Show whether the daemon is running
    Status,
    /// Show commands and key bindings
    Bindings,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Bindings) {
        Command::Start => start(),
        Command::Stop => stop(),
        Command::Status => status(),
        Command::Bindings => {
            print!("{}", bindings::help_text());
            Ok(())
        }
    }
}

fn start() -> Result<()> {
    require_root()?;
    let config = Config::load().context("loading config")?;
    pidfile::ensure_not_running(&config.pid_file())?;

    let daemon = daemon_path();
    let status = Process::new(&daemon)
        .arg("--detach")
        .status()
        .with_context(|| format!("running {}", daemon.display()))?;
    if !status.success() {
        bail!("{} failed to start ({})", daemon.display(), status);
    }
    println!(
        "mowz: starting (logs in {})",
        config.daemon.log_file.display()
    );
    Ok(())
}

fn stop() -> Result<()> {
    require_root()?;
    let config = Config::load().context("loading config")?;
    let pid = pidfile::terminate(&config.pid_file())?;
    println!("mowz: stopped (pid {})", pid);
    Ok(())
}

fn status() -> Result<()> {
    let config = Config::load().context("loading config")?;
    let pid_path = config.pid_file();
    match pidfile::status(&pid_path)? {
        PidStatus::Running(pid) => println!("mowz: running (pid {})", pid),
        PidStatus::Absent => println!("mowz: not running"),
        PidStatus::Empty => println!("mowz: not running (nothing in {})", pid_path.display()),
        PidStatus::Stale(pid) => println!(
            "mowz: not running (stale pid {} in {})",
            pid,
            pid_path.display()
        ),
    }
    Ok(())
}

fn require_root() -> Result<()> {
    if !nix::unistd::geteuid().is_root() {
        bail!("run as root");
    }
    Ok(())
}

/// `mowzd` next to this binary, or from PATH.
fn daemon_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .map(|exe| exe.with_file_name("mowzd"))
        .filter(|p| p.exists())
        .unwrap_or_else(|| PathBuf::from("mowzd"))
}
