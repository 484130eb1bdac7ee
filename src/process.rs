//! Worker process lifecycle
//!
//! Starts the external option-chain worker, watches it through the settle
//! window and stops it on cleanup. Nothing here is fatal: the pipeline can
//! run without the worker, so every failure is logged and reported as
//! `false`.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;

pub struct ProcessLifecycleManager {
    config: WorkerConfig,
    child: Option<Child>,
}

impl ProcessLifecycleManager {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            child: None,
        }
    }

    pub fn exe_path(&self) -> &Path {
        &self.config.exe_path
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.id())
    }

    /// Launch a fresh worker. `true` only if it is still alive after the settle window.
    pub async fn start(&mut self) -> bool {
        // Replace, never duplicate
        self.stop().await;

        let exe = match std::path::absolute(&self.config.exe_path) {
            Ok(path) if path.is_file() => path,
            _ => {
                warn!("Worker executable not found: {}", self.config.exe_path.display());
                return false;
            }
        };

        if self.config.kill_existing {
            self.kill_existing(&exe).await;
        }

        let mut child = match self.spawn(&exe) {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to launch {}: {}", exe.display(), e);
                return false;
            }
        };

        let alive = self
            .config
            .settle_poll()
            .hold_while(|| matches!(child.try_wait(), Ok(None)))
            .await;

        if alive {
            info!("Worker started with PID {}", child.id().unwrap_or_default());
            self.child = Some(child);
            true
        } else {
            match child.try_wait() {
                Ok(Some(status)) => warn!("Worker exited during startup: {}", status),
                Ok(None) => warn!("Worker did not settle"),
                Err(e) => warn!("Worker status unavailable: {}", e),
            }
            false
        }
    }

    fn spawn(&self, exe: &Path) -> std::io::Result<Child> {
        let mut command = Command::new(exe);
        command
            .args(&self.config.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = exe.parent() {
            command.current_dir(dir);
        }
        command.spawn()
    }

    /// Best-effort termination of stray instances of the worker
    async fn kill_existing(&self, exe: &Path) {
        let name = &self.config.process_name;
        let mut command = kill_command(name, exe);
        match command
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
        {
            Ok(status) => debug!("Stale worker cleanup for {} exited with {}", name, status),
            Err(e) => debug!("Stale worker cleanup unavailable: {}", e),
        }
        tokio::time::sleep(Duration::from_millis(self.config.kill_wait_ms)).await;
    }

    /// Non-blocking liveness check
    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut().map(|c| c.try_wait()) {
            Some(Ok(None)) => true,
            Some(Ok(Some(status))) => {
                debug!("Worker has exited: {}", status);
                false
            }
            Some(Err(e)) => {
                warn!("Worker status unavailable: {}", e);
                false
            }
            None => false,
        }
    }

    /// Terminate the worker if running and forget the handle
    pub async fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if let Ok(None) = child.try_wait() {
            match child.kill().await {
                Ok(()) => info!("Worker stopped"),
                Err(e) => warn!("Failed to stop worker: {}", e),
            }
        }
    }
}

#[cfg(windows)]
fn kill_command(name: &str, _exe: &Path) -> Command {
    let mut command = Command::new("taskkill");
    command.args(["/f", "/im", name]);
    command
}

/// Linux truncates process names to 15 bytes, so match on the full command
/// line instead of the image name.
#[cfg(not(windows))]
fn kill_command(_name: &str, exe: &Path) -> Command {
    let mut command = Command::new("pkill");
    command.arg("-f").arg(exe);
    command
}
