//! Backend/UI process supervision
//!
//! Launches the backend, waits for its readiness probe, then launches the
//! UI. While running, a monitoring loop relaunches crashed processes with a
//! backoff proportional to their recent restart frequency. A requested
//! shutdown suppresses restarts and terminates both children promptly.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::time::sleep;

use crate::config::SupervisorConfig;
use crate::error::{Result, SupervisorError};

pub mod health;

/// Restart backoff stops growing past this many recent restarts
const MAX_BACKOFF_STEPS: u32 = 6;

/// How long a child gets to exit on SIGTERM before it is killed
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Managed process roles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Backend,
    Ui,
}

impl Role {
    pub fn name(&self) -> &'static str {
        match self {
            Role::Backend => "backend",
            Role::Ui => "ui",
        }
    }
}

/// Lifecycle state of a managed process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Stopped,
    Starting,
    Running,
    Crashed,
    Stopping,
}

/// One supervised process. The supervisor owns the handle exclusively;
/// there is never more than one live child per role.
struct ManagedProcess {
    role: Role,
    command: Vec<String>,
    child: Option<Child>,
    state: ProcessState,
    restart_count: u32,
}

impl ManagedProcess {
    fn new(role: Role, command: Vec<String>) -> Self {
        Self {
            role,
            command,
            child: None,
            state: ProcessState::Stopped,
            restart_count: 0,
        }
    }

    fn spawn(&mut self) -> Result<()> {
        let program = self
            .command
            .first()
            .ok_or(SupervisorError::EmptyCommand {
                role: self.role.name(),
            })?;

        log::info!("Starting {}: {}", self.role.name(), self.command.join(" "));
        self.state = ProcessState::Starting;

        let child = Command::new(program)
            .args(&self.command[1..])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SupervisorError::Spawn {
                role: self.role.name(),
                source: e,
            })?;

        log::debug!("{} spawned with PID {:?}", self.role.name(), child.id());
        self.child = Some(child);
        Ok(())
    }

    /// Non-blocking liveness check; returns the exit status if the process
    /// has terminated.
    fn poll_exit(&mut self) -> Option<std::process::ExitStatus> {
        let child = self.child.as_mut()?;
        match child.try_wait() {
            Ok(Some(status)) => {
                self.child = None;
                Some(status)
            }
            Ok(None) => None,
            Err(e) => {
                log::error!("Error checking {} status: {}", self.role.name(), e);
                None
            }
        }
    }

    /// Ask the process to exit with SIGTERM, then kill it if it has not
    /// gone away within the grace period.
    async fn stop(&mut self, grace: Duration) {
        self.state = ProcessState::Stopping;
        if let Some(mut child) = self.child.take() {
            log::info!("Stopping {}", self.role.name());
            terminate(&mut child);
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(Ok(status)) => {
                    log::debug!("{} exited with {}", self.role.name(), status);
                }
                Ok(Err(e)) => {
                    log::warn!("Error waiting for {}: {}", self.role.name(), e);
                }
                Err(_) => {
                    log::warn!(
                        "{} did not exit within {:?}, killing",
                        self.role.name(),
                        grace
                    );
                    if let Err(e) = child.kill().await {
                        log::warn!("Failed to kill {}: {}", self.role.name(), e);
                    }
                }
            }
        }
        self.state = ProcessState::Stopped;
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;
    if let Some(pid) = child.id() {
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    // No SIGTERM to send; the grace period just delays the kill
    let _ = child.start_kill();
}

/// Process supervisor for the backend and UI roles
pub struct Supervisor {
    config: SupervisorConfig,
    http: reqwest::Client,
    backend: ManagedProcess,
    ui: ManagedProcess,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Result<Self> {
        if config.backend_command.is_empty() {
            return Err(SupervisorError::EmptyCommand { role: "backend" }.into());
        }
        if config.ui_command.is_empty() {
            return Err(SupervisorError::EmptyCommand { role: "ui" }.into());
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| crate::error::ApiError::Network(e.to_string()))?;

        let backend = ManagedProcess::new(Role::Backend, config.backend_command.clone());
        let ui = ManagedProcess::new(Role::Ui, config.ui_command.clone());

        Ok(Self {
            config,
            http,
            backend,
            ui,
        })
    }

    /// Launch both roles in order: the UI is not started until the backend's
    /// readiness probe first reports OK. A backend that never becomes ready
    /// aborts startup for both roles.
    pub async fn start(&mut self) -> Result<()> {
        self.backend.spawn()?;

        if let Err(e) = self.wait_backend_ready().await {
            log::error!("Backend failed to become ready, aborting startup");
            self.backend.stop(SHUTDOWN_GRACE).await;
            return Err(e);
        }
        self.backend.state = ProcessState::Running;

        self.ui.spawn()?;
        self.ui.state = ProcessState::Running;
        Ok(())
    }

    async fn wait_backend_ready(&self) -> Result<()> {
        health::wait_until_ready(
            &self.http,
            &self.config.health_url,
            self.config.health_poll_interval(),
            self.config.health_poll_timeout(),
        )
        .await
    }

    /// One pass of the monitoring loop: relaunch any role that exited
    /// unexpectedly, with a backoff proportional to its recent restart
    /// count. A shutdown request interrupts the backoff wait and the
    /// readiness re-poll instead of completing the relaunch.
    pub async fn supervise_once(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<()> {
        if let Some(status) = self.backend.poll_exit() {
            log::warn!("Backend exited unexpectedly with {}", status);
            self.backend.state = ProcessState::Crashed;
            self.restart(Role::Backend, shutdown).await?;
        }

        if let Some(status) = self.ui.poll_exit() {
            log::warn!("UI exited unexpectedly with {}", status);
            self.ui.state = ProcessState::Crashed;
            self.restart(Role::Ui, shutdown).await?;
        }

        Ok(())
    }

    async fn restart(&mut self, role: Role, shutdown: &mut watch::Receiver<bool>) -> Result<()> {
        let base_backoff = self.config.restart_backoff();
        let process = match role {
            Role::Backend => &mut self.backend,
            Role::Ui => &mut self.ui,
        };

        process.restart_count += 1;
        let backoff = base_backoff * process.restart_count.min(MAX_BACKOFF_STEPS);
        log::info!(
            "Relaunching {} in {:?} (restart #{})",
            role.name(),
            backoff,
            process.restart_count
        );
        tokio::select! {
            _ = sleep(backoff) => {}
            _ = shutdown.wait_for(|stop| *stop) => {
                log::info!("Shutdown requested, abandoning {} relaunch", role.name());
                return Ok(());
            }
        }

        let process = match role {
            Role::Backend => &mut self.backend,
            Role::Ui => &mut self.ui,
        };
        process.spawn()?;

        // A relaunched backend must pass its readiness probe again before it
        // counts as running. An already-running UI is left alone.
        if role == Role::Backend {
            tokio::select! {
                result = self.wait_backend_ready() => result?,
                _ = shutdown.wait_for(|stop| *stop) => {
                    log::info!("Shutdown requested while waiting for backend readiness");
                    return Ok(());
                }
            }
        }

        let process = match role {
            Role::Backend => &mut self.backend,
            Role::Ui => &mut self.ui,
        };
        process.state = ProcessState::Running;
        Ok(())
    }

    /// Start both roles and monitor them until shutdown is requested.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        self.start().await?;

        let mut shutdown_signal = shutdown.clone();
        loop {
            tokio::select! {
                _ = sleep(self.config.monitor_interval()) => {
                    self.supervise_once(&mut shutdown).await?;
                    if *shutdown.borrow() {
                        log::info!("Shutdown requested, stopping managed processes");
                        self.stop_all().await;
                        return Ok(());
                    }
                }
                _ = shutdown_signal.wait_for(|stop| *stop) => {
                    log::info!("Shutdown requested, stopping managed processes");
                    self.stop_all().await;
                    return Ok(());
                }
            }
        }
    }

    /// Terminate both children and suppress further restarts
    pub async fn stop_all(&mut self) {
        // UI first: it depends on the backend, not the other way around
        self.ui.stop(SHUTDOWN_GRACE).await;
        self.backend.stop(SHUTDOWN_GRACE).await;
    }
}
