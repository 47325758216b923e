use crate::installer::{execute, RuleInstaller};
use crate::link::ControlPlaneLink;
use crate::service::{AgentService, ServiceConfig, ServiceExit};
use cpif_agent_core::RuleCall;
use cpif_config::RestartMode;
use cpif_core::{CpifError, Result};
use cpif_metrics::RESTARTS_TOTAL;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Lifecycle of the agent with respect to the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// No channels; the next step registers
    Unregistered,
    /// Channels up; the next step runs the poll loop
    Registered,
    /// Control plane lost; the next step clears the dataplane and restarts
    Faulted { silent_for: Duration, dp_id: u64 },
}

// ★ 状態遷移: Unregistered → Registered → Faulted → Unregistered
pub struct Supervisor<L> {
    link: L,
    installer: Arc<dyn RuleInstaller>,
    config: ServiceConfig,
    restart_mode: RestartMode,
    state: SupervisorState,
    service: Option<AgentService>,
    restarts: u64,
}

impl<L: ControlPlaneLink> Supervisor<L> {
    pub fn new(
        link: L,
        installer: Arc<dyn RuleInstaller>,
        config: ServiceConfig,
        restart_mode: RestartMode,
    ) -> Self {
        Self {
            link,
            installer,
            config,
            restart_mode,
            state: SupervisorState::Unregistered,
            service: None,
            restarts: 0,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Service of the current registration, if registered
    pub fn service(&self) -> Option<&AgentService> {
        self.service.as_ref()
    }

    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    /// Run until a fatal error
    pub async fn run(&mut self) -> Result<()> {
        loop {
            self.step().await?;
        }
    }

    /// Perform the work of the current state and move to the next one
    pub async fn step(&mut self) -> Result<SupervisorState> {
        self.state = match self.state {
            SupervisorState::Unregistered => {
                let channels = self.link.connect().await?;
                self.service = Some(AgentService::new(
                    &self.config,
                    Arc::clone(&self.installer),
                    channels,
                ));
                SupervisorState::Registered
            }
            SupervisorState::Registered => {
                let service = self.service.as_mut().ok_or_else(|| {
                    CpifError::InternalError("registered without a service".to_string())
                })?;
                match service.run().await? {
                    ServiceExit::ControlPlaneLost { silent_for, dp_id } => {
                        SupervisorState::Faulted { silent_for, dp_id }
                    }
                }
            }
            SupervisorState::Faulted { silent_for, dp_id } => {
                self.recover(silent_for, dp_id).await?;
                SupervisorState::Unregistered
            }
        };
        Ok(self.state)
    }

    async fn recover(&mut self, silent_for: Duration, dp_id: u64) -> Result<()> {
        // Before restarting, clear every session rule in the dataplane
        if let Err(e) = execute(self.installer.as_ref(), &RuleCall::RemoveAll).await {
            warn!("RemoveAll failed before restart: {}", e);
        }

        if let Some(mut service) = self.service.take() {
            service.close().await;
        }
        self.restarts += 1;
        RESTARTS_TOTAL.inc();

        error!(
            dp_id,
            silent_ms = silent_for.as_millis() as u64,
            restarts = self.restarts,
            mode = ?self.restart_mode,
            "CP<->DP communication broken, restarting"
        );

        match self.restart_mode {
            RestartMode::InProcess => Ok(()),
            RestartMode::ReExec => re_exec(),
        }
    }
}

/// Replace the process with a fresh copy of the binary, same arguments
fn re_exec() -> Result<()> {
    use std::os::unix::process::CommandExt;

    let exe = std::env::current_exe()?;
    let args: Vec<_> = std::env::args_os().skip(1).collect();
    info!("Re-executing {}", exe.display());

    // only returns on failure
    let err = std::process::Command::new(&exe).args(args).exec();
    Err(CpifError::InternalError(format!(
        "re-exec of {} failed: {}",
        exe.display(),
        err
    )))
}
