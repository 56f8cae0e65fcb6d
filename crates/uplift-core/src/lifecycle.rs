use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::builder::{CommandRunner, Invocation, run_to_success};
use crate::error::{UpdateError, UpdateResult};

/// How the running service is controlled around an update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ServiceControl {
    /// An outside supervisor owns the process; stop and start do nothing.
    #[default]
    External,
    /// A systemd unit, optionally controlled through `sudo`.
    Systemd {
        unit: String,
        #[serde(default)]
        sudo: bool,
    },
}

pub struct LifecycleController {
    runner: Arc<dyn CommandRunner>,
    control: ServiceControl,
    timeout: Option<Duration>,
}

impl LifecycleController {
    #[must_use]
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        control: ServiceControl,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            runner,
            control,
            timeout,
        }
    }

    /// # Errors
    /// Returns [`UpdateError::Lifecycle`] when the supervisor rejects the stop.
    pub async fn stop_service(&self) -> UpdateResult<()> {
        self.bracket("stop").await
    }

    /// # Errors
    /// Returns [`UpdateError::Lifecycle`] when the supervisor rejects the start.
    pub async fn start_service(&self) -> UpdateResult<()> {
        self.bracket("start").await
    }

    /// Ask the supervisor to restart the managed unit.
    ///
    /// # Errors
    /// Returns [`UpdateError::Lifecycle`] when no supervisor is configured,
    /// it cannot be reached, or it exits non-zero.
    pub async fn restart_service(&self) -> UpdateResult<()> {
        match &self.control {
            ServiceControl::External => Err(UpdateError::lifecycle(
                "restart",
                "no service supervisor is configured",
            )),
            ServiceControl::Systemd { unit, sudo } => {
                self.systemctl("restart", unit, *sudo).await
            }
        }
    }

    async fn bracket(&self, action: &'static str) -> UpdateResult<()> {
        match &self.control {
            ServiceControl::External => {
                debug!("Service {action} left to the external supervisor");
                Ok(())
            }
            ServiceControl::Systemd { unit, sudo } => self.systemctl(action, unit, *sudo).await,
        }
    }

    async fn systemctl(&self, action: &'static str, unit: &str, sudo: bool) -> UpdateResult<()> {
        info!("Requesting service {action} for {unit}");
        let invocation = systemctl_invocation(action, unit, sudo);
        run_to_success(self.runner.as_ref(), &invocation, self.timeout)
            .await
            .map_err(|failure| UpdateError::lifecycle(action, failure))
    }
}

fn systemctl_invocation(action: &str, unit: &str, sudo: bool) -> Invocation {
    if sudo {
        Invocation::new("sudo", ["systemctl", action, unit])
    } else {
        Invocation::new("systemctl", [action, unit])
    }
}
