pub mod config;

use crate::control::ControlPlane;
use crate::core::{BootstrapError, Result};
use config::BootstrapConfig;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Administrative session handle
///
/// The single connection a bootstrap run owns. Step functions receive it by
/// mutable reference; it is released by `close()` or on drop.
pub struct AdminSession {
    plane: Arc<dyn ControlPlane>,
    endpoint: String,
    state: SessionState,
    commands: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Active,
    Closed,
}

impl AdminSession {
    /// Open a session: wait the fixed readiness delay, then ping once.
    ///
    /// A failed ping is reported as [`BootstrapError::Unavailable`].
    pub async fn open(plane: Arc<dyn ControlPlane>, config: &BootstrapConfig) -> Result<Self> {
        let endpoint = config.to_url();
        if !config.initial_wait.is_zero() {
            info!(
                endpoint = %endpoint,
                wait_ms = config.initial_wait.as_millis() as u64,
                "waiting for control plane before first ping"
            );
            tokio::time::sleep(config.initial_wait).await;
        }

        if let Err(err) = plane.ping().await {
            warn!(endpoint = %endpoint, error = %err, "control plane did not answer ping");
            return Err(match err {
                BootstrapError::Unavailable(message) => BootstrapError::Unavailable(message),
                other => BootstrapError::Unavailable(format!("{endpoint}: {other}")),
            });
        }

        debug!(endpoint = %endpoint, "administrative session opened");
        Ok(Self {
            plane,
            endpoint,
            state: SessionState::Active,
            commands: 0,
        })
    }

    /// Get the endpoint this session talks to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Access the control plane for one command
    pub fn plane(&mut self) -> Result<&dyn ControlPlane> {
        if self.state == SessionState::Closed {
            return Err(BootstrapError::SessionClosed);
        }
        self.commands += 1;
        Ok(self.plane.as_ref())
    }

    /// Number of commands issued through this session
    pub fn commands_issued(&self) -> u64 {
        self.commands
    }

    /// Check if session is active
    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Close the session
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;
        debug!(
            endpoint = %self.endpoint,
            commands = self.commands,
            "administrative session released"
        );
    }
}

impl Drop for AdminSession {
    fn drop(&mut self) {
        self.close();
    }
}
