//! Command tokens accepted on the hub's command topic

use crate::protocol::PayloadError;
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum CommandAction {
    /// Reset device parameters to their defaults
    ResetParameters,
    /// Log the hub's current status
    ReportStatus,
    /// Stop the process
    ExitProcess,
}

impl CommandAction {
    pub fn from_token(token: &str) -> Result<Self, PayloadError> {
        match token {
            "RESET" => Ok(CommandAction::ResetParameters),
            "STATUS" => Ok(CommandAction::ReportStatus),
            "EXIT" => Ok(CommandAction::ExitProcess),
            other => Err(PayloadError::UnknownToken(other.to_string())),
        }
    }

    pub const fn token(&self) -> &'static str {
        match self {
            CommandAction::ResetParameters => "RESET",
            CommandAction::ReportStatus => "STATUS",
            CommandAction::ExitProcess => "EXIT",
        }
    }
}

impl fmt::Display for CommandAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for CommandAction {
    type Err = PayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_token(s)
    }
}

/// Result of executing a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Run flag cleared, the gateway loop will stop
    Stopping,
    /// Action not permitted in the current mode
    Refused,
    /// Action acknowledged in the log only
    Logged,
}

/// Maps command actions to their effect on the process
#[derive(Debug, Clone)]
pub struct CommandMapper {
    service_mode: bool,
    running: bool,
}

impl CommandMapper {
    pub fn new(service_mode: bool) -> Self {
        Self {
            service_mode,
            running: true,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn service_mode(&self) -> bool {
        self.service_mode
    }

    /// Clear the run flag for a shutdown requested from outside the broker
    pub fn request_stop(&mut self) {
        self.running = false;
    }

    pub fn execute(&mut self, action: CommandAction) -> ActionOutcome {
        match action {
            CommandAction::ExitProcess if self.service_mode => {
                warn!("EXIT command ignored: hub is running as a service");
                ActionOutcome::Refused
            }
            CommandAction::ExitProcess => {
                info!("EXIT command received, stopping hub");
                self.running = false;
                ActionOutcome::Stopping
            }
            CommandAction::ResetParameters => {
                info!("RESET command received, no resettable parameters");
                ActionOutcome::Logged
            }
            CommandAction::ReportStatus => {
                info!(running = self.running, service_mode = self.service_mode, "STATUS command received");
                ActionOutcome::Logged
            }
        }
    }
}
