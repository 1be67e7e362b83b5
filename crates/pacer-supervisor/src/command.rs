//! Manual commands accepted by a running supervisor.

use tokio::sync::mpsc;

use crate::error::{SupervisorError, SupervisorResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Add one worker regardless of the controller's opinion.
    ScaleUp,
    /// Remove one worker.
    ScaleDown,
    /// Enable or disable automatic resizing.
    SetAutoControl(bool),
    /// Edit a learned envelope; zero leaves a bound untouched.
    AdjustEnvelope { size: usize, lower: f64, upper: f64 },
}

/// Cloneable sender for supervisor commands.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl SupervisorHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Command>) -> Self {
        Self { tx }
    }

    pub fn send(&self, command: Command) -> SupervisorResult<()> {
        self.tx.send(command).map_err(|_| SupervisorError::Closed)
    }

    pub fn scale_up(&self) -> SupervisorResult<()> {
        self.send(Command::ScaleUp)
    }

    pub fn scale_down(&self) -> SupervisorResult<()> {
        self.send(Command::ScaleDown)
    }

    pub fn set_auto_control(&self, enabled: bool) -> SupervisorResult<()> {
        self.send(Command::SetAutoControl(enabled))
    }

    pub fn adjust_envelope(&self, size: usize, lower: f64, upper: f64) -> SupervisorResult<()> {
        self.send(Command::AdjustEnvelope { size, lower, upper })
    }
}
