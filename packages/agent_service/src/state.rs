use std::fmt::{Display, Formatter};
use std::ops::BitOr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceState {
    StartPending,
    Running,
    StopPending,
    Stopped,
}

impl ServiceState {
    /// The lifecycle is linear, a run never goes back to an earlier state.
    pub fn can_transition_to(&self, next: ServiceState) -> bool {
        matches!(
            (self, next),
            (ServiceState::StartPending, ServiceState::Running)
                | (ServiceState::Running, ServiceState::StopPending)
                | (ServiceState::StopPending, ServiceState::Stopped)
        )
    }
}

impl Display for ServiceState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceState::StartPending => write!(f, "start_pending"),
            ServiceState::Running => write!(f, "running"),
            ServiceState::StopPending => write!(f, "stop_pending"),
            ServiceState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Control commands the service declares to the host. Bit values match the
/// Windows service control manager accept flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AcceptedCommands(u32);

impl AcceptedCommands {
    pub const NONE: AcceptedCommands = AcceptedCommands(0);
    pub const STOP: AcceptedCommands = AcceptedCommands(0x1);
    pub const SHUTDOWN: AcceptedCommands = AcceptedCommands(0x4);

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, other: AcceptedCommands) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for AcceptedCommands {
    type Output = AcceptedCommands;

    fn bitor(self, rhs: AcceptedCommands) -> AcceptedCommands {
        AcceptedCommands(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStatus {
    pub state: ServiceState,
    pub accepts: AcceptedCommands,
}

impl ServiceStatus {
    pub fn new(state: ServiceState) -> Self {
        ServiceStatus {
            state,
            accepts: AcceptedCommands::NONE,
        }
    }

    pub fn accepting(state: ServiceState, accepts: AcceptedCommands) -> Self {
        ServiceStatus { state, accepts }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    Interrogate,
    Stop,
    Shutdown,
    Other(u32),
}

impl Display for ControlRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlRequest::Interrogate => write!(f, "interrogate"),
            ControlRequest::Stop => write!(f, "stop"),
            ControlRequest::Shutdown => write!(f, "shutdown"),
            ControlRequest::Other(code) => write!(f, "control code {}", code),
        }
    }
}
