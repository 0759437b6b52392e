//! Service lifecycle for the logship agent.
//!
//! This crate provides:
//! - the service state model and the control requests a host can send
//! - a stable table of event log records
//! - the [`ServiceController`] that drives an [`AgentWorker`] from host control requests
//! - a console host adapter for running without an OS service manager

pub mod controller;
pub mod events;
pub mod host;
pub mod runner;
pub mod state;
pub mod worker;

pub use controller::{ServiceController, ServiceExit, ShutdownTrigger};
pub use events::{EventLog, EventSeverity, ServiceEvent, TracingEventLog};
pub use host::{ConsoleHost, ServiceHost};
pub use runner::{ServiceRunError, run_service};
pub use state::{AcceptedCommands, ControlRequest, ServiceState, ServiceStatus};
pub use worker::{AgentWorker, ConfigRecovery, NoRecovery};
