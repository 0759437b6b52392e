//! Event log records emitted by the service.
//!
//! Numeric identifiers are part of the operational contract, monitoring keys
//! off them, so existing codes must never change.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceEvent {
    LegacyImportFailed,
    ConfigUpgradeFailed,
    ServiceStarted,
    ServiceExited,
    ServiceStarting,
    ServiceRunFailed,
    UnexpectedControl,
    WorkerStopSignal,
    WorkerStartFailed,
    StopReceived,
    ShutdownReceived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSeverity {
    Info,
    Warning,
    Error,
}

impl ServiceEvent {
    pub const ALL: [ServiceEvent; 11] = [
        ServiceEvent::LegacyImportFailed,
        ServiceEvent::ConfigUpgradeFailed,
        ServiceEvent::ServiceStarted,
        ServiceEvent::ServiceExited,
        ServiceEvent::ServiceStarting,
        ServiceEvent::ServiceRunFailed,
        ServiceEvent::UnexpectedControl,
        ServiceEvent::WorkerStopSignal,
        ServiceEvent::WorkerStartFailed,
        ServiceEvent::StopReceived,
        ServiceEvent::ShutdownReceived,
    ];

    pub fn code(&self) -> u32 {
        match self {
            ServiceEvent::LegacyImportFailed => 0x8000_0001,
            ServiceEvent::ConfigUpgradeFailed => 0x8000_0002,
            ServiceEvent::ServiceStarted => 0x4000_0003,
            ServiceEvent::ServiceExited => 0x4000_0004,
            ServiceEvent::ServiceStarting => 0x4000_0007,
            ServiceEvent::ServiceRunFailed => 0xC000_0008,
            ServiceEvent::UnexpectedControl => 0xC000_0009,
            ServiceEvent::WorkerStopSignal => 0x4000_000A,
            ServiceEvent::WorkerStartFailed => 0xC000_000B,
            ServiceEvent::StopReceived => 0x4000_000C,
            ServiceEvent::ShutdownReceived => 0x4000_000D,
        }
    }

    /// Level the record is written at. Not derived from the code: the
    /// unexpected control record keeps an error class code but is a warning.
    pub fn severity(&self) -> EventSeverity {
        match self {
            ServiceEvent::LegacyImportFailed
            | ServiceEvent::ConfigUpgradeFailed
            | ServiceEvent::UnexpectedControl => EventSeverity::Warning,
            ServiceEvent::ServiceRunFailed | ServiceEvent::WorkerStartFailed => EventSeverity::Error,
            _ => EventSeverity::Info,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ServiceEvent::LegacyImportFailed => "failed to import legacy configuration, continuing with existing configuration",
            ServiceEvent::ConfigUpgradeFailed => "failed to upgrade configuration, continuing with existing configuration",
            ServiceEvent::ServiceStarted => "service started",
            ServiceEvent::ServiceExited => "service exited",
            ServiceEvent::ServiceStarting => "service starting",
            ServiceEvent::ServiceRunFailed => "service failed to run",
            ServiceEvent::UnexpectedControl => "unexpected control request",
            ServiceEvent::WorkerStopSignal => "agent stopped itself, shutting down service",
            ServiceEvent::WorkerStartFailed => "failed to start agent",
            ServiceEvent::StopReceived => "received stop request",
            ServiceEvent::ShutdownReceived => "received shutdown request",
        }
    }
}

/// Destination for service event records, the host's event log.
pub trait EventLog: Send + Sync {
    fn report(&self, event: ServiceEvent, detail: &str);
}

/// Writes event records through `tracing`.
#[derive(Debug, Clone)]
pub struct TracingEventLog {
    service_name: String,
}

impl TracingEventLog {
    pub fn new<S: Into<String>>(service_name: S) -> Self {
        TracingEventLog {
            service_name: service_name.into(),
        }
    }
}

impl EventLog for TracingEventLog {
    fn report(&self, event: ServiceEvent, detail: &str) {
        let event_id = format!("{:#010X}", event.code());
        let service = self.service_name.as_str();

        match event.severity() {
            EventSeverity::Info => tracing::info!(%event_id, service, detail, "{}", event.message()),
            EventSeverity::Warning => tracing::warn!(%event_id, service, detail, "{}", event.message()),
            EventSeverity::Error => tracing::error!(%event_id, service, detail, "{}", event.message()),
        }
    }
}
