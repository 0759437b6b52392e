use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::controller::{ServiceController, ServiceExit};
use crate::events::{EventLog, ServiceEvent};
use crate::host::ServiceHost;
use crate::worker::{AgentWorker, ConfigRecovery};

#[derive(Debug)]
pub enum ServiceRunError {
    HostConnect(String),
}

impl Display for ServiceRunError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceRunError::HostConnect(e) => write!(f, "failed to connect to service host: {}", e),
        }
    }
}

impl Error for ServiceRunError {}

/// Registers the service with the host and runs it until it has stopped.
pub async fn run_service<W, R, H, L>(
    controller: &ServiceController<W, R>,
    host: &mut H,
    log: &L,
) -> Result<ServiceExit<W::Error>, ServiceRunError>
where
    W: AgentWorker,
    R: ConfigRecovery,
    H: ServiceHost,
    L: EventLog,
{
    let service_name = controller.service_name();
    log.report(ServiceEvent::ServiceStarting, service_name);

    let requests = match host.connect(service_name) {
        Ok(requests) => requests,
        Err(error) => {
            let error = error.to_string();
            tracing::error!(%error, "failed to connect to service host");
            log.report(ServiceEvent::ServiceRunFailed, &error);
            return Err(ServiceRunError::HostConnect(error));
        }
    };

    let exit = controller.execute(requests, host, log).await;

    log.report(ServiceEvent::ServiceExited, service_name);
    tracing::info!(trigger = ?exit.trigger, exit_code = exit.exit_code(), "service exited");

    Ok(exit)
}
