use std::fmt::Display;
use std::sync::Mutex;

use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;

use crate::state::{ControlRequest, ServiceStatus};

/// The service manager or supervisor the service runs under.
pub trait ServiceHost: Send + Sync {
    type Error: Display;

    /// Registers the service with the host. Control requests for the service
    /// arrive on the returned channel until the host goes away.
    fn connect(&mut self, service_name: &str) -> Result<Receiver<ControlRequest>, Self::Error>;

    fn report_status(&self, status: ServiceStatus);
}

/// Host used when the agent runs in a terminal or under a plain process
/// supervisor. Ctrl+C maps to a stop request; on unix SIGTERM maps to a
/// shutdown request and SIGHUP to an interrogation.
#[derive(Debug, Default)]
pub struct ConsoleHost {
    last_status: Mutex<Option<ServiceStatus>>,
    listener: Option<JoinHandle<()>>,
}

impl ConsoleHost {
    pub fn new() -> Self {
        ConsoleHost::default()
    }

    pub fn last_status(&self) -> Option<ServiceStatus> {
        match self.last_status.lock() {
            Ok(lock) => *lock,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl ServiceHost for ConsoleHost {
    type Error = std::io::Error;

    fn connect(&mut self, service_name: &str) -> Result<Receiver<ControlRequest>, std::io::Error> {
        let signals = ConsoleSignals::register()?;
        let (tx, rx) = mpsc::channel(16);

        if let Some(old) = self.listener.replace(tokio::spawn(signals.forward(tx))) {
            old.abort();
        }

        tracing::info!(service = service_name, "running in console, press Ctrl+C to stop");
        Ok(rx)
    }

    fn report_status(&self, status: ServiceStatus) {
        tracing::info!(state = %status.state, accepts = status.accepts.bits(), "service status");

        match self.last_status.lock() {
            Ok(mut lock) => *lock = Some(status),
            Err(poisoned) => *poisoned.into_inner() = Some(status),
        }
    }
}

impl Drop for ConsoleHost {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

struct ConsoleSignals {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(unix)]
    hangup: tokio::signal::unix::Signal,
}

impl ConsoleSignals {
    fn register() -> std::io::Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            return Ok(ConsoleSignals {
                terminate: signal(SignalKind::terminate())?,
                hangup: signal(SignalKind::hangup())?,
            });
        }

        #[cfg(not(unix))]
        return Ok(ConsoleSignals {});
    }

    #[cfg(unix)]
    async fn next(&mut self) -> Option<ControlRequest> {
        tokio::select! {
            res = tokio::signal::ctrl_c() => match res {
                Ok(()) => Some(ControlRequest::Stop),
                Err(error) => {
                    tracing::error!(?error, "cannot listen for ctrl_c");
                    None
                }
            },
            res = self.terminate.recv() => res.map(|_| ControlRequest::Shutdown),
            res = self.hangup.recv() => res.map(|_| ControlRequest::Interrogate),
        }
    }

    #[cfg(not(unix))]
    async fn next(&mut self) -> Option<ControlRequest> {
        match tokio::signal::ctrl_c().await {
            Ok(()) => Some(ControlRequest::Stop),
            Err(error) => {
                tracing::error!(?error, "cannot listen for ctrl_c");
                None
            }
        }
    }

    async fn forward(mut self, tx: Sender<ControlRequest>) {
        while let Some(request) = self.next().await {
            tracing::info!(%request, "received console signal");

            if tx.send(request).await.is_err() {
                break;
            }
        }
    }
}
