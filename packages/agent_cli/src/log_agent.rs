use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use logship_agent_service::AgentWorker;
use logship_logs_client::{CompressedPayload, CompressionError, PayloadEncoder};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::settings::{AgentSettings, SettingsError};

/// The agent run by the service. Starting it loads the settings and brings up
/// the status reporter that prepares compressed status payloads for the
/// transport.
pub struct LogAgent {
    settings_path: PathBuf,
    state: tokio::sync::Mutex<AgentState>,
    last_status: Arc<Mutex<Option<CompressedPayload>>>,
}

enum AgentState {
    Idle,
    /* settings are loading, cancelled if stop arrives before they are */
    Starting(CancellationToken),
    Running(RunningAgent),
    Failed,
    /* stop arrived before start began, the next start is a no-op */
    StopRequested,
}

struct RunningAgent {
    cancel: CancellationToken,
    task: JoinHandle<Option<()>>,
}

impl LogAgent {
    pub fn new(settings_path: PathBuf) -> Self {
        LogAgent {
            settings_path,
            state: tokio::sync::Mutex::new(AgentState::Idle),
            last_status: Arc::new(Mutex::new(None)),
        }
    }

    fn last_status_payload(&self) -> Option<CompressedPayload> {
        match self.last_status.lock() {
            Ok(lock) => lock.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    async fn reporter(&self) -> Result<StatusReporter, AgentError> {
        let settings = AgentSettings::load(&self.settings_path).await?;
        if settings.api_key().is_none() {
            return Err(AgentError::MissingApiKey);
        }

        Ok(StatusReporter {
            hostname: settings
                .hostname
                .clone()
                .or_else(|| std::env::var("HOSTNAME").ok())
                .unwrap_or_else(|| "unknown".to_string()),
            encoder: settings.logs.compression.encoder(),
            interval: Duration::from_secs(settings.logs.status_interval_secs.max(1)),
            started_at: Utc::now(),
            sequence: 0,
            last_status: self.last_status.clone(),
        })
    }
}

impl AgentWorker for LogAgent {
    type Error = AgentError;

    async fn start(&self) -> Result<(), AgentError> {
        let cancel = {
            let mut state = self.state.lock().await;
            if matches!(*state, AgentState::Starting(_) | AgentState::Running(_)) {
                return Err(AgentError::AlreadyRunning);
            }

            if matches!(*state, AgentState::StopRequested) {
                *state = AgentState::Idle;
                tracing::info!("log agent was stopped before it started");
                return Ok(());
            }

            let cancel = CancellationToken::new();
            *state = AgentState::Starting(cancel.clone());
            cancel
        };

        let reporter = self.reporter().await;

        /* stop moves the state on after cancelling, only touch it while still ours */
        let mut state = self.state.lock().await;
        if cancel.is_cancelled() {
            tracing::info!("log agent was stopped while starting");
            return reporter.map(|_| ());
        }

        let reporter = match reporter {
            Ok(reporter) => reporter,
            Err(error) => {
                *state = AgentState::Failed;
                return Err(error);
            }
        };

        let task = tokio::spawn(cancel.clone().run_until_cancelled_owned(reporter.run()));
        *state = AgentState::Running(RunningAgent { cancel, task });

        tracing::info!(settings = %self.settings_path.display(), "log agent started");
        Ok(())
    }

    async fn stop(&self) {
        let mut state = self.state.lock().await;

        match std::mem::replace(&mut *state, AgentState::Idle) {
            AgentState::Idle => {
                tracing::info!("stop requested before log agent started");
                *state = AgentState::StopRequested;
            }
            AgentState::StopRequested => {
                tracing::info!("log agent was not running");
                *state = AgentState::StopRequested;
            }
            AgentState::Failed => tracing::info!("log agent was not running"),
            AgentState::Starting(cancel) => {
                cancel.cancel();
                tracing::info!("log agent stopped while starting");
            }
            AgentState::Running(running) => {
                running.cancel.cancel();
                if let Err(error) = running.task.await {
                    tracing::error!(?error, "status reporter task failed");
                }

                if let Some(payload) = self.last_status_payload() {
                    tracing::info!(bytes = payload.len(), "last status payload prepared before stop");
                }
                tracing::info!("log agent stopped");
            }
        }
    }
}

#[derive(Serialize)]
struct AgentStatus<'a> {
    hostname: &'a str,
    version: &'static str,
    started_at: DateTime<Utc>,
    timestamp: DateTime<Utc>,
    sequence: u64,
}

struct StatusReporter {
    hostname: String,
    encoder: PayloadEncoder,
    interval: Duration,
    started_at: DateTime<Utc>,
    sequence: u64,
    last_status: Arc<Mutex<Option<CompressedPayload>>>,
}

impl StatusReporter {
    async fn run(mut self) {
        let mut interval = tokio::time::interval(self.interval);

        loop {
            interval.tick().await;

            let payload = match self.prepare() {
                Ok(payload) => payload,
                Err(error) => {
                    tracing::error!(%error, "failed to prepare status payload");
                    continue;
                }
            };

            tracing::debug!(
                sequence = self.sequence,
                bytes = payload.len(),
                encoding = ?payload.content_encoding(),
                "status payload ready"
            );

            match self.last_status.lock() {
                Ok(mut lock) => *lock = Some(payload),
                Err(poisoned) => *poisoned.into_inner() = Some(payload),
            }
        }
    }

    fn prepare(&mut self) -> Result<CompressedPayload, AgentError> {
        self.sequence += 1;

        let status = AgentStatus {
            hostname: &self.hostname,
            version: env!("CARGO_PKG_VERSION"),
            started_at: self.started_at,
            timestamp: Utc::now(),
            sequence: self.sequence,
        };

        let raw = serde_json::to_vec(&status).map_err(AgentError::Serialize)?;
        Ok(self.encoder.encode(&raw)?)
    }
}

#[derive(Debug)]
pub enum AgentError {
    Settings(SettingsError),
    MissingApiKey,
    AlreadyRunning,
    Serialize(serde_json::Error),
    Compression(CompressionError),
}

impl Display for AgentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentError::Settings(e) => write!(f, "failed to load settings: {}", e),
            AgentError::MissingApiKey => write!(f, "no api_key configured"),
            AgentError::AlreadyRunning => write!(f, "agent is already running"),
            AgentError::Serialize(e) => write!(f, "failed to serialize payload: {}", e),
            AgentError::Compression(e) => write!(f, "failed to compress payload: {}", e),
        }
    }
}

impl Error for AgentError {}

impl From<SettingsError> for AgentError {
    fn from(e: SettingsError) -> Self {
        AgentError::Settings(e)
    }
}

impl From<CompressionError> for AgentError {
    fn from(e: CompressionError) -> Self {
        AgentError::Compression(e)
    }
}
