use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

use crate::CliError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stdout,
    File(PathBuf),
}

impl LogTarget {
    /// Log file used when a supervisor starts the agent without a `--log-path`.
    pub fn default_service_file() -> PathBuf {
        match dirs::data_local_dir() {
            Some(root) => root.join("logship").join("logs").join("agent.log"),
            None => PathBuf::from("logship-agent.log"),
        }
    }
}

/// Installs the global subscriber. The returned guard flushes buffered
/// records when dropped and must live until the program exits.
pub fn init(target: &LogTarget) -> Result<WorkerGuard, CliError> {
    let filter = EnvFilter::try_from_env("LOGSHIP_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    let (non_blocking, guard, use_ansi) = match target {
        LogTarget::Stdout => {
            let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
            (writer, guard, true)
        }
        LogTarget::File(path) => {
            let (dir, file) = split_log_path(path);
            std::fs::create_dir_all(&dir).map_err(|e| CliError::LoggingSetup(e.to_string()))?;

            let appender = RollingFileAppender::builder()
                .rotation(Rotation::NEVER)
                .filename_prefix(file)
                .build(&dir)
                .map_err(|e| CliError::LoggingSetup(e.to_string()))?;

            let (writer, guard) = tracing_appender::non_blocking(appender);
            (writer, guard, false)
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(use_ansi)
        .with_writer(non_blocking)
        .try_init()
        .map_err(|e| CliError::LoggingSetup(e.to_string()))?;

    Ok(guard)
}

fn split_log_path(path: &Path) -> (PathBuf, String) {
    let file = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| "agent.log".to_string());

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    (dir, file)
}
