use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::IsTerminal;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use logship_agent_service::{ConsoleHost, ServiceController, ServiceRunError, TracingEventLog, run_service};

use crate::args::{CliArgs, Commands};
use crate::log_agent::LogAgent;
use crate::logging::LogTarget;
use crate::recovery::config_files;
use crate::settings::AgentSettings;

pub mod args;
pub mod log_agent;
pub mod logging;
pub mod recovery;
pub mod settings;

pub const SERVICE_NAME: &str = "logship-agent";

#[tokio::main]
async fn main() -> Result<ExitCode, CliError> {
    let args = CliArgs::parse();

    /* without a command and without a terminal a supervisor is the caller */
    let command = match args.cmd {
        Some(command) => command,
        None if std::io::stdin().is_terminal() => Commands::Run,
        None => Commands::Supervised,
    };

    match command {
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }
        Commands::ConfigPath => {
            println!("{}", config_path(&args).await.display());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run | Commands::Supervised => {
            let target = match (args.stdout, args.log_path.as_ref()) {
                (true, Some(_)) => return Err(CliError::InvalidArgs("cannot use --stdout and --log-path together")),
                (false, Some(path)) => LogTarget::File(path.into()),
                (true, None) => LogTarget::Stdout,
                (false, None) if command == Commands::Run => LogTarget::Stdout,
                (false, None) => LogTarget::File(LogTarget::default_service_file()),
            };

            let _guard = logging::init(&target)?;
            run_agent(&args).await
        }
    }
}

async fn config_path(args: &CliArgs) -> std::path::PathBuf {
    match &args.config {
        Some(path) => path.clone(),
        None => AgentSettings::default_path().await,
    }
}

async fn run_agent(args: &CliArgs) -> Result<ExitCode, CliError> {
    let config_path = config_path(args).await;
    tracing::info!(config = %config_path.display(), "starting {}", SERVICE_NAME);

    let worker = Arc::new(LogAgent::new(config_path.clone()));
    let recovery = config_files(&config_path, args.legacy_config.clone());
    let controller = ServiceController::with_recovery(SERVICE_NAME, worker, recovery);

    let mut host = ConsoleHost::new();
    let log = TracingEventLog::new(SERVICE_NAME);

    let exit = run_service(&controller, &mut host, &log).await?;
    if let Some(error) = &exit.worker_error {
        tracing::error!(%error, "agent did not run");
    }

    Ok(ExitCode::from(exit.exit_code().min(u8::MAX as u32) as u8))
}

#[derive(Debug)]
pub enum CliError {
    InvalidArgs(&'static str),
    LoggingSetup(String),
    Service(ServiceRunError),
}

impl Display for CliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::InvalidArgs(msg) => write!(f, "invalid arguments: {}", msg),
            CliError::LoggingSetup(msg) => write!(f, "failed to set up logging: {}", msg),
            CliError::Service(e) => write!(f, "{}", e),
        }
    }
}

impl Error for CliError {}

impl From<ServiceRunError> for CliError {
    fn from(e: ServiceRunError) -> Self {
        CliError::Service(e)
    }
}
