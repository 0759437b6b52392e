use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "Ships logs to the logship intake, as a host service or in the foreground")]
pub struct CliArgs {
    #[command(subcommand)]
    pub cmd: Option<Commands>,

    /* settings */
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    #[arg(long("legacy-config"), alias = "legacy_config")]
    pub legacy_config: Option<PathBuf>,

    /* logging */
    #[arg(short, long, default_value = "false")]
    pub stdout: bool,
    #[arg(short, long("log-path"))]
    pub log_path: Option<String>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    Version,
    #[command(about = "Run the agent in the foreground until Ctrl+C")]
    Run,
    #[command(about = "Run the agent under a process supervisor such as systemd or launchd, logging to a file")]
    Supervised,
    #[command(name = "config-path", about = "Print the path of the settings file")]
    ConfigPath,
}
