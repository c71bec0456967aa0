use std::path::PathBuf;

use clap::Parser;

/// Run the Guardian: a shared CONNECT proxy and approval UI for cloister egress.
#[derive(Debug, Parser)]
#[command(name = "cloister-guardian", version, about)]
pub struct Cli {
    /// Baseline YAML config file. Defaults to the platform config dir (see
    /// `CLOISTER_CONFIG_DIR`) if omitted.
    #[arg(long, env = "CLOISTER_CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// `.env` file loaded before argument parsing settles environment
    /// overrides. Skipped if absent.
    #[arg(long, env = "CLOISTER_ENV_FILE")]
    pub env_file: Option<PathBuf>,

    /// Override the CONNECT proxy bind address (config file value otherwise).
    #[arg(long)]
    pub proxy_bind: Option<String>,

    /// Override the CONNECT proxy port.
    #[arg(long)]
    pub proxy_port: Option<u16>,

    /// Override the approval UI bind address.
    #[arg(long)]
    pub ui_bind: Option<String>,

    /// Override the approval UI port.
    #[arg(long)]
    pub ui_port: Option<u16>,
}
