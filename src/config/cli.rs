use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "lunch-vote")]
#[command(about = "Runs the lunch voting engine against an in-memory store")]
pub struct CliConfig {
    #[arg(long, short, help = "Path to the TOML configuration")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub json_logs: bool,
}
