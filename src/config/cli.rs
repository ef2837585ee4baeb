use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "autohosts")]
#[command(about = "Keeps dnsmasq running and its extra hosts file in sync with remote lists")]
pub struct Cli {
    #[arg(long, short, default_value = "autohosts.toml", help = "Bootstrap TOML config")]
    pub config: PathBuf,

    #[arg(long, short, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Register the fetch schedule and run until Ctrl-C
    Serve,
    /// Run one synchronization pass now
    Sync {
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Show daemon status
    Status,
    Start,
    Stop,
    Restart,
    /// Print the daemon log
    Logs,
    #[command(subcommand)]
    Hosts(HostsCommand),
    #[command(subcommand)]
    Schedule(ScheduleCommand),
    #[command(subcommand)]
    Timeout(TimeoutCommand),
    #[command(subcommand)]
    Sources(SourcesCommand),
}

#[derive(Debug, Clone, Subcommand)]
pub enum HostsCommand {
    Show,
    Stats,
    /// Show the hosts file path, or set it (empty string resets to default)
    Path { new_path: Option<String> },
}

#[derive(Debug, Clone, Subcommand)]
pub enum ScheduleCommand {
    Show,
    Set { expression: String },
}

#[derive(Debug, Clone, Subcommand)]
pub enum TimeoutCommand {
    Show,
    Set { timeout_ms: u64 },
}

#[derive(Debug, Clone, Subcommand)]
pub enum SourcesCommand {
    List,
    Add {
        url: String,
        #[arg(long)]
        name: Option<String>,
    },
    Update(UpdateArgs),
    Remove { id: String },
    Toggle { id: String },
}

#[derive(Debug, Clone, Args)]
pub struct UpdateArgs {
    pub id: String,
    #[arg(long)]
    pub url: Option<String>,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub enabled: Option<bool>,
}
