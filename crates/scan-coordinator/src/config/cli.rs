use clap::Parser;
use clap::Subcommand;

use crate::config::daemon::DaemonArgs;

#[derive(Parser)]
#[command(about, long_about, version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the scan coordinator daemon
    Daemon(Box<DaemonArgs>),
}
