use anyhow::Result;
use clap::Parser;
use scan_coordinator::app::ApplicationBuilder;
use scan_coordinator::config::Cli;
use scan_coordinator::config::Commands;
use scan_coordinator::config::DaemonArgs;
use scan_coordinator::logging;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_global_hooks();

    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon(daemon_args) => run_daemon(*daemon_args).await,
    }
}

async fn run_daemon(daemon_args: DaemonArgs) -> Result<()> {
    let metrics_file = daemon_args
        .enable_metrics
        .then_some(daemon_args.metrics_file.as_path());
    let _guard = logging::init(metrics_file)?;

    tracing::info!(
        "Starting scan coordinator daemon {}",
        env!("CARGO_PKG_VERSION")
    );

    let mut app = ApplicationBuilder::new(daemon_args).build()?;
    app.run().await?;

    tracing::info!("Scan coordinator stopped");
    Ok(())
}
