use clap::Parser;
use sm_bump::cli::{run, Cli};
use sm_bump_core::SyncError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing for the CLI.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    tracing::info!("CLI application startup: tracing initialised, environment loaded");

    let cli = Cli::parse();
    tracing::info!("CLI arguments parsed, invoking run");
    match run(cli).await {
        Ok(()) => {
            tracing::info!("CLI completed successfully");
        }
        Err(e) => {
            tracing::error!(error = %e, "CLI exited with error");
            match e.downcast_ref::<SyncError>() {
                Some(sync) => eprintln!("[ERROR] {} failed: {:#}", sync.stage(), e),
                None => eprintln!("[ERROR] {:#}", e),
            }
            std::process::exit(1);
        }
    }
}
