use anyhow::Result;
use log::error;
use tokio::sync::broadcast;

use p1_reader::options::Options;
use p1_reader::prelude::LoopState;

#[tokio::main]
async fn main() -> Result<()> {
    let options = Options::new();

    if options.recent {
        return p1_reader::print_recent(options).await;
    }

    // Create a channel for shutdown signaling
    let (shutdown_tx, _) = broadcast::channel(1);

    // Handle Ctrl+C
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        if let Err(e) = shutdown_tx_clone.send(()) {
            error!("Failed to send shutdown signal: {}", e);
        }
    });

    // Run the application
    let app_handle = tokio::spawn(p1_reader::app(shutdown_tx.subscribe(), options));

    // a fatal stop exits non-zero so a supervisor can restart us
    if app_handle.await?? == LoopState::Terminated {
        std::process::exit(1);
    }

    Ok(())
}
