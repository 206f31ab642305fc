//! marlin-flasher command line entry point

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    marlin_flasher::cli::run().await
}
