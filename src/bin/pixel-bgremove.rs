//! Background Removal CLI Tool
//!
//! Command-line interface for clearing uniform backgrounds from images with the
//! pixel-bgremove rule engine.

#[cfg(feature = "cli")]
use pixel_bgremove::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
