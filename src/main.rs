//! decap - headless-browser scraping daemon driven by declarative JSON
//! scripts over HTTP.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use decap::browser::Driver;
use decap::registry::Registry;
use decap::service::{self, AppState, DEFAULT_PORT, NEW_BROWSE_PATH};

#[derive(Parser)]
#[command(name = "decap")]
#[command(about = "Headless-browser scraping daemon driven by declarative JSON scripts")]
#[command(version)]
struct Cli {
    /// Listen port (default 4531; DEBUG=true shifts to 4100 + uid % 100)
    #[arg(short, long)]
    port: Option<u16>,

    /// Run the browser with a visible window
    #[arg(long)]
    headed: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("decap=debug,chromiumoxide=warn")
        .init();

    let cli = Cli::parse();
    let debug_mode = std::env::var("DEBUG").map(|v| v == "true").unwrap_or(false);

    let headless = !(cli.headed || debug_mode);
    let driver = Arc::new(
        Driver::launch(headless)
            .await
            .context("Failed to launch browser")?,
    );

    // The registry actor owns all window/tab state; started exactly once.
    let registry = Registry::spawn(driver.clone());

    let port = cli.port.unwrap_or_else(|| {
        if debug_mode {
            service::debug_port(uid())
        } else {
            DEFAULT_PORT
        }
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;

    tracing::info!("decap listening on http://localhost:{}{}", port, NEW_BROWSE_PATH);

    axum::serve(listener, service::router(AppState { driver, registry }))
        .await
        .context("Server error")?;

    Ok(())
}

fn uid() -> u32 {
    unsafe { libc::getuid() }
}
