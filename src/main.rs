// Entrypoint for the CLI application.
// - Keeps `main` small: set up logging, load configuration and hand it to
//   the UI loop.
// - Logs go to stderr (filtered by `RUST_LOG`, default `warn`) so the menu
//   output on stdout stays readable.

use anyhow::Context;
use pbi_export_cli::{config::AppConfig, ui::main_menu};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    // Blocks until the user exits the menu.
    main_menu(config)?;
    Ok(())
}
