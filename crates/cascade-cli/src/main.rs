//! Cascade CLI application
//!
//! Inspect and drive cascading settings files from the command line.
//!
//! # Installation
//!
//! ```bash
//! cargo install --path crates/cascade-cli
//! ```
//!
//! Every command accepts the global directory and key flags; `CASCADE_*`
//! environment variables fill in whatever the flags leave out. See
//! `cascade --help` for the full list.

mod args;
mod commands;
mod console;
mod logging;
mod router;

use args::Cli;
use cascade_core::error::CascadeResult;
use clap::Parser;

#[tokio::main]
async fn main() -> CascadeResult<()> {
    let cli = Cli::parse();
    router::route(cli).await
}
