//! Command routing logic for CLI

use crate::args::{Cli, Commands};
use crate::commands;
use crate::console::CliConsole;
use crate::logging;
use cascade_core::error::CascadeResult;

/// Route CLI commands to their respective handlers
pub async fn route(cli: Cli) -> CascadeResult<()> {
    let options = cli.global.options()?;
    logging::init(&options.logging);
    let console = CliConsole::new(cli.global.verbose);
    tracing::debug!(base_dir = %options.base_dir.display(), user_dir = %options.user_dir.display(), "resolved options");

    let result = match cli.command {
        Commands::Locate => commands::locate::execute(&options, &console),
        Commands::Merge { source, dest } => {
            commands::merge::execute(&options, &source, &dest, &console).await
        }
        Commands::Load {
            type_name,
            database,
            crypto,
            json,
        } => {
            let args = commands::load::LoadArgs {
                type_name,
                database,
                crypto,
                json,
            };
            commands::load::execute(&options, args, &console).await
        }
        Commands::Get { key, file } => {
            commands::get::execute(&options, &key, file.as_deref(), &console).await
        }
        Commands::Keygen {
            out_dir,
            bits,
            force,
        } => commands::keys::keygen(&options, &out_dir, bits, force, &console).await,
        Commands::Seal { plaintext } => commands::keys::seal(&options, &plaintext, &console),
        Commands::Open { ciphertext } => commands::keys::open(&options, &ciphertext),
        Commands::Connection {
            name,
            reveal,
            probe,
        } => commands::connection::execute(&options, &name, reveal, probe, &console).await,
    };

    if let Err(e) = &result {
        console.error(&e.to_string());
    }
    result
}
