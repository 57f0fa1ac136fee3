//! Resolve a named connection string

use super::load::redacted;
use super::repository;
use crate::console::CliConsole;
use cascade_core::connection::{ConnectionStringParts, ConnectivityProbe, TcpProbe};
use cascade_core::error::{CascadeError, CascadeResult};
use cascade_core::options::CascadeOptions;
use cascade_core::repository::LoadRequest;
use colored::*;

pub async fn execute(
    options: &CascadeOptions,
    name: &str,
    reveal: bool,
    probe: bool,
    console: &CliConsole,
) -> CascadeResult<()> {
    let repo = repository(options)?;
    let mut request = LoadRequest::new("ConnectionSettings").with_database();
    if repo.resolver().cipher().is_some() {
        request = request.with_crypto();
    }

    let mut model = repo.load_async(request).await?.model;
    model.set_connection_string_name(name);

    let stored = model.connection_string().cloned();
    let Some(stored) = stored else {
        return Err(CascadeError::not_found_resource(
            format!("no connection string named '{name}'"),
            "connection string",
        ));
    };
    let plaintext = repo.resolver().reveal(&stored)?;

    console.print_header(&format!("Connection '{name}'"));
    console.print_field("Stored", &redacted(Some(&stored)));
    if reveal {
        console.print_field("Value", &plaintext);
    }

    match ConnectionStringParts::parse(&plaintext)
        .ok()
        .and_then(|parts| parts.endpoint())
    {
        Some(endpoint) => console.print_field("Endpoint", &endpoint.to_string()),
        None => console.print_field("Endpoint", "none (file or embedded database)"),
    }

    if probe {
        let tcp = TcpProbe::new(options.probe_timeout);
        let reachable = tokio::task::spawn_blocking(move || tcp.try_open(&plaintext)).await?;
        let state = if reachable {
            "reachable".green()
        } else {
            "unreachable".red()
        };
        console.print_field("Probe", &state.to_string());
    }
    Ok(())
}
