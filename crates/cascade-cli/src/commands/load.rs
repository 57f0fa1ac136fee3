//! Run the settings cascade

use super::repository;
use crate::console::CliConsole;
use cascade_core::crypto::ProtectedString;
use cascade_core::error::CascadeResult;
use cascade_core::options::CascadeOptions;
use cascade_core::repository::{CopyOutcome, LoadOutcome, LoadRequest, LoadStep};
use colored::*;
use serde_json::json;

pub struct LoadArgs {
    pub type_name: String,
    pub database: bool,
    pub crypto: bool,
    pub json: bool,
}

pub async fn execute(
    options: &CascadeOptions,
    args: LoadArgs,
    console: &CliConsole,
) -> CascadeResult<()> {
    let repo = repository(options)?;

    let mut request = LoadRequest::new(args.type_name);
    if args.database {
        request = request.with_database();
    }
    if args.crypto {
        request = request.with_crypto();
    }

    let outcome = repo.load_async(request).await?;

    if args.json {
        console.print_json(&outcome_json(&outcome));
        return Ok(());
    }

    console.print_header("Load");
    for step in &outcome.steps {
        print_step(step);
    }

    console.print_header("Result");
    console.print_field("Settings file", &outcome.path.display().to_string());
    console.print_field("From cache", &outcome.from_cache.to_string());
    console.print_field(
        "Connection",
        &redacted(outcome.model.connection_string()),
    );
    console.print_field(
        "Cache lifetime",
        &format!("{}s", outcome.model.cache_life_time().as_secs()),
    );

    let failures = outcome.failures().count();
    if failures > 0 {
        console.warn(&format!("{failures} step(s) failed, see above"));
    } else {
        console.success("Settings loaded");
    }
    Ok(())
}

fn outcome_json(outcome: &LoadOutcome) -> serde_json::Value {
    json!({
        "path": outcome.path,
        "from_cache": outcome.from_cache,
        "connection_string": redacted(outcome.model.connection_string()),
        "steps": outcome.steps,
    })
}

/// Connection string summary that never prints the value
pub(crate) fn redacted(value: Option<&ProtectedString>) -> String {
    match value {
        None => "none".to_string(),
        Some(ProtectedString::Sealed(sealed)) => format!("sealed ({} chars)", sealed.len()),
        Some(ProtectedString::Plain(plain)) => {
            format!("plain ({} chars)", plain.chars().count())
        }
    }
}

fn print_step(step: &LoadStep) {
    let line = match step {
        LoadStep::CacheHit { path } => format!("cache hit {}", path.display()),
        LoadStep::Located { setup, base, user } => format!(
            "located setup={} base={} user={}",
            setup.display(),
            base.display(),
            user.display()
        ),
        LoadStep::CopiedToUser(CopyOutcome::Copied(path)) => {
            format!("copied base settings to {}", path.display())
        }
        LoadStep::CopiedToUser(CopyOutcome::AlreadyPresent(path)) => {
            format!("user settings already at {}", path.display())
        }
        LoadStep::CopiedToUser(CopyOutcome::SourceMissing(path)) => {
            format!("no base settings at {}", path.display())
        }
        LoadStep::CopyFailed { error } => format!("copy failed: {error}").red().to_string(),
        LoadStep::Merged { from, to, outcome } => format!("merge {from} -> {to}: {outcome:?}"),
        LoadStep::MergeFailed { from, to, error } => {
            format!("merge {from} -> {to} failed: {error}").red().to_string()
        }
        LoadStep::SetupDeleted { path } => format!("removed setup file {}", path.display()),
        LoadStep::SetupKept { path, reason } => format!("kept {} ({reason})", path.display())
            .yellow()
            .to_string(),
        LoadStep::Probed { kind, reachable } => {
            let state = if *reachable {
                "reachable".green()
            } else {
                "unreachable".yellow()
            };
            format!("probed {kind} connection: {state}")
        }
        LoadStep::Selected { kind, path } => format!("selected {kind} {}", path.display()),
        LoadStep::ConnectionStringSealed => "sealed connection string".to_string(),
        LoadStep::Persisted { path } => format!("persisted {}", path.display()),
        LoadStep::PersistFailed { path, error } => {
            format!("persisting {} failed: {error}", path.display())
                .red()
                .to_string()
        }
        LoadStep::Cached { path, ttl } => {
            format!("cached {} for {}s", path.display(), ttl.as_secs())
        }
    };
    println!("  {} {}", "→".dimmed(), line);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacted_never_shows_value() {
        let plain = ProtectedString::Plain("Server=db;Password=hunter2".to_string());
        let text = redacted(Some(&plain));
        assert!(!text.contains("hunter2"));
        assert_eq!(text, "plain (26 chars)");
        assert_eq!(redacted(None), "none");
    }
}
