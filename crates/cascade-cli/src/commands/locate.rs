//! Show candidate settings files

use crate::console::CliConsole;
use cascade_core::error::CascadeResult;
use cascade_core::options::CascadeOptions;
use cascade_core::settings::SettingsFileKind;
use colored::*;

pub fn execute(options: &CascadeOptions, console: &CliConsole) -> CascadeResult<()> {
    let locations = options.locator().locations();

    console.print_header("Settings files");
    for kind in [
        SettingsFileKind::Setup,
        SettingsFileKind::Base,
        SettingsFileKind::User,
    ] {
        let status = if locations.exists(kind) {
            "present".green()
        } else {
            "missing".dimmed()
        };
        println!(
            "  {:<6} {:<8} {}",
            kind.to_string().bold(),
            status,
            locations.path(kind).display()
        );
    }

    console.info(&format!("Application: {}", options.application_name));
    Ok(())
}
