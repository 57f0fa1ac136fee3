//! CLI console utilities

use colored::*;
use console::Term;
use std::io::{self, Write};

/// CLI console for formatted output
pub struct CliConsole {
    verbose: bool,
}

impl CliConsole {
    /// Create a new CLI console
    pub const fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.verbose {
            println!("{} {}", "ℹ".blue().bold(), message);
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        println!("{} {}", "✓".green().bold(), message.green());
    }

    /// Print a warning message
    pub fn warn(&self, message: &str) {
        println!("{} {}", "⚠".yellow().bold(), message.yellow());
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", "✗".red().bold(), message.red());
    }

    /// Print a header
    pub fn print_header(&self, title: &str) {
        println!();
        println!("{}", title.bold().underline());
        println!("{}", "=".repeat(title.len()).dimmed());
    }

    /// Print an aligned label and value
    pub fn print_field(&self, label: &str, value: &str) {
        println!("  {:<18} {}", format!("{label}:").cyan(), value);
    }

    /// Print JSON in a formatted way
    pub fn print_json(&self, json: &serde_json::Value) {
        match serde_json::to_string_pretty(json) {
            Ok(formatted) => println!("{formatted}"),
            Err(_) => println!("{json}"),
        }
    }

    /// Ask for user confirmation
    pub fn confirm(&self, message: &str) -> io::Result<bool> {
        print!("{} {} [y/N]: ", "?".yellow().bold(), message);
        io::stdout().flush()?;

        let input = Term::stdout().read_line()?;
        Ok(matches!(input.trim().to_lowercase().as_str(), "y" | "yes"))
    }

    /// Read a line without echoing it
    pub fn secret(&self, prompt: &str) -> io::Result<String> {
        let term = Term::stderr();
        term.write_str(&format!("{} {}: ", "?".blue().bold(), prompt))?;
        term.read_secure_line()
    }

    /// Whether prompts can be answered
    pub fn is_interactive(&self) -> bool {
        Term::stdout().is_term()
    }
}
