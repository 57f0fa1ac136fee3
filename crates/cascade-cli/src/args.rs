//! CLI argument definitions using clap
//!
//! - cascade locate                  # Where the settings files live
//! - cascade load --database         # Run the settings cascade
//! - cascade get Logging:Level       # Read one value
//! - cascade keygen --out-dir keys   # Create an RSA key pair
//! - cascade seal "Server=db;..."    # Seal a connection string

use cascade_core::error::CascadeResult;
use cascade_core::options::{CascadeOptions, LogFormat};
use cascade_core::settings::DEFAULT_CONNECTION_STRING_NAME;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Settings type name used when none is given
pub const DEFAULT_TYPE_NAME: &str = "AppSettings";

#[derive(Parser)]
#[command(name = "cascade")]
#[command(about = "Cascade - cascading JSON settings with protected connection strings")]
#[command(
    long_about = r#"Cascade - cascading JSON settings with protected connection strings

Settings live in three files: a setup file and a base file next to the
application, and a per-user copy. Loading merges them and picks the file
whose connection string is reachable.

USAGE:
  cascade locate                      # Show candidate settings files
  cascade load --database             # Merge files and select one
  cascade get ConnectionStrings:Main  # Print a value
  cascade connection --reveal         # Print the resolved connection string

KEYS:
  cascade keygen --out-dir ./keys     # Generate RSA key PEM files
  cascade seal "<connection string>"  # Encrypt with the configured keys
  cascade open "<ciphertext>"         # Decrypt with the configured keys"#
)]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Clone, Debug, Default)]
pub struct GlobalArgs {
    /// Directory holding the base and setup settings files
    #[arg(long, global = true)]
    pub base_dir: Option<PathBuf>,

    /// Directory holding the per-user settings copy
    #[arg(long, global = true)]
    pub user_dir: Option<PathBuf>,

    /// Settings file name
    #[arg(long, global = true)]
    pub file_name: Option<String>,

    /// Setup file name
    #[arg(long, global = true)]
    pub setup_file_name: Option<String>,

    /// Application name (user directory and %AssemblyName%)
    #[arg(long, global = true)]
    pub app_name: Option<String>,

    /// RSA private key PEM file
    #[arg(long, global = true, env = "CASCADE_PRIVATE_KEY")]
    pub private_key: Option<PathBuf>,

    /// RSA public key PEM file (derived from the private key when omitted)
    #[arg(long, global = true, env = "CASCADE_PUBLIC_KEY")]
    pub public_key: Option<PathBuf>,

    /// Environment variable holding the AES passphrase
    #[arg(long, global = true)]
    pub passphrase_env: Option<String>,

    /// File holding the AES passphrase
    #[arg(long, global = true, env = "CASCADE_PASSPHRASE_FILE")]
    pub passphrase_file: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormatArg>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the setup, base and user settings paths
    Locate,

    /// Merge one settings file into another
    Merge {
        /// File whose values win
        source: PathBuf,

        /// File that is updated in place
        dest: PathBuf,
    },

    /// Run the settings cascade and report every step
    Load {
        /// Settings type name (keys the cached path)
        #[arg(long, default_value = DEFAULT_TYPE_NAME)]
        type_name: String,

        /// Select the settings file by connection string reachability
        #[arg(long)]
        database: bool,

        /// Seal plaintext connection strings when persisting
        #[arg(long)]
        crypto: bool,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a value from the settings cascade or from one file
    Get {
        /// Colon separated key, e.g. Logging:LogLevel:Default
        key: String,

        /// Read only this file instead of base and user settings
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Generate an RSA key pair for sealing connection strings
    Keygen {
        /// Directory receiving the PEM files
        #[arg(long)]
        out_dir: PathBuf,

        /// RSA modulus size
        #[arg(long, default_value_t = 2048)]
        bits: usize,

        /// Overwrite existing key files without asking
        #[arg(long)]
        force: bool,
    },

    /// Seal a connection string with the configured keys
    Seal {
        plaintext: String,
    },

    /// Open a sealed connection string with the configured keys
    Open {
        ciphertext: String,
    },

    /// Resolve a named connection string from the settings cascade
    Connection {
        /// Connection string name
        #[arg(default_value = DEFAULT_CONNECTION_STRING_NAME)]
        name: String,

        /// Print the plaintext instead of a redacted summary
        #[arg(long)]
        reveal: bool,

        /// Try a TCP connection to the server it names
        #[arg(long)]
        probe: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Compact => LogFormat::Compact,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

impl GlobalArgs {
    /// Defaults, then `CASCADE_*` variables, then flags
    pub fn options(&self) -> CascadeResult<CascadeOptions> {
        let mut options = CascadeOptions::default();
        options.apply_env_overrides()?;
        options.apply_overrides_from(|name| self.flag(name))?;

        if let Some(path) = &self.private_key {
            options.keys.private_key_path = Some(path.clone());
        }
        if let Some(path) = &self.public_key {
            options.keys.public_key_path = Some(path.clone());
        }
        if let Some(var) = &self.passphrase_env {
            options.keys.passphrase_env = Some(var.clone());
        }
        if let Some(path) = &self.passphrase_file {
            options.keys.passphrase_path = Some(path.clone());
        }
        if self.verbose {
            options.logging.level = "debug".to_string();
        }
        if let Some(format) = self.log_format {
            options.logging.format = format.into();
        }
        Ok(options)
    }

    /// Flags expressed as the environment variables they override
    fn flag(&self, name: &str) -> Option<String> {
        let path = |p: &Option<PathBuf>| p.as_ref().map(|p| p.to_string_lossy().into_owned());
        match name {
            "CASCADE_APP_NAME" => self.app_name.clone(),
            "CASCADE_BASE_DIR" => path(&self.base_dir),
            "CASCADE_USER_DIR" => path(&self.user_dir),
            "CASCADE_FILE_NAME" => self.file_name.clone(),
            "CASCADE_SETUP_FILE_NAME" => self.setup_file_name.clone(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "cascade",
            "load",
            "--database",
            "--base-dir",
            "/opt/orders",
            "--app-name",
            "orders",
            "--log-format",
            "json",
        ])
        .unwrap();

        let options = cli.global.options().unwrap();
        assert_eq!(options.base_dir, PathBuf::from("/opt/orders"));
        assert_eq!(options.application_name, "orders");
        assert_eq!(options.logging.format, LogFormat::Json);
        assert!(matches!(cli.command, Commands::Load { database: true, .. }));
    }

    #[test]
    fn test_connection_name_defaults() {
        let cli = Cli::try_parse_from(["cascade", "connection"]).unwrap();
        match cli.command {
            Commands::Connection { name, reveal, .. } => {
                assert_eq!(name, DEFAULT_CONNECTION_STRING_NAME);
                assert!(!reveal);
            }
            _ => panic!("expected connection command"),
        }
    }
}
