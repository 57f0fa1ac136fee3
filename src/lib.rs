//! Cascade
//!
//! Cascading setup/user/base JSON settings files with merge, path caching and
//! sealed connection strings. This crate re-exports [`cascade_core`]; the
//! `cascade` binary lives in `crates/cascade-cli`.
//!
//! ```no_run
//! use cascade::{CascadeOptions, LoadRequest, SettingsRepository};
//!
//! # fn main() -> cascade::CascadeResult<()> {
//! let repo = SettingsRepository::new(CascadeOptions::for_application("orders"))?;
//! let outcome = repo.load(&LoadRequest::new("OrderSettings").with_database())?;
//! println!("settings from {}", outcome.path.display());
//! # Ok(())
//! # }
//! ```

pub use cascade_core::*;
