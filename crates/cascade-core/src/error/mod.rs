//! Error types for Cascade
//!
//! Every fallible operation in the crate returns [`CascadeResult`]. Errors carry
//! a human-readable message plus optional context, and implement
//! [`UnifiedError`] for stable error codes.

mod constructors;
mod conversions;
mod types;
mod unified_error;

pub use types::{CascadeError, CascadeResult, ResultExt, UnifiedError};
pub(crate) use unified_error::is_transient_kind;
