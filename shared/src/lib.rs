//! LiveCode Shared Library
//!
//! Wire types, field validation and client-facing error kinds shared by the
//! backend and its API consumers.

pub mod errors;
pub mod types;
pub mod validation;

// Re-export commonly used items
pub use errors::*;
pub use types::*;
