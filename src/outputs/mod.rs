//! Output stage handing accepted items to downstream collaborators.
//!
//! # Submodules
//!
//! - [`json`]: Writes the accepted batch to the JSON outbox file

pub mod json;
