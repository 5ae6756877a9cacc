//! Shared types for the pairgate workspace
//!
//! `Error`/`Result` cover configuration loading; `Secret` keeps the upload
//! API token out of logs and zeroes it on drop.

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
