//! Shared types for the club engine
//!
//! Domain models and small utilities used by both the server and any
//! in-process callers (admin tooling, tests).

pub mod models;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};
