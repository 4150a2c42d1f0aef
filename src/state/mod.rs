//! State module for tracking mirror progress
//!
//! # Components
//!
//! - `UrlStatus`, `FailureReason`, `Category`, `Source`: the vocabulary of a URL record
//! - `UrlRecord`: one normalized URL and its outcome
//! - `MirrorEntry`: a file written to the mirror tree
//! - `HostState`: per-host request timing used by the politeness scheduler

mod host_state;
mod record;
mod url_status;

// Re-export main types
pub use host_state::HostState;
pub use record::{MirrorEntry, UrlRecord};
pub use url_status::{Category, FailureReason, Source, UrlStatus};
