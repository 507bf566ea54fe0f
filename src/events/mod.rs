//! State shared with gateway event listeners.

pub mod deletions;

pub use deletions::{DeletionOrigin, DeletionRegistry};
