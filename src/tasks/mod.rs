//! Shared task execution.

mod executor;
mod service;

pub use executor::{AffinityKey, TaskHandle, TaskManager};
pub use service::{ServiceHandle, spawn_periodic};
