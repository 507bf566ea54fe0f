//! Aria - caching data access and track loading for a Discord bot.
//!
//! ## Architecture
//!
//! - `config` - Environment configuration
//! - `database` - SQLite driver, Daos and cached wrappers
//! - `cache` - Moka-backed caches and their registry
//! - `tasks` - Bounded worker pool with per-key ordering
//! - `music` - Guild queues and the search/fallback loader
//! - `events` - State shared with gateway listeners

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod music;
pub mod tasks;
