//! Bookclub service wiring.
//!
//! Loads [`Config`](config::Config) from the environment, builds a
//! `StudyRuntime` over the in-memory collaborators and runs the daily sweep
//! until shutdown.

/// Environment-driven configuration
pub mod config;

/// Demo data for the in-memory backend
pub mod seed;

pub use config::{Config, ConfigError};
pub use seed::{SeedSummary, seed_demo_data};
