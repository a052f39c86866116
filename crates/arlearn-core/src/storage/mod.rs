//! Storage layer - SQLite
//!
//! Provides database management and migrations shared by the SQLite graph
//! store and the SQLite passage index.
//!
//! # Usage
//!
//! ```ignore
//! use arlearn_core::storage::Database;
//!
//! // Create an in-memory database for testing
//! let db = Database::in_memory().await?;
//!
//! // Or open the configured file
//! let db = Database::open(config.storage.resolved_database_path()).await?;
//! ```

pub mod database;
pub mod migrations;

pub use database::{Database, DatabaseConfig, default_database_path};
pub use migrations::{CURRENT_VERSION, MigrationStatus, migration_status, run_migrations};
