//! Entity graph: resolution, fact fetching and the stores behind them
//!
//! The graph holds the parts of each modeled system (`Entity`), the
//! Function/Process labels they link to, and neighbor links between parts.
//!
//! # Usage
//!
//! ```ignore
//! use arlearn_core::graph::{GraphFactFetcher, SqliteGraphStore};
//!
//! let fetcher = GraphFactFetcher::new(Arc::new(SqliteGraphStore::new(pool)));
//! let context = fetcher
//!     .resolve_and_fetch(Some("dividers"), "what do these do?", Some("jet-engine-v1"))
//!     .await;
//! ```

pub mod entity;
pub mod facts;
pub mod memory;
pub mod resolver;
pub mod seed;
pub mod sqlite;
pub mod store;

pub use entity::{Entity, EntityContext, Label, LabelKind};
pub use facts::{GraphFactFetcher, GraphLookup};
pub use memory::InMemoryGraphStore;
pub use resolver::{EntityResolver, MatchTier, NameProbe};
pub use seed::{CollectionSeed, EntitySeed, GraphSeed, SeedReport};
pub use sqlite::SqliteGraphStore;
pub use store::GraphStore;
