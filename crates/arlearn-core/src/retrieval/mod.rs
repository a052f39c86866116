//! Dense retrieval, rank fusion, context assembly and passage ingestion

pub mod context;
pub mod dense;
pub mod fusion;
pub mod ingest;
pub mod memory;
pub mod sqlite;
pub mod types;

pub use context::{AssembledContext, BlockLabel, ContextBlock, assemble};
pub use dense::{DenseRetriever, VectorStore, cosine_similarity, validate_query_vector};
pub use fusion::{DEFAULT_RRF_K, fuse};
pub use ingest::{
    CHUNK_INDEX_KEY, ChunkOptions, PAGE_KEY, SUBJECT_KEY, SourceDocument, SourcePage, TITLE_KEY,
    embed_document, embed_passages, split_passages,
};
pub use memory::InMemoryVectorStore;
pub use sqlite::SqliteVectorStore;
pub use types::{
    COLLECTION_KEY, FusedResult, GRAPH_HIT_SCORE, GraphHit, Metadata, PassageHit, PassageRecord,
    SCENE_KEY, SearchFilters,
};
