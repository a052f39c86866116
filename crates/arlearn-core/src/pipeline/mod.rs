//! Hybrid answering pipeline
//!
//! One question fans out into two concurrent branches:
//! - dense: embed the question, then nearest-neighbor search over passages
//! - graph: resolve the entity hint (or infer an entity from the question)
//!   and fetch its facts
//!
//! Both branches are fused with RRF, assembled into labeled context blocks
//! and handed to the text generator. The graph branch never fails a request.
//! Dense failures follow [`DenseFailurePolicy`].
//!
//! # Usage
//!
//! ```ignore
//! let answerer = HybridAnswerer::builder()
//!     .embedder(Arc::new(HashEmbedder::new(256)))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .graph_store(Arc::new(InMemoryGraphStore::from_seed(&seed)))
//!     .generator(Arc::new(client))
//!     .build()?;
//!
//! let answer = answerer
//!     .answer(&AnswerRequest::new("Where does combustion happen?").with_collection("jet-engine-v1"))
//!     .await?;
//! ```

mod prompt;

pub use prompt::build_prompt;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{DenseFailurePolicy, RetrievalConfig};
use crate::error::{Error, Result, StoreKind};
use crate::graph::{EntityContext, GraphFactFetcher, GraphLookup, GraphStore};
use crate::llm::{Embedder, TextGenerator};
use crate::retrieval::{
    AssembledContext, COLLECTION_KEY, DenseRetriever, FusedResult, GraphHit, PassageHit,
    SCENE_KEY, SearchFilters, VectorStore, assemble, fuse,
};

/// Returned verbatim when neither source produced any context
pub const INSUFFICIENT_CONTEXT_ANSWER: &str = "I don't have enough information about this \
model to answer that question. Try selecting a part in the scene or rephrasing the question.";

/// Hint values that clients send when nothing is selected
const PLACEHOLDER_HINTS: [&str; 3] = ["null", "none", "undefined"];

/// A question plus the optional scene context it was asked in
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub question: String,
    /// Restricts passages and entity resolution to one collection
    #[serde(default)]
    pub collection_scope: Option<String>,
    /// Name of the selected entity, possibly noisy
    #[serde(default)]
    pub entity_hint: Option<String>,
    #[serde(default)]
    pub scene_hint: Option<String>,
}

impl AnswerRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }

    pub fn with_collection(mut self, collection_id: impl Into<String>) -> Self {
        self.collection_scope = Some(collection_id.into());
        self
    }

    pub fn with_entity_hint(mut self, hint: impl Into<String>) -> Self {
        self.entity_hint = Some(hint.into());
        self
    }

    pub fn with_scene(mut self, scene: impl Into<String>) -> Self {
        self.scene_hint = Some(scene.into());
        self
    }

    /// Passage filters derived from the request scope
    pub fn filters(&self) -> SearchFilters {
        SearchFilters::new()
            .with(COLLECTION_KEY, self.collection_scope.clone())
            .with(SCENE_KEY, self.scene_hint.clone())
    }
}

/// Treat blank and placeholder hints (`"null"`, `"none"`, `"undefined"`) as absent
pub fn normalize_entity_hint(raw: Option<&str>) -> Option<&str> {
    let hint = raw?.trim();
    if hint.is_empty()
        || PLACEHOLDER_HINTS
            .iter()
            .any(|placeholder| hint.eq_ignore_ascii_case(placeholder))
    {
        return None;
    }
    Some(hint)
}

/// Everything retrieval produced for one request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedContext {
    /// Full fused list, best first, before truncation
    pub fused: Vec<FusedResult>,
    /// Facts of the chosen entity, if the graph produced any
    pub entity: Option<EntityContext>,
    pub graph_status: GraphLookup<()>,
    /// Number of passages the dense branch returned
    pub dense_hits: usize,
    pub context: AssembledContext,
}

impl RetrievedContext {
    pub fn entity_name(&self) -> Option<&str> {
        self.entity.as_ref().map(|e| e.name.as_str())
    }
}

/// The hybrid retrieval-and-answer entry point
#[derive(Clone)]
pub struct HybridAnswerer {
    embedder: Arc<dyn Embedder>,
    retriever: DenseRetriever,
    facts: GraphFactFetcher,
    generator: Arc<dyn TextGenerator>,
    config: RetrievalConfig,
}

impl std::fmt::Debug for HybridAnswerer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridAnswerer")
            .field("retriever", &self.retriever)
            .field("config", &self.config)
            .finish()
    }
}

impl HybridAnswerer {
    pub fn builder() -> HybridAnswererBuilder {
        HybridAnswererBuilder::default()
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn facts(&self) -> &GraphFactFetcher {
        &self.facts
    }

    /// Run both retrieval branches and assemble the context, without generating
    pub async fn retrieve(&self, request: &AnswerRequest) -> Result<RetrievedContext> {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(Error::InvalidQuery("question is empty".to_string()));
        }

        let scope = request.collection_scope.as_deref();
        let hint = normalize_entity_hint(request.entity_hint.as_deref());
        let filters = request.filters();

        let (dense, graph) = tokio::join!(
            self.dense_branch(question, &filters),
            self.graph_branch(hint, question, scope),
        );
        let dense_hits = dense?;

        let graph_status = graph.status();
        let entity = graph.found();

        let graph_hits: Vec<GraphHit> = entity
            .iter()
            .map(|ctx| GraphHit::new(&ctx.name, ctx.snippet(), ctx.collection_id.as_deref()))
            .collect();

        let fused = fuse(&dense_hits, &graph_hits, self.config.rrf_k);
        let snippet = graph_hits.first().map(|hit| hit.text.as_str());
        let context = assemble(&fused, snippet, self.config.max_chunks);

        info!(
            dense_hits = dense_hits.len(),
            graph_status = ?graph_status,
            entity = entity.as_ref().map(|e| e.name.as_str()).unwrap_or(""),
            blocks = context.blocks().len(),
            "Retrieval completed"
        );

        Ok(RetrievedContext {
            fused,
            entity,
            graph_status,
            dense_hits: dense_hits.len(),
            context,
        })
    }

    /// Answer `request` from retrieved context only.
    ///
    /// Returns [`INSUFFICIENT_CONTEXT_ANSWER`] without calling the generator
    /// when nothing was retrieved.
    pub async fn answer(&self, request: &AnswerRequest) -> Result<String> {
        let retrieved = self.retrieve(request).await?;

        if retrieved.context.is_empty() {
            info!("No context retrieved, returning insufficiency answer");
            return Ok(INSUFFICIENT_CONTEXT_ANSWER.to_string());
        }

        let prompt = build_prompt(&request.question, &retrieved.context);
        debug!(prompt_chars = prompt.len(), "Generating answer");

        let answer = self.generator.generate(&prompt).await?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(Error::GenerationFailed(
                "generator returned an empty answer".to_string(),
            ));
        }

        Ok(answer.to_string())
    }

    /// [`answer`](Self::answer), abandoned as soon as `cancel` fires
    pub async fn answer_with_cancellation(
        &self,
        request: &AnswerRequest,
        cancel: CancellationToken,
    ) -> Result<String> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Answer cancelled by caller");
                Err(Error::Cancelled)
            }
            result = self.answer(request) => result,
        }
    }

    async fn dense_branch(&self, question: &str, filters: &SearchFilters) -> Result<Vec<PassageHit>> {
        let search = async {
            let vector = self.embedder.embed(question).await?;
            self.retriever
                .search(&vector, self.config.top_k, filters)
                .await
        };

        let outcome = match timeout(self.config.dense_timeout(), search).await {
            Ok(result) => result,
            Err(_) => Err(Error::unavailable(
                StoreKind::Vector,
                format!(
                    "dense retrieval timed out after {}ms",
                    self.config.dense_timeout_ms
                ),
            )),
        };

        match outcome {
            Err(e)
                if self.config.dense_failure_policy == DenseFailurePolicy::Degraded
                    && e.is_unavailable() =>
            {
                warn!(error = %e, "Dense retrieval unavailable, continuing without passages");
                Ok(Vec::new())
            }
            other => other,
        }
    }

    async fn graph_branch(
        &self,
        hint: Option<&str>,
        question: &str,
        scope: Option<&str>,
    ) -> GraphLookup<EntityContext> {
        let lookup = self.facts.resolve_and_fetch(hint, question, scope);
        match timeout(self.config.graph_timeout(), lookup).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    timeout_ms = self.config.graph_timeout_ms,
                    "Graph lookup timed out, continuing without graph facts"
                );
                GraphLookup::Unavailable(format!(
                    "graph lookup timed out after {}ms",
                    self.config.graph_timeout_ms
                ))
            }
        }
    }
}

/// Builder for [`HybridAnswerer`]
#[derive(Default)]
pub struct HybridAnswererBuilder {
    embedder: Option<Arc<dyn Embedder>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    graph_store: Option<Arc<dyn GraphStore>>,
    generator: Option<Arc<dyn TextGenerator>>,
    retrieval: Option<RetrievalConfig>,
}

impl HybridAnswererBuilder {
    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    pub fn graph_store(mut self, store: Arc<dyn GraphStore>) -> Self {
        self.graph_store = Some(store);
        self
    }

    pub fn generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Retrieval settings (defaults to [`RetrievalConfig::default`])
    pub fn retrieval(mut self, config: RetrievalConfig) -> Self {
        self.retrieval = Some(config);
        self
    }

    pub fn build(self) -> Result<HybridAnswerer> {
        let config = self.retrieval.unwrap_or_default();
        if config.embedding_dimensions == 0 {
            return Err(Error::ConfigError(
                "retrieval.embedding_dimensions must be greater than zero".to_string(),
            ));
        }

        let embedder = self.embedder.ok_or_else(|| missing("embedder"))?;
        let vector_store = self.vector_store.ok_or_else(|| missing("vector store"))?;
        let graph_store = self.graph_store.ok_or_else(|| missing("graph store"))?;
        let generator = self.generator.ok_or_else(|| missing("text generator"))?;

        Ok(HybridAnswerer {
            embedder,
            retriever: DenseRetriever::new(vector_store, config.embedding_dimensions),
            facts: GraphFactFetcher::new(graph_store),
            generator,
            config,
        })
    }
}

fn missing(collaborator: &str) -> Error {
    Error::ConfigError(format!("HybridAnswerer requires a {}", collaborator))
}
