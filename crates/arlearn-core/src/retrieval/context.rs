//! Context assembly
//!
//! Turns the fused list and the optional graph snippet into labeled blocks
//! for the prompt. The graph snippet, when present, always comes first and is
//! never repeated among the passage blocks.

use std::fmt;

use serde::Serialize;

use super::types::FusedResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "rank", rename_all = "lowercase")]
pub enum BlockLabel {
    /// Structured facts from the entity graph
    Graph,
    /// A passage, tagged with its 1-based position in the fused list
    Passage(usize),
}

impl fmt::Display for BlockLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockLabel::Graph => write!(f, "[GRAPH]"),
            BlockLabel::Passage(rank) => write!(f, "[DOC-{}]", rank),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextBlock {
    pub label: BlockLabel,
    pub text: String,
}

impl fmt::Display for ContextBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.label, self.text)
    }
}

/// Assembled prompt context, or an explicit signal that nothing was found
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "blocks", rename_all = "lowercase")]
pub enum AssembledContext {
    Blocks(Vec<ContextBlock>),
    Empty,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        matches!(self, AssembledContext::Empty)
    }

    pub fn blocks(&self) -> &[ContextBlock] {
        match self {
            AssembledContext::Blocks(blocks) => blocks,
            AssembledContext::Empty => &[],
        }
    }

    /// Blocks rendered one per paragraph
    pub fn render(&self) -> String {
        self.blocks()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Build at most `max_items` passage blocks, plus the graph snippet in front.
pub fn assemble(
    fused: &[FusedResult],
    graph_snippet: Option<&str>,
    max_items: usize,
) -> AssembledContext {
    let graph_snippet = graph_snippet.filter(|s| !s.trim().is_empty());
    let mut blocks = Vec::new();

    if let Some(snippet) = graph_snippet {
        blocks.push(ContextBlock {
            label: BlockLabel::Graph,
            text: snippet.to_string(),
        });
    }

    for (idx, result) in fused.iter().take(max_items).enumerate() {
        if graph_snippet.is_some() && result.is_graph_sourced() {
            continue;
        }
        blocks.push(ContextBlock {
            label: BlockLabel::Passage(idx + 1),
            text: result.text.clone(),
        });
    }

    if blocks.is_empty() {
        AssembledContext::Empty
    } else {
        AssembledContext::Blocks(blocks)
    }
}
