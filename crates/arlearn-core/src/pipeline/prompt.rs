//! Grounded prompt construction

use crate::retrieval::AssembledContext;

const TUTOR_INSTRUCTIONS: &str = "You are a concise tutor embedded in a 3D learning app. \
Use only the context below. If the information is incomplete or you are unsure, \
say so explicitly instead of guessing.";

const ANSWER_SHAPE: &str = "Answer in 3-6 short, clear sentences.";

/// Build the generation prompt for `question` over the assembled blocks.
///
/// Blocks are separated by blank lines, in assembly order.
pub fn build_prompt(question: &str, context: &AssembledContext) -> String {
    format!(
        "{}\n\nQuestion: {}\n\nContext:\n{}\n\n{}",
        TUTOR_INSTRUCTIONS,
        question.trim(),
        context.render(),
        ANSWER_SHAPE
    )
}
