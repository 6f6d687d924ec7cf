//! Prompt template for retrieval-augmented answers

use crate::types::SourceChunk;

/// Instruction placed before the retrieved context
const QA_INSTRUCTIONS: &str = "Use the following pieces of context to answer the question at the end. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.";

/// Prompt builder for QA requests
pub struct PromptBuilder;

impl PromptBuilder {
    /// Join chunk texts in rank order, separated by blank lines
    pub fn build_context(sources: &[SourceChunk]) -> String {
        sources
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Build the complete prompt: instructions, context, then the question
    pub fn build_qa_prompt(question: &str, sources: &[SourceChunk]) -> String {
        format!(
            "{instructions}\n\n{context}\n\nQuestion: {question}\nHelpful Answer:",
            instructions = QA_INSTRUCTIONS,
            context = Self::build_context(sources),
            question = question
        )
    }
}
