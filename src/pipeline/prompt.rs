//! Prompt construction: few-shot prefix followed by the question block.

use crate::models::{Result, WikiragError};
use std::path::Path;

/// Fill the question block for one record.
pub fn question_block(question: &str, passage: &str) -> String {
    format!(
        "\n        Here comes your question:\n        Question: {question}\n        Document: {passage}\n        Answer:\n    "
    )
}

/// Builds completion prompts from a fixed few-shot prefix.
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    few_shot_prefix: String,
}

impl PromptBuilder {
    pub fn new(few_shot_prefix: impl Into<String>) -> Self {
        Self {
            few_shot_prefix: few_shot_prefix.into(),
        }
    }

    /// Load the few-shot prefix file.
    ///
    /// Lines keep their terminators and are joined with an extra newline,
    /// which is the layout the few-shot examples were tuned against.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| WikiragError::io(format!("reading few-shot prompt {}", path.display()), e))?;
        let prefix = content.split_inclusive('\n').collect::<Vec<_>>().join("\n");
        Ok(Self::new(prefix))
    }

    pub fn build(&self, question: &str, passage: &str) -> String {
        let mut prompt = String::with_capacity(
            self.few_shot_prefix.len() + question.len() + passage.len() + 96,
        );
        prompt.push_str(&self.few_shot_prefix);
        prompt.push_str(&question_block(question, passage));
        prompt
    }
}
