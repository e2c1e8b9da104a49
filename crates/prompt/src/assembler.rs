//! Prompt assembler for grounded answers.
//!
//! Retrieved chunks are labelled with their 1-based rank, joined in rank
//! order into a CONTEXT block bounded by a character budget, and rendered
//! into the system/user message pair of a [`PromptDefinition`].

use crate::types::{AssembledPrompt, AssembledPromptMetadata, PromptDefinition};
use blogsearch_core::{AppError, AppResult};
use handlebars::Handlebars;
use serde_json::json;

const SYSTEM_TEMPLATE: &str = "system";
const USER_TEMPLATE: &str = "user";
const CHUNK_TEMPLATE: &str = "chunk";

/// Renders a prompt definition against retrieved chunks.
#[derive(Debug)]
pub struct PromptAssembler {
    definition: PromptDefinition,
    budget_chars: usize,
    handlebars: Handlebars<'static>,
}

impl PromptAssembler {
    /// Compile the templates of `definition`.
    ///
    /// `budget_chars` bounds the rendered CONTEXT block and must be non-zero.
    pub fn new(definition: PromptDefinition, budget_chars: usize) -> AppResult<Self> {
        if budget_chars == 0 {
            return Err(AppError::Prompt(
                "Context budget must be greater than zero".to_string(),
            ));
        }

        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(handlebars::no_escape);

        for (name, template) in [
            (SYSTEM_TEMPLATE, &definition.system),
            (USER_TEMPLATE, &definition.template),
            (CHUNK_TEMPLATE, &definition.chunk_label),
        ] {
            handlebars
                .register_template_string(name, template)
                .map_err(|e| {
                    AppError::Prompt(format!(
                        "Failed to register {} template of '{}': {}",
                        name, definition.id, e
                    ))
                })?;
        }

        Ok(Self {
            definition,
            budget_chars,
            handlebars,
        })
    }

    /// The fixed sentence the generator is told to use when CONTEXT has no answer.
    pub fn fallback(&self) -> &str {
        &self.definition.fallback
    }

    /// Identifier of the underlying prompt definition.
    pub fn prompt_id(&self) -> &str {
        &self.definition.id
    }

    /// Context budget in characters.
    pub fn budget_chars(&self) -> usize {
        self.budget_chars
    }

    /// Assemble a prompt from chunks given in rank order.
    pub fn assemble<S: AsRef<str>>(&self, chunks: &[S], query: &str) -> AppResult<AssembledPrompt> {
        let separator = &self.definition.chunk_separator;
        let separator_chars = separator.chars().count();

        let mut context = String::new();
        let mut context_chars = 0usize;
        let mut included = 0usize;
        let mut truncated = false;

        for (idx, chunk) in chunks.iter().enumerate() {
            let label = self.render(
                CHUNK_TEMPLATE,
                &json!({ "ordinal": idx + 1, "content": chunk.as_ref() }),
            )?;
            let label_chars = label.chars().count();
            let needed = if included == 0 {
                label_chars
            } else {
                label_chars + separator_chars
            };

            if context_chars + needed <= self.budget_chars {
                if included > 0 {
                    context.push_str(separator);
                }
                context.push_str(&label);
                context_chars += needed;
                included += 1;
                continue;
            }

            if included == 0 {
                let cut: String = label.chars().take(self.budget_chars).collect();
                context_chars = cut.chars().count();
                context = cut;
                included = 1;
            }
            truncated = true;
            break;
        }

        if truncated {
            tracing::debug!(
                "Context budget {} reached: kept {} of {} chunks",
                self.budget_chars,
                included,
                chunks.len()
            );
        }

        let system = self.render(
            SYSTEM_TEMPLATE,
            &json!({ "context": context, "fallback": self.definition.fallback }),
        )?;
        let user = self.render(
            USER_TEMPLATE,
            &json!({ "query": query, "fallback": self.definition.fallback }),
        )?;

        Ok(AssembledPrompt {
            system,
            user,
            metadata: AssembledPromptMetadata {
                source_prompt_id: self.definition.id.clone(),
                chunks_supplied: chunks.len(),
                chunks_included: included,
                truncated,
                context_chars,
            },
        })
    }

    fn render(&self, name: &str, data: &serde_json::Value) -> AppResult<String> {
        self.handlebars
            .render(name, data)
            .map_err(|e| AppError::Prompt(format!("Failed to render {} template: {}", name, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{default_definition, DEFAULT_FALLBACK};

    fn plain_definition() -> PromptDefinition {
        PromptDefinition {
            id: "test".to_string(),
            title: "Test".to_string(),
            api_version: "1.0".to_string(),
            fallback: "none".to_string(),
            system: "CTX:{{context}}".to_string(),
            template: "Q:{{query}}".to_string(),
            chunk_label: "[{{ordinal}}] {{content}}".to_string(),
            chunk_separator: "\n".to_string(),
        }
    }

    #[test]
    fn test_empty_chunks_keep_fallback() {
        let assembler = PromptAssembler::new(default_definition(), 6000).unwrap();
        let chunks: Vec<String> = Vec::new();
        let prompt = assembler.assemble(&chunks, "AI là gì?").unwrap();

        assert!(prompt.system.contains(DEFAULT_FALLBACK));
        assert!(prompt.system.ends_with("CONTEXT:\n"));
        assert!(prompt.user.contains("AI là gì?"));
        assert_eq!(prompt.metadata.chunks_included, 0);
        assert!(!prompt.metadata.truncated);
    }

    #[test]
    fn test_chunks_labelled_in_rank_order() {
        let assembler = PromptAssembler::new(plain_definition(), 1000).unwrap();
        let prompt = assembler.assemble(&["alpha", "beta"], "q").unwrap();

        assert_eq!(prompt.system, "CTX:[1] alpha\n[2] beta");
        assert_eq!(prompt.user, "Q:q");
        assert_eq!(prompt.metadata.chunks_included, 2);
        assert_eq!(prompt.metadata.context_chars, "[1] alpha\n[2] beta".len());
    }

    #[test]
    fn test_budget_drops_lowest_ranked_first() {
        // "[1] alpha" = 9 chars, "\n[2] beta" = 9 chars
        let assembler = PromptAssembler::new(plain_definition(), 12).unwrap();
        let prompt = assembler.assemble(&["alpha", "beta", "gamma"], "q").unwrap();

        assert_eq!(prompt.system, "CTX:[1] alpha");
        assert_eq!(prompt.metadata.chunks_supplied, 3);
        assert_eq!(prompt.metadata.chunks_included, 1);
        assert!(prompt.metadata.truncated);
    }

    #[test]
    fn test_oversized_top_chunk_is_cut_on_char_boundary() {
        let assembler = PromptAssembler::new(plain_definition(), 8).unwrap();
        let prompt = assembler.assemble(&["Tiếng Việt có dấu"], "q").unwrap();

        assert_eq!(prompt.system, "CTX:[1] Tiến");
        assert_eq!(prompt.metadata.context_chars, 8);
        assert!(prompt.metadata.truncated);
    }

    #[test]
    fn test_vietnamese_default_labels() {
        let assembler = PromptAssembler::new(default_definition(), 6000).unwrap();
        let prompt = assembler
            .assemble(&["AI thay đổi báo chí."], "AI sẽ thay đổi ngành báo chí như thế nào?")
            .unwrap();

        assert!(prompt
            .system
            .contains("Nội dung bài viết 1: AI thay đổi báo chí."));
        assert_eq!(assembler.fallback(), DEFAULT_FALLBACK);
    }

    #[test]
    fn test_zero_budget_rejected() {
        assert!(PromptAssembler::new(plain_definition(), 0).is_err());
    }
}
