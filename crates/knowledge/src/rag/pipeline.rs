//! Search orchestration: embed, retrieve, assemble, generate.

use crate::embeddings::EmbedderHandle;
use crate::rag::classify::QuestionClassifier;
use crate::rag::error::{PipelineStage, SearchError};
use crate::rag::grounding::{grounding_ratio, LOW_GROUNDING};
use crate::rag::types::{AnswerStatus, AskResponse, SearchHit, SearchResponse, ANSWER_UNAVAILABLE};
use crate::types::ScoredChunk;
use crate::vector_index::VectorIndex;
use blogsearch_core::config::{GeneratorSettings, SearchSettings};
use blogsearch_core::{AppError, AppResult};
use blogsearch_llm::{LlmClient, LlmRequest};
use blogsearch_prompt::PromptAssembler;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::Instrument;
use uuid::Uuid;

/// Upper bounds for each network-bound stage.
#[derive(Debug, Clone, Copy)]
pub struct StageTimeouts {
    pub embed: Duration,
    pub retrieval: Duration,
    pub generation: Duration,
}

impl From<&SearchSettings> for StageTimeouts {
    fn from(settings: &SearchSettings) -> Self {
        Self {
            embed: Duration::from_secs(settings.embed_timeout_secs),
            retrieval: Duration::from_secs(settings.retrieval_timeout_secs),
            generation: Duration::from_secs(settings.generation_timeout_secs),
        }
    }
}

#[derive(Debug, Clone)]
struct Generation {
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

/// Answers queries over the post index.
///
/// Cheap to clone; every component is shared. Each call runs the stages in
/// order inside the caller's future, so dropping that future cancels
/// whatever stage is in flight.
#[derive(Clone)]
pub struct SearchPipeline {
    embedder: EmbedderHandle,
    index: Arc<dyn VectorIndex>,
    assembler: Arc<PromptAssembler>,
    llm: Arc<dyn LlmClient>,
    generation: Generation,
    classifier: QuestionClassifier,
    top_k: usize,
    min_score: Option<f32>,
    timeouts: StageTimeouts,
}

impl SearchPipeline {
    pub fn new(
        embedder: EmbedderHandle,
        index: Arc<dyn VectorIndex>,
        assembler: PromptAssembler,
        llm: Arc<dyn LlmClient>,
        search: &SearchSettings,
        generator: &GeneratorSettings,
    ) -> AppResult<Self> {
        if search.top_k == 0 {
            return Err(AppError::Config("search.topK must be > 0".to_string()));
        }
        if embedder.dimensions() != index.dimensions() {
            return Err(AppError::Config(format!(
                "Embedder produces {}-dimensional vectors but the index stores {}",
                embedder.dimensions(),
                index.dimensions()
            )));
        }

        Ok(Self {
            embedder,
            index,
            assembler: Arc::new(assembler),
            llm,
            generation: Generation {
                model: generator.model.clone(),
                temperature: generator.temperature,
                max_tokens: generator.max_tokens,
            },
            classifier: QuestionClassifier::new(search.question_word_threshold),
            top_k: search.top_k,
            min_score: search.min_score,
            timeouts: StageTimeouts::from(search),
        })
    }

    /// Override the stage timeouts.
    pub fn with_timeouts(mut self, timeouts: StageTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn embedder(&self) -> &EmbedderHandle {
        &self.embedder
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Retrieve chunks for `query` and, for questions, generate an answer.
    pub async fn search(&self, query: &str) -> Result<SearchResponse, SearchError> {
        let span = tracing::info_span!("search", request_id = %Uuid::new_v4());
        let result = self.run_search(query).instrument(span.clone()).await;
        span.in_scope(|| log_outcome(&result));
        result
    }

    /// Answer `query` from the single best chunk.
    pub async fn ask(&self, query: &str) -> Result<AskResponse, SearchError> {
        let span = tracing::info_span!("ask", request_id = %Uuid::new_v4());
        let result = self.run_ask(query).instrument(span.clone()).await;
        span.in_scope(|| log_outcome(&result));
        result
    }

    async fn run_search(&self, query: &str) -> Result<SearchResponse, SearchError> {
        let query = validate_query(query)?;
        let is_question = self.classifier.is_question(query);
        tracing::info!(is_question, "Search started");

        let hits = self.retrieve(query, self.top_k).await?;
        let contents: Vec<&str> = hits.iter().map(|hit| hit.content.as_str()).collect();

        let (answer, answer_status, grounding) = if !is_question {
            (String::new(), AnswerStatus::Skipped, None)
        } else if hits.is_empty() {
            tracing::info!("Nothing retrieved, answering with fallback");
            (self.assembler.fallback().to_string(), AnswerStatus::NoContext, None)
        } else {
            match self.generate(&contents, query).await {
                Ok(answer) => {
                    let grounding = self.check_grounding(&answer, &contents);
                    (answer, AnswerStatus::Generated, grounding)
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Generation failed, returning placeholder");
                    (ANSWER_UNAVAILABLE.to_string(), AnswerStatus::Unavailable, None)
                }
            }
        };

        enter(PipelineStage::Done);
        Ok(SearchResponse {
            chunks: hits.into_iter().map(SearchHit::from).collect(),
            answer,
            is_question,
            answer_status,
            grounding,
        })
    }

    async fn run_ask(&self, query: &str) -> Result<AskResponse, SearchError> {
        let query = validate_query(query)?;
        let hits = self.retrieve(query, 1).await?;
        let context = hits
            .into_iter()
            .next()
            .map(|hit| hit.content)
            .unwrap_or_default();

        let answer = if context.is_empty() {
            self.assembler.fallback().to_string()
        } else {
            match self.generate(&[context.as_str()], query).await {
                Ok(answer) => {
                    self.check_grounding(&answer, &[context.as_str()]);
                    answer
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Generation failed, returning placeholder");
                    ANSWER_UNAVAILABLE.to_string()
                }
            }
        };

        enter(PipelineStage::Done);
        Ok(AskResponse {
            query: query.to_string(),
            context,
            answer,
        })
    }

    /// Embedding and retrieval. Any failure here ends the request.
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>, SearchError> {
        enter(PipelineStage::Embedding);
        let vector = timeout(self.timeouts.embed, self.embedder.embed(query))
            .await
            .map_err(|_| timed_out(PipelineStage::Embedding, self.timeouts.embed))??;

        enter(PipelineStage::Retrieving);
        let mut hits = timeout(self.timeouts.retrieval, self.index.query(&vector, k))
            .await
            .map_err(|_| timed_out(PipelineStage::Retrieving, self.timeouts.retrieval))?
            .map_err(|e| SearchError::retrieval(PipelineStage::Retrieving, e))?;

        if let Some(min_score) = self.min_score {
            hits.retain(|hit| hit.score >= min_score);
        }

        tracing::debug!(
            hits = hits.len(),
            top_score = hits.first().map(|hit| hit.score),
            "Retrieved chunks"
        );
        Ok(hits)
    }

    async fn generate(&self, contents: &[&str], query: &str) -> Result<String, SearchError> {
        enter(PipelineStage::Assembling);
        let prompt = self
            .assembler
            .assemble(contents, query)
            .map_err(|e| SearchError::GenerationUnavailable(e.to_string()))?;
        tracing::debug!(
            chunks_included = prompt.metadata.chunks_included,
            context_chars = prompt.metadata.context_chars,
            truncated = prompt.metadata.truncated,
            "Assembled prompt"
        );

        enter(PipelineStage::Generating);
        let mut request =
            LlmRequest::new(prompt.user, self.generation.model.clone()).with_system(prompt.system);
        if let Some(temperature) = self.generation.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.generation.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        let response = timeout(self.timeouts.generation, self.llm.complete(&request))
            .await
            .map_err(|_| {
                SearchError::GenerationUnavailable(format!(
                    "timed out after {:?}",
                    self.timeouts.generation
                ))
            })?
            .map_err(|e| SearchError::GenerationUnavailable(e.to_string()))?;

        let answer = response.content.trim();
        if answer.is_empty() {
            return Err(SearchError::GenerationUnavailable("empty completion".to_string()));
        }
        Ok(answer.to_string())
    }

    fn check_grounding(&self, answer: &str, contents: &[&str]) -> Option<f32> {
        if answer == self.assembler.fallback() {
            return None;
        }
        let ratio = grounding_ratio(answer, &contents.join("\n"));
        if let Some(ratio) = ratio.filter(|ratio| *ratio < LOW_GROUNDING) {
            tracing::warn!(grounding = ratio, "Answer may not be grounded in the retrieved posts");
        }
        ratio
    }
}

fn validate_query(query: &str) -> Result<&str, SearchError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(SearchError::InvalidInput("Query is required".to_string()));
    }
    Ok(query)
}

fn enter(stage: PipelineStage) {
    tracing::debug!(%stage, "Pipeline stage");
}

fn timed_out(stage: PipelineStage, after: Duration) -> SearchError {
    SearchError::retrieval(stage, format!("timed out after {:?}", after))
}

fn log_outcome<T>(result: &Result<T, SearchError>) {
    match result {
        Ok(_) => {}
        Err(err @ SearchError::InvalidInput(_)) => {
            tracing::warn!(stage = %PipelineStage::Failed, error = %err, "Rejected query")
        }
        Err(err) => tracing::error!(stage = %PipelineStage::Failed, error = %err, "Search failed"),
    }
}
