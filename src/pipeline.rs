//! Q&A Pipeline
//!
//! Orchestrates the full retrieval-augmented flow. Indexing runs
//! clean -> chunk -> embed -> store; answering runs embed -> nearest
//! neighbors -> generate, returning the answer together with the
//! retrieval trace. All components are injected; the pipeline holds no
//! global state beyond the index it owns.

use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::chunker::{self, ChunkerError};
use crate::config::Settings;
use crate::embedding::{Embedder, EmbeddingError};
use crate::generator::{AnswerGenerator, GenerationOptions, GeneratorError, TokenUsage};
use crate::store::{EmbeddedChunk, Retrieved, StoreError, VectorIndex};

/// Context text length (in chars) surfaced in answer payloads.
const CONTEXT_PREVIEW_CHARS: usize = 200;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Chunker(#[from] ChunkerError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Generator(#[from] GeneratorError),
}

/// Result of an indexing run.
#[derive(Debug, Clone, Serialize)]
pub struct IndexSummary {
    pub chunks_created: usize,
    pub documents_indexed: usize,
}

/// One context chunk as surfaced to the caller, preview-truncated with
/// its relevance score clamped to `[0, 1]`.
#[derive(Debug, Clone, Serialize)]
pub struct ContextChunk {
    pub text: String,
    pub relevance_score: f32,
}

/// Answer payload returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerPayload {
    pub answer: String,
    pub model: String,
    pub context_chunks_used: usize,
    pub context: Vec<ContextChunk>,
    pub usage: TokenUsage,
}

/// Generated answer plus the raw retrieval trace behind it.
#[derive(Debug, Clone)]
pub struct AskOutcome {
    pub answer: AnswerPayload,
    pub retrieved: Vec<Retrieved>,
}

/// Convert a cosine distance to a relevance score in `[0, 1]`.
///
/// Cosine distance ranges over `[0, 2]`, so the raw `1 - distance` can
/// go negative; it is clamped on both ends rather than surfaced raw.
pub fn relevance_score(distance: f32) -> f32 {
    (1.0 - distance).clamp(0.0, 1.0)
}

/// The retrieval-augmented answering pipeline.
pub struct QaPipeline {
    settings: Settings,
    embedder: Box<dyn Embedder>,
    index: VectorIndex,
    generator: Box<dyn AnswerGenerator>,
}

impl QaPipeline {
    pub fn new(
        settings: Settings,
        embedder: Box<dyn Embedder>,
        index: VectorIndex,
        generator: Box<dyn AnswerGenerator>,
    ) -> Self {
        Self {
            settings,
            embedder,
            index,
            generator,
        }
    }

    /// Number of entries currently held by the index.
    pub fn indexed_count(&self) -> usize {
        self.index.count()
    }

    /// Replace the index contents with chunks of `raw_text`.
    ///
    /// Fails fast on the first failing step. The index is only touched
    /// after every embedding has succeeded: a mid-batch embedding failure
    /// commits nothing and leaves the previous contents intact. `add` is
    /// called exactly once per run, so re-indexing never accumulates
    /// chunks from earlier documents.
    pub fn index_document(&mut self, raw_text: &str) -> Result<IndexSummary, PipelineError> {
        let text = chunker::clean_text(raw_text);
        let chunks = chunker::chunk(&text, self.settings.chunk_size, self.settings.chunk_overlap)?;

        if chunks.is_empty() {
            warn!("Document produced no chunks");
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts)?;

        let entries: Vec<EmbeddedChunk> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| {
                let metadata = json!({ "sequence_index": chunk.sequence_index });
                EmbeddedChunk {
                    chunk,
                    vector,
                    metadata,
                }
            })
            .collect();

        let chunks_created = entries.len();
        self.index.clear()?;
        self.index.add(entries)?;

        info!(chunks_created, "Document indexed");
        Ok(IndexSummary {
            chunks_created,
            documents_indexed: self.index.count(),
        })
    }

    /// Answer a question from the indexed document.
    ///
    /// Embeds the question, retrieves up to `top_k` chunks (all of them
    /// when fewer are stored), and forwards the chunk texts to the
    /// generator in ascending-distance order. Propagates the store's
    /// empty-index error when nothing has been indexed yet.
    pub async fn answer_question(
        &self,
        question: &str,
        top_k: Option<usize>,
    ) -> Result<AskOutcome, PipelineError> {
        let top_k = top_k.unwrap_or(self.settings.top_k);
        info!(top_k, "Answering question");

        let query_vector = self.embedder.embed(question)?;
        let retrieved = self.index.query(&query_vector, top_k)?;

        let context_texts: Vec<String> =
            retrieved.iter().map(|r| r.chunk_text.clone()).collect();

        let options = GenerationOptions {
            model: self.settings.model.clone(),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };
        let answer = self
            .generator
            .generate(question, &context_texts, &options)
            .await?;

        let context: Vec<ContextChunk> = retrieved
            .iter()
            .map(|r| ContextChunk {
                text: preview(&r.chunk_text),
                relevance_score: relevance_score(r.distance),
            })
            .collect();

        Ok(AskOutcome {
            answer: AnswerPayload {
                answer: answer.text,
                model: answer.model,
                context_chunks_used: retrieved.len(),
                context,
                usage: answer.usage,
            },
            retrieved,
        })
    }
}

/// Truncate context text for the response payload.
fn preview(text: &str) -> String {
    let truncated: String = text.chars().take(CONTEXT_PREVIEW_CHARS).collect();
    format!("{}...", truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{Embedding, HashEmbedder};
    use crate::generator::Answer;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// Call recorder shared between a test and its mock generator.
    type CallLog = Arc<Mutex<Vec<Vec<String>>>>;

    /// Canned generator that records the context it was handed.
    struct MockGenerator {
        response: String,
        calls: CallLog,
    }

    impl MockGenerator {
        fn new(response: &str) -> Self {
            Self {
                response: response.to_string(),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn call_log(&self) -> CallLog {
            Arc::clone(&self.calls)
        }
    }

    #[async_trait]
    impl AnswerGenerator for MockGenerator {
        async fn generate(
            &self,
            _question: &str,
            context_chunks: &[String],
            options: &GenerationOptions,
        ) -> Result<Answer, GeneratorError> {
            self.calls.lock().unwrap().push(context_chunks.to_vec());
            Ok(Answer {
                text: self.response.clone(),
                model: options.model.clone(),
                usage: TokenUsage {
                    input_tokens: 10,
                    output_tokens: 5,
                },
            })
        }
    }

    /// Embedder that fails partway through a batch.
    struct FlakyEmbedder {
        inner: HashEmbedder,
        fail_on: String,
    }

    impl Embedder for FlakyEmbedder {
        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
            if text.contains(&self.fail_on) {
                return Err(EmbeddingError::Unavailable("model offline".to_string()));
            }
            self.inner.embed(text)
        }
    }

    fn small_settings() -> Settings {
        Settings {
            // Windows sized so each sentence below lands in its own chunk
            chunk_size: 30,
            chunk_overlap: 0,
            ..Settings::default()
        }
    }

    fn pipeline_with(settings: Settings) -> QaPipeline {
        QaPipeline::new(
            settings,
            Box::new(HashEmbedder::default()),
            VectorIndex::in_memory(crate::embedding::EMBEDDING_DIM),
            Box::new(MockGenerator::new("the answer")),
        )
    }

    // Three 30-char "sentences" with disjoint vocabulary, so retrieval
    // by shared words is unambiguous.
    const DOC: &str = "apple orchard cider harvest aa bridge tunnel railway station viola cello quartet concerto";

    #[test]
    fn test_index_document_counts_chunks() {
        let mut pipeline = pipeline_with(small_settings());
        let summary = pipeline.index_document(DOC).unwrap();
        assert_eq!(summary.chunks_created, 3);
        assert_eq!(summary.documents_indexed, 3);
        assert_eq!(pipeline.indexed_count(), 3);
    }

    #[test]
    fn test_reindex_replaces_not_accumulates() {
        let mut pipeline = pipeline_with(small_settings());
        pipeline.index_document(DOC).unwrap();
        let summary = pipeline.index_document("just one tiny doc").unwrap();
        assert_eq!(summary.chunks_created, 1);
        assert_eq!(pipeline.indexed_count(), 1);
    }

    #[test]
    fn test_embed_failure_commits_nothing() {
        let mut pipeline = QaPipeline::new(
            small_settings(),
            Box::new(FlakyEmbedder {
                inner: HashEmbedder::default(),
                fail_on: "viola".to_string(),
            }),
            VectorIndex::in_memory(crate::embedding::EMBEDDING_DIM),
            Box::new(MockGenerator::new("unused")),
        );

        // First index succeeds (no failing word)
        pipeline.index_document("bridge tunnel railway station").unwrap();
        assert_eq!(pipeline.indexed_count(), 1);

        // Second run fails on the last chunk's embedding; the previous
        // index must be left intact
        let err = pipeline.index_document(DOC).unwrap_err();
        assert!(matches!(err, PipelineError::Embedding(_)));
        assert_eq!(pipeline.indexed_count(), 1);
    }

    #[tokio::test]
    async fn test_ask_before_index_fails_empty() {
        let pipeline = pipeline_with(small_settings());
        let err = pipeline.answer_question("anything?", None).await.unwrap_err();
        assert!(matches!(err, PipelineError::Store(StoreError::Empty)));
    }

    #[tokio::test]
    async fn test_ask_ranks_matching_chunk_first() {
        let mut pipeline = pipeline_with(small_settings());
        pipeline.index_document(DOC).unwrap();

        let outcome = pipeline
            .answer_question("what about the bridge tunnel railway?", Some(3))
            .await
            .unwrap();

        // Chunk "B" (bridge/tunnel/railway) must rank first
        assert!(outcome.retrieved[0].chunk_text.contains("bridge"));
        assert!(outcome.answer.context[0].text.contains("bridge"));
        assert_eq!(outcome.answer.context_chunks_used, 3);
        assert_eq!(outcome.answer.answer, "the answer");
    }

    #[tokio::test]
    async fn test_ask_passes_exactly_top_k_chunks_to_generator() {
        let generator = MockGenerator::new("ok");
        let calls = generator.call_log();
        let mut pipeline = QaPipeline::new(
            small_settings(),
            Box::new(HashEmbedder::default()),
            VectorIndex::in_memory(crate::embedding::EMBEDDING_DIM),
            Box::new(generator),
        );
        pipeline.index_document(DOC).unwrap();

        let outcome = pipeline
            .answer_question("apple cider?", Some(2))
            .await
            .unwrap();
        assert_eq!(outcome.answer.context_chunks_used, 2);
        assert_eq!(outcome.retrieved.len(), 2);

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 2, "generator must see exactly top_k chunks");
        assert!(calls[0][0].contains("apple"));
    }

    #[tokio::test]
    async fn test_top_k_beyond_count_returns_all() {
        let mut pipeline = pipeline_with(small_settings());
        pipeline.index_document(DOC).unwrap();

        let outcome = pipeline
            .answer_question("cello concerto?", Some(10))
            .await
            .unwrap();
        assert_eq!(outcome.retrieved.len(), 3);
        assert_eq!(outcome.answer.context_chunks_used, 3);
    }

    #[tokio::test]
    async fn test_relevance_scores_within_bounds() {
        let mut pipeline = pipeline_with(small_settings());
        pipeline.index_document(DOC).unwrap();

        let outcome = pipeline
            .answer_question("words sharing nothing whatsoever xyzzy", Some(3))
            .await
            .unwrap();
        for chunk in &outcome.answer.context {
            assert!(chunk.relevance_score >= 0.0);
            assert!(chunk.relevance_score <= 1.0);
        }
    }

    #[test]
    fn test_relevance_score_clamps_both_ends() {
        assert_eq!(relevance_score(2.0), 0.0);
        assert_eq!(relevance_score(1.5), 0.0);
        assert_eq!(relevance_score(-0.5), 1.0);
        assert!((relevance_score(0.25) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_preview_truncates_long_text() {
        let long = "x".repeat(500);
        let p = preview(&long);
        assert_eq!(p.chars().count(), CONTEXT_PREVIEW_CHARS + 3);
        assert!(p.ends_with("..."));
    }
}
