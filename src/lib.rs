// Paperqa Library
// Retrieval-augmented Q&A over a single document

pub mod chunker;
pub mod config;
pub mod embedding;
pub mod generator;
pub mod pipeline;
pub mod store;

// Re-export commonly used types for the CLI
pub use chunker::{chunk, clean_text, Chunk, ChunkerError};
pub use config::{ConfigError, Settings, DEFAULT_TOP_K};
pub use embedding::{cosine_similarity, Embedder, EmbeddingError, HashEmbedder, EMBEDDING_DIM};
pub use generator::{
    build_prompt, Answer, AnswerGenerator, ClaudeGenerator, GenerationOptions, GeneratorError,
    TokenUsage,
};
pub use pipeline::{
    relevance_score, AnswerPayload, AskOutcome, ContextChunk, IndexSummary, PipelineError,
    QaPipeline,
};
pub use store::{EmbeddedChunk, Retrieved, StoreError, VectorIndex};
