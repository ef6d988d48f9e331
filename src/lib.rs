//! advisor-rag - 금융 자문 지식 검색 + 답변 합성 파이프라인
//!
//! 큐레이션된 Q&A 지식베이스와 업로드 문서를 Pinecone 벡터 인덱스로
//! 검색하고, Gemini로 출처가 달린 단일 답변을 합성합니다.
//! 문서 인덱싱 라이프사이클과 행/인덱스 정합성 감사를 함께 제공합니다.

pub mod cli;
pub mod completion;
pub mod embedding;
pub mod error;
pub mod knowledge;

// Re-exports
pub use completion::{CompletionProvider, GeminiCompletion, MockCompletion};
pub use embedding::{
    get_api_key, has_api_key, EmbeddingProvider, GeminiEmbedding, MockEmbedding,
    DEFAULT_DIMENSION,
};
pub use error::{RagError, Result};
pub use knowledge::{
    assemble, cosine_similarity, get_data_dir, AdvisorEngine, Answer, AnswerSynthesizer,
    BackfillOutcome, ConsistencyRecord, ConsistencyReporter, ConsistencyState, Document,
    DocumentStore, EngineStats, IndexingCoordinator, IndexingOutcome, IndexingPolicy,
    KnowledgeEntry, MemoryVectorIndex, MultiSourceRetriever, NewDocument, PineconeIndex,
    QueryContext, QueryMatch, RecordKind, Retrieval, RetrievalHit, StoreStats, VectorIndex,
    VectorMetadata, VectorRecord,
};
