//! Knowledge 모듈 - 검색/합성 파이프라인과 인덱싱 라이프사이클
//!
//! - Store: 문서 행 + 큐레이션된 Q&A 지식 항목 (SQLite)
//! - Vector/Pinecone: 벡터 인덱스 경계 계약과 호스팅 클라이언트
//! - Indexer: 문서 인덱싱 라이프사이클 (절단/임베딩/업서트/행 갱신)
//! - Consistency: 행과 인덱스 사이의 정합성 전수 감사
//! - Retriever: 지식베이스 + 문서 동시 검색
//! - Context/Answer: 컨텍스트 조립과 답변 합성
//! - Engine: 전체를 묶는 파사드

mod answer;
mod consistency;
mod context;
mod engine;
mod indexer;
mod pinecone;
mod retriever;
mod store;
mod vector;

// Re-exports
pub use answer::{Answer, AnswerSynthesizer};
pub use consistency::{ConsistencyRecord, ConsistencyReporter, ConsistencyState};
pub use context::{assemble, ContextSection, QueryContext, DOCUMENT_EXCERPT_LIMIT};
pub use engine::{AdvisorEngine, BackfillOutcome, EngineStats};
pub use indexer::{
    IndexingCoordinator, IndexingOutcome, IndexingPolicy, AGGRESSIVE_MAX_CONTENT_CHARS,
    DEFAULT_MAX_CONTENT_CHARS,
};
pub use pinecone::PineconeIndex;
pub use retriever::{MultiSourceRetriever, Retrieval, RetrievalHit};
pub use store::{
    get_data_dir, Document, DocumentStore, KnowledgeEntry, NewDocument, StoreStats,
};
pub use vector::{
    cosine_similarity, MemoryVectorIndex, QueryMatch, RecordKind, VectorIndex, VectorMetadata,
    VectorRecord,
};
