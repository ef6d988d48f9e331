//! Advisor Engine - 파이프라인 파사드
//!
//! 스토어 + 벡터 인덱스 + 임베딩 + 컴플리션을 묶어
//! 관리/챗 표면이 쓰는 경계 연산 세 가지를 제공합니다.
//!
//! - `index_document` - 관리자 인덱싱 액션
//! - `generate_consistency_report` - 관리자 리포트 뷰
//! - `answer_question` - 챗/검색 UI
//!
//! 질의 간 공유 가변 상태는 없습니다. 문서가 다르면 인덱싱을
//! 동시에 돌려도 각자 자기 행과 자기 인덱스 키만 만집니다.

use std::sync::Arc;

use crate::completion::{CompletionProvider, GeminiCompletion};
use crate::embedding::{EmbeddingProvider, GeminiEmbedding};
use crate::error::Result;

use super::answer::{Answer, AnswerSynthesizer};
use super::consistency::{ConsistencyRecord, ConsistencyReporter, ConsistencyState};
use super::context::assemble;
use super::indexer::{IndexingCoordinator, IndexingOutcome, IndexingPolicy};
use super::pinecone::PineconeIndex;
use super::retriever::MultiSourceRetriever;
use super::store::{DocumentStore, NewDocument, StoreStats};
use super::vector::{RecordKind, VectorIndex, VectorMetadata, VectorRecord};

// ============================================================================
// Types
// ============================================================================

/// 백필 실행 결과
#[derive(Debug, Clone, Default)]
pub struct BackfillOutcome {
    /// 전체 재인덱싱된 문서 수 (MissingEmbedding)
    pub reindexed: usize,
    /// 플래그 복구된 문서 수 (EmbeddingPresentButNotFlagged)
    pub flag_repaired: usize,
    /// 드리프트 경고 수 (FlaggedButAbsent - 자동 복구 안 함)
    pub drift_warnings: usize,
    /// 재인덱싱 실패 수 (개별 실패는 배치를 중단하지 않음)
    pub failures: usize,
}

/// 엔진 통계
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub store: StoreStats,
    pub vector_count: usize,
}

// ============================================================================
// AdvisorEngine
// ============================================================================

/// 파이프라인 파사드
pub struct AdvisorEngine {
    store: Arc<DocumentStore>,
    index: Arc<dyn VectorIndex>,
    coordinator: IndexingCoordinator,
    reporter: ConsistencyReporter,
    retriever: MultiSourceRetriever,
    synthesizer: AnswerSynthesizer,
}

impl AdvisorEngine {
    /// 환경변수 구성으로 생성
    ///
    /// 기본 데이터 디렉토리(~/.advisor-rag/)와 Gemini/Pinecone
    /// 프로바이더를 사용합니다.
    pub fn from_env() -> Result<Self> {
        let store = Arc::new(DocumentStore::open_default()?);
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(GeminiEmbedding::from_env()?);
        let completion: Arc<dyn CompletionProvider> = Arc::new(GeminiCompletion::from_env()?);
        let index: Arc<dyn VectorIndex> = Arc::new(PineconeIndex::from_env()?);

        Ok(Self::with_components(store, index, embedder, completion))
    }

    /// 컴포넌트를 직접 주입하여 생성 (테스트/오프라인용)
    pub fn with_components(
        store: Arc<DocumentStore>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        completion: Arc<dyn CompletionProvider>,
    ) -> Self {
        let coordinator =
            IndexingCoordinator::new(store.clone(), embedder.clone(), index.clone());
        let reporter = ConsistencyReporter::new(store.clone(), index.clone());
        let retriever = MultiSourceRetriever::new(store.clone(), index.clone(), embedder);
        let synthesizer = AnswerSynthesizer::new(completion);

        Self {
            store,
            index,
            coordinator,
            reporter,
            retriever,
            synthesizer,
        }
    }

    // ------------------------------------------------------------------
    // Boundary Operations
    // ------------------------------------------------------------------

    /// 문서 한 건 인덱싱 (관리자 액션)
    pub async fn index_document(
        &self,
        doc_id: &str,
        policy: &IndexingPolicy,
    ) -> Result<IndexingOutcome> {
        self.coordinator.index_document(doc_id, policy).await
    }

    /// 전체 정합성 리포트 생성 (관리자 리포트 뷰)
    pub async fn generate_consistency_report(&self) -> Result<Vec<ConsistencyRecord>> {
        self.reporter.generate_report().await
    }

    /// 질문에 답변 (챗/검색 UI)
    ///
    /// 검색 -> 조립 -> 합성. 한쪽 검색 소스 실패는 우아하게
    /// 저하되고, 히트가 전혀 없어도 일반 지식으로 답합니다.
    pub async fn answer_question(&self, query: &str, top_k: usize) -> Result<Answer> {
        let retrieval = self.retriever.retrieve(query, top_k).await?;
        let context = assemble(&retrieval.knowledge_hits, &retrieval.document_hits);
        self.synthesizer.synthesize(query, &context).await
    }

    // ------------------------------------------------------------------
    // Supplementary Operations
    // ------------------------------------------------------------------

    /// 문서 등록 + 선택적 즉시 인덱싱 (업로드 표면)
    pub async fn ingest_document(
        &self,
        doc: NewDocument,
        index_now: bool,
    ) -> Result<(String, Option<IndexingOutcome>)> {
        let id = self.store.add_document(doc)?;

        let outcome = if index_now {
            Some(
                self.coordinator
                    .index_document(&id, &IndexingPolicy::default())
                    .await?,
            )
        } else {
            None
        };

        Ok((id, outcome))
    }

    /// 정합성 리포트 기반 백필
    ///
    /// - `MissingEmbedding` -> 전체 재인덱싱 (개별 실패는 기록만 하고 계속)
    /// - `EmbeddingPresentButNotFlagged` -> 캐시된 임베딩 재업서트 후 플래그 복구
    ///   (임베딩 프로바이더 호출 없는 값싼 복구)
    /// - `FlaggedButAbsent` -> 경고만 (자동 복구 안 함)
    pub async fn reindex_missing(&self) -> Result<BackfillOutcome> {
        let report = self.reporter.generate_report().await?;
        let mut outcome = BackfillOutcome::default();

        for record in report {
            match record.state {
                ConsistencyState::Indexed => {}
                ConsistencyState::MissingEmbedding => {
                    match self
                        .coordinator
                        .index_document(&record.doc_id, &IndexingPolicy::default())
                        .await
                    {
                        Ok(_) => outcome.reindexed += 1,
                        Err(e) => {
                            tracing::warn!("Backfill failed for {}: {}", record.doc_id, e);
                            outcome.failures += 1;
                        }
                    }
                }
                ConsistencyState::EmbeddingPresentButNotFlagged => {
                    match self.repair_flag(&record.doc_id).await {
                        Ok(()) => outcome.flag_repaired += 1,
                        Err(e) => {
                            tracing::warn!("Flag repair failed for {}: {}", record.doc_id, e);
                            outcome.failures += 1;
                        }
                    }
                }
                ConsistencyState::FlaggedButAbsent => {
                    outcome.drift_warnings += 1;
                }
            }
        }

        tracing::info!(
            "Backfill done: {} reindexed, {} flags repaired, {} failures, {} drift warnings",
            outcome.reindexed,
            outcome.flag_repaired,
            outcome.failures,
            outcome.drift_warnings
        );

        Ok(outcome)
    }

    /// 캐시된 임베딩으로 플래그 복구
    ///
    /// 재임베딩 없이 행의 임베딩을 인덱스에 다시 올리고 플래그를
    /// 세웁니다. 무턱대고 플래그만 올리면 드리프트가 생길 수 있어
    /// 업서트를 먼저 합니다.
    async fn repair_flag(&self, doc_id: &str) -> Result<()> {
        let doc = self.store.get_document(doc_id)?.ok_or_else(|| {
            crate::error::RagError::InvalidInput(format!("Document not found: {}", doc_id))
        })?;

        let embedding = doc.embedding.ok_or_else(|| {
            crate::error::RagError::InvalidInput(format!(
                "Document {} has no cached embedding",
                doc_id
            ))
        })?;

        let excerpt: String = doc.content.chars().take(200).collect();
        self.index
            .upsert(VectorRecord {
                id: doc_id.to_string(),
                embedding,
                metadata: VectorMetadata {
                    kind: RecordKind::Document,
                    title: doc.title,
                    doc_type: doc.doc_type,
                    excerpt,
                },
            })
            .await?;

        self.store.set_indexed_flag(doc_id, true)?;
        Ok(())
    }

    /// 엔진 통계
    pub async fn stats(&self) -> Result<EngineStats> {
        let store = self.store.stats()?;
        let vector_count = self.index.count().await?;
        Ok(EngineStats {
            store,
            vector_count,
        })
    }

    /// 내부 스토어 접근
    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// 내부 벡터 인덱스 접근
    pub fn index(&self) -> &dyn VectorIndex {
        self.index.as_ref()
    }
}

// ============================================================================
// Tests
// ============================================================================
