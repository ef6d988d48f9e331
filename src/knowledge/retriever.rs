//! Multi-Source Retriever - 지식베이스 + 문서 동시 검색
//!
//! 질문 임베딩 한 번으로 지식베이스 벡터 검색과 문서 시맨틱 검색을
//! 동시에 수행합니다. 두 소스는 독립적이므로 순차가 아닌 동시 실행이며,
//! 한쪽이 실패해도 다른 쪽이 성공하면 결과를 반환합니다 (우아한 저하).
//! 양쪽 모두 실패했을 때만 `RetrievalFailed`로 실패합니다.

use std::sync::Arc;

use serde::Serialize;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

use super::store::DocumentStore;
use super::vector::{validate_top_k, QueryMatch, RecordKind, VectorIndex};

// ============================================================================
// Types
// ============================================================================

/// 검색 히트 (질의 동안만 존재하는 일시적 값)
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalHit {
    /// 출처 종류
    pub kind: RecordKind,
    /// 문서 제목 또는 지식 항목의 질문
    pub label: String,
    /// 본문 (문서: 전체 콘텐츠, 지식 항목: 답변)
    ///
    /// 절단은 컨텍스트 조립 단계의 책임입니다.
    pub excerpt: String,
    /// 유사도 스코어 (인덱스가 반환하지 않으면 None)
    pub score: Option<f32>,
}

/// 소스별 검색 결과
///
/// 한쪽 소스가 실패하면 해당 리스트가 비어 있습니다. 호출자는
/// 빈 리스트로 부분 저하를 구분할 수 있습니다.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Retrieval {
    pub knowledge_hits: Vec<RetrievalHit>,
    pub document_hits: Vec<RetrievalHit>,
}

// ============================================================================
// MultiSourceRetriever
// ============================================================================

/// 멀티소스 검색기
pub struct MultiSourceRetriever {
    store: Arc<DocumentStore>,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl MultiSourceRetriever {
    /// 새 검색기 생성
    pub fn new(
        store: Arc<DocumentStore>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            store,
            index,
            embedder,
        }
    }

    /// 두 소스를 동시에 검색
    ///
    /// # Arguments
    /// * `query` - 검색 질문
    /// * `top_k` - 소스당 최대 히트 수
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Retrieval> {
        if query.trim().is_empty() {
            return Err(RagError::InvalidInput(
                "Query must not be empty".to_string(),
            ));
        }
        validate_top_k(top_k)?;

        // 질문 임베딩은 한 번만 계산해 양쪽 질의가 공유
        let query_embedding = match self.embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                // 임베딩이 없으면 어느 소스도 질의할 수 없음 - 전체 실패
                let message = format!("Query embedding failed: {}", e);
                return Err(RagError::RetrievalFailed {
                    knowledge: Box::new(RagError::ProviderUnavailable {
                        provider: "gemini",
                        message: message.clone(),
                    }),
                    document: Box::new(RagError::ProviderUnavailable {
                        provider: "gemini",
                        message,
                    }),
                });
            }
        };

        let (knowledge, documents) = tokio::join!(
            self.search_knowledge(&query_embedding, top_k),
            self.search_documents(&query_embedding, top_k),
        );

        match (knowledge, documents) {
            (Ok(knowledge_hits), Ok(document_hits)) => Ok(Retrieval {
                knowledge_hits,
                document_hits,
            }),
            (Ok(knowledge_hits), Err(e)) => {
                tracing::warn!("Document search failed, degrading: {}", e);
                Ok(Retrieval {
                    knowledge_hits,
                    document_hits: Vec::new(),
                })
            }
            (Err(e), Ok(document_hits)) => {
                tracing::warn!("Knowledge-base search failed, degrading: {}", e);
                Ok(Retrieval {
                    knowledge_hits: Vec::new(),
                    document_hits,
                })
            }
            (Err(knowledge_err), Err(document_err)) => Err(RagError::RetrievalFailed {
                knowledge: Box::new(knowledge_err),
                document: Box::new(document_err),
            }),
        }
    }

    /// 지식베이스 소스 검색
    async fn search_knowledge(
        &self,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievalHit>> {
        let matches = self
            .index
            .query(query_embedding, top_k, Some(RecordKind::Knowledge))
            .await?;

        let mut hits = Vec::with_capacity(matches.len());
        for m in matches {
            match self.store.get_knowledge_entry(&m.id)? {
                Some(entry) => hits.push(RetrievalHit {
                    kind: RecordKind::Knowledge,
                    label: entry.question,
                    excerpt: entry.answer,
                    score: Some(m.score),
                }),
                None => push_metadata_fallback(&mut hits, m, RecordKind::Knowledge),
            }
        }

        Ok(hits)
    }

    /// 문서 소스 검색
    async fn search_documents(
        &self,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievalHit>> {
        let matches = self
            .index
            .query(query_embedding, top_k, Some(RecordKind::Document))
            .await?;

        let mut hits = Vec::with_capacity(matches.len());
        for m in matches {
            match self.store.get_document(&m.id)? {
                // 전체 콘텐츠를 싣고 절단은 컨텍스트 조립에 맡김
                Some(doc) => hits.push(RetrievalHit {
                    kind: RecordKind::Document,
                    label: doc.title,
                    excerpt: doc.content,
                    score: Some(m.score),
                }),
                None => push_metadata_fallback(&mut hits, m, RecordKind::Document),
            }
        }

        Ok(hits)
    }
}

/// 행이 사라진 매치의 메타데이터 폴백
///
/// 삭제는 파이프라인이 추적하지 않는 외부 액션이므로, 인덱스에만
/// 남은 벡터는 메타데이터 발췌로 대체하고 그것도 없으면 건너뜁니다.
fn push_metadata_fallback(hits: &mut Vec<RetrievalHit>, m: QueryMatch, kind: RecordKind) {
    match m.metadata {
        Some(meta) => hits.push(RetrievalHit {
            kind,
            label: meta.title,
            excerpt: meta.excerpt,
            score: Some(m.score),
        }),
        None => {
            tracing::warn!("Dropping match {} with no row and no metadata", m.id);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbedding;
    use crate::knowledge::store::NewDocument;
    use crate::knowledge::vector::{MemoryVectorIndex, VectorMetadata, VectorRecord};
    use async_trait::async_trait;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, Arc<DocumentStore>) {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::open(&dir.path().join("test.db")).unwrap();
        (dir, Arc::new(store))
    }

    /// 스토어/인덱스에 지식 항목 + 문서를 한 건씩 심는다
    async fn seed(
        store: &DocumentStore,
        index: &MemoryVectorIndex,
        embedder: &MockEmbedding,
    ) -> (String, String) {
        let kb_id = store
            .add_knowledge_entry("복리란 무엇인가요?", "이자에 이자가 붙는 구조입니다.")
            .unwrap();
        index
            .upsert(VectorRecord {
                id: kb_id.clone(),
                embedding: embedder.embed("복리란 무엇인가요?").await.unwrap(),
                metadata: VectorMetadata {
                    kind: RecordKind::Knowledge,
                    title: "복리란 무엇인가요?".to_string(),
                    doc_type: None,
                    excerpt: "이자에 이자가 붙는 구조입니다.".to_string(),
                },
            })
            .await
            .unwrap();

        let doc_id = store
            .add_document(NewDocument {
                title: "예금 가이드".to_string(),
                doc_type: None,
                content: "예금과 복리에 대한 안내 문서입니다.".to_string(),
            })
            .unwrap();
        index
            .upsert(VectorRecord {
                id: doc_id.clone(),
                embedding: embedder.embed("예금과 복리에 대한 안내").await.unwrap(),
                metadata: VectorMetadata {
                    kind: RecordKind::Document,
                    title: "예금 가이드".to_string(),
                    doc_type: None,
                    excerpt: "예금과 복리".to_string(),
                },
            })
            .await
            .unwrap();

        (kb_id, doc_id)
    }

    /// 특정 소스 종류만 실패하는 인덱스
    struct PartiallyFailingIndex {
        inner: MemoryVectorIndex,
        fail_kind: RecordKind,
    }

    #[async_trait]
    impl VectorIndex for PartiallyFailingIndex {
        async fn upsert(&self, record: VectorRecord) -> crate::error::Result<()> {
            self.inner.upsert(record).await
        }

        async fn query(
            &self,
            embedding: &[f32],
            top_k: usize,
            kind: Option<RecordKind>,
        ) -> crate::error::Result<Vec<QueryMatch>> {
            if kind == Some(self.fail_kind) {
                return Err(RagError::ProviderUnavailable {
                    provider: "pinecone",
                    message: "source down".to_string(),
                });
            }
            self.inner.query(embedding, top_k, kind).await
        }

        async fn contains(&self, id: &str) -> crate::error::Result<bool> {
            self.inner.contains(id).await
        }

        async fn count(&self) -> crate::error::Result<usize> {
            self.inner.count().await
        }

        async fn test_connection(&self) -> crate::error::Result<()> {
            Ok(())
        }
    }

    /// 모든 질의가 실패하는 인덱스
    struct DownIndex;

    #[async_trait]
    impl VectorIndex for DownIndex {
        async fn upsert(&self, _record: VectorRecord) -> crate::error::Result<()> {
            Ok(())
        }

        async fn query(
            &self,
            _embedding: &[f32],
            _top_k: usize,
            _kind: Option<RecordKind>,
        ) -> crate::error::Result<Vec<QueryMatch>> {
            Err(RagError::ProviderUnavailable {
                provider: "pinecone",
                message: "index down".to_string(),
            })
        }

        async fn contains(&self, _id: &str) -> crate::error::Result<bool> {
            Ok(false)
        }

        async fn count(&self) -> crate::error::Result<usize> {
            Ok(0)
        }

        async fn test_connection(&self) -> crate::error::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_both_sources_return_hits() {
        let (_dir, store) = test_store();
        let index = Arc::new(MemoryVectorIndex::new());
        let embedder = Arc::new(MockEmbedding::new(16));

        seed(&store, &index, &embedder).await;

        let retriever = MultiSourceRetriever::new(store, index, embedder);
        let result = retriever.retrieve("복리", 5).await.unwrap();

        assert_eq!(result.knowledge_hits.len(), 1);
        assert_eq!(result.document_hits.len(), 1);

        let kb = &result.knowledge_hits[0];
        assert_eq!(kb.kind, RecordKind::Knowledge);
        assert_eq!(kb.label, "복리란 무엇인가요?");
        assert_eq!(kb.excerpt, "이자에 이자가 붙는 구조입니다.");
        assert!(kb.score.is_some());

        let doc = &result.document_hits[0];
        assert_eq!(doc.kind, RecordKind::Document);
        assert_eq!(doc.label, "예금 가이드");
        // 문서 히트는 전체 콘텐츠를 싣는다 (절단은 조립 단계)
        assert_eq!(doc.excerpt, "예금과 복리에 대한 안내 문서입니다.");
    }

    #[tokio::test]
    async fn test_one_source_failure_degrades_gracefully() {
        let (_dir, store) = test_store();
        let embedder = Arc::new(MockEmbedding::new(16));

        let inner = MemoryVectorIndex::new();
        seed(&store, &inner, &embedder).await;

        let index = Arc::new(PartiallyFailingIndex {
            inner,
            fail_kind: RecordKind::Knowledge,
        });

        let retriever = MultiSourceRetriever::new(store, index, embedder);
        let result = retriever.retrieve("복리", 5).await.unwrap();

        // 실패한 소스는 빈 리스트로 구분 가능
        assert!(result.knowledge_hits.is_empty());
        assert_eq!(result.document_hits.len(), 1);
    }

    #[tokio::test]
    async fn test_both_sources_failing_is_retrieval_failed() {
        let (_dir, store) = test_store();
        let embedder = Arc::new(MockEmbedding::new(16));

        let retriever = MultiSourceRetriever::new(store, Arc::new(DownIndex), embedder);
        let result = retriever.retrieve("복리", 5).await;

        match result {
            Err(RagError::RetrievalFailed { knowledge, document }) => {
                assert!(knowledge.to_string().contains("index down"));
                assert!(document.to_string().contains("index down"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_query_embedding_failure_is_retrieval_failed() {
        let (_dir, store) = test_store();

        let retriever = MultiSourceRetriever::new(
            store,
            Arc::new(MemoryVectorIndex::new()),
            Arc::new(MockEmbedding::failing(16)),
        );

        let result = retriever.retrieve("복리", 5).await;
        assert!(matches!(result, Err(RagError::RetrievalFailed { .. })));
    }

    #[tokio::test]
    async fn test_empty_query_is_invalid_input() {
        let (_dir, store) = test_store();
        let retriever = MultiSourceRetriever::new(
            store,
            Arc::new(MemoryVectorIndex::new()),
            Arc::new(MockEmbedding::new(16)),
        );

        let result = retriever.retrieve("  ", 5).await;
        assert!(matches!(result, Err(RagError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_zero_hits_is_not_an_error() {
        let (_dir, store) = test_store();
        let retriever = MultiSourceRetriever::new(
            store,
            Arc::new(MemoryVectorIndex::new()),
            Arc::new(MockEmbedding::new(16)),
        );

        let result = retriever.retrieve("아무것도 없는 질문", 5).await.unwrap();
        assert!(result.knowledge_hits.is_empty());
        assert!(result.document_hits.is_empty());
    }

    #[tokio::test]
    async fn test_deleted_row_falls_back_to_metadata() {
        let (_dir, store) = test_store();
        let index = Arc::new(MemoryVectorIndex::new());
        let embedder = Arc::new(MockEmbedding::new(16));

        let (_kb_id, doc_id) = seed(&store, &index, &embedder).await;

        // 행 삭제는 외부 액션 - 인덱스에는 벡터가 남는다
        store.delete_document(&doc_id).unwrap();

        let retriever = MultiSourceRetriever::new(store, index, embedder);
        let result = retriever.retrieve("복리", 5).await.unwrap();

        assert_eq!(result.document_hits.len(), 1);
        // 메타데이터 발췌로 대체됨
        assert_eq!(result.document_hits[0].excerpt, "예금과 복리");
    }
}
