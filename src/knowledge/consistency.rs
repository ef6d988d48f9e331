//! Consistency Reporter - 행/인덱스 정합성 전수 감사
//!
//! 문서 행의 `pinecone_indexed` 플래그와 임베딩 유무를
//! 벡터 인덱스 실제 멤버십과 교차 확인해 상태를 분류합니다.
//! 아무것도 변경하지 않는 읽기 전용 연산이며, 중간에 쓰기가
//! 없다면 두 번 실행해도 같은 결과가 나옵니다.

use std::sync::Arc;

use serde::Serialize;

use crate::error::Result;

use super::store::DocumentStore;
use super::vector::VectorIndex;

// ============================================================================
// Types
// ============================================================================

/// 문서 한 건의 정합성 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConsistencyState {
    /// 플래그가 서 있고 인덱스에도 벡터가 존재
    Indexed,
    /// 임베딩은 있는데 플래그가 내려가 있음 - 플래그만 올리면 되는 값싼 복구 후보
    EmbeddingPresentButNotFlagged,
    /// 임베딩도 플래그도 없음 - 전체 재인덱싱 후보
    MissingEmbedding,
    /// 플래그는 서 있는데 인덱스에 벡터가 없음 - 드리프트 경고 (자동 복구 안 함)
    FlaggedButAbsent,
}

/// 정합성 레코드 (문서당 하나, 리포트마다 재계산)
#[derive(Debug, Clone, Serialize)]
pub struct ConsistencyRecord {
    pub doc_id: String,
    pub title: String,
    pub state: ConsistencyState,
}

// ============================================================================
// ConsistencyReporter
// ============================================================================

/// 정합성 리포터
///
/// 플래그가 선 행만 인덱스에 프로브합니다. 프로브가 실패하면
/// 상태를 추측하지 않고 에러를 그대로 올립니다 - 관측하지 못한
/// 드리프트를 오분류하는 것보다 낫습니다.
pub struct ConsistencyReporter {
    store: Arc<DocumentStore>,
    index: Arc<dyn VectorIndex>,
}

impl ConsistencyReporter {
    /// 새 리포터 생성
    pub fn new(store: Arc<DocumentStore>, index: Arc<dyn VectorIndex>) -> Self {
        Self { store, index }
    }

    /// 전체 문서 정합성 리포트 생성
    pub async fn generate_report(&self) -> Result<Vec<ConsistencyRecord>> {
        let docs = self.store.all_documents()?;
        let mut records = Vec::with_capacity(docs.len());

        for doc in docs {
            let state = if doc.pinecone_indexed {
                if self.index.contains(&doc.id).await? {
                    ConsistencyState::Indexed
                } else {
                    tracing::warn!(
                        "Document {} is flagged as indexed but absent from the vector index",
                        doc.id
                    );
                    ConsistencyState::FlaggedButAbsent
                }
            } else if doc.embedding.is_some() {
                ConsistencyState::EmbeddingPresentButNotFlagged
            } else {
                ConsistencyState::MissingEmbedding
            };

            records.push(ConsistencyRecord {
                doc_id: doc.id,
                title: doc.title,
                state,
            });
        }

        tracing::info!("Consistency report: {} documents audited", records.len());
        Ok(records)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RagError;
    use crate::knowledge::store::NewDocument;
    use crate::knowledge::vector::{
        MemoryVectorIndex, QueryMatch, RecordKind, VectorMetadata, VectorRecord,
    };
    use async_trait::async_trait;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, Arc<DocumentStore>) {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::open(&dir.path().join("test.db")).unwrap();
        (dir, Arc::new(store))
    }

    fn add_doc(store: &DocumentStore, title: &str) -> String {
        store
            .add_document(NewDocument {
                title: title.to_string(),
                doc_type: None,
                content: "내용".to_string(),
            })
            .unwrap()
    }

    async fn put_vector(index: &MemoryVectorIndex, id: &str) {
        index
            .upsert(VectorRecord {
                id: id.to_string(),
                embedding: vec![0.1, 0.2],
                metadata: VectorMetadata {
                    kind: RecordKind::Document,
                    title: "t".to_string(),
                    doc_type: None,
                    excerpt: "e".to_string(),
                },
            })
            .await
            .unwrap();
    }

    /// 프로브가 항상 실패하는 인덱스
    struct FailingProbeIndex;

    #[async_trait]
    impl VectorIndex for FailingProbeIndex {
        async fn upsert(&self, _record: VectorRecord) -> crate::error::Result<()> {
            Ok(())
        }

        async fn query(
            &self,
            _embedding: &[f32],
            _top_k: usize,
            _kind: Option<RecordKind>,
        ) -> crate::error::Result<Vec<QueryMatch>> {
            Ok(vec![])
        }

        async fn contains(&self, _id: &str) -> crate::error::Result<bool> {
            Err(RagError::ProviderUnavailable {
                provider: "pinecone",
                message: "probe down".to_string(),
            })
        }

        async fn count(&self) -> crate::error::Result<usize> {
            Ok(0)
        }

        async fn test_connection(&self) -> crate::error::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_all_four_states_are_classified() {
        let (_dir, store) = test_store();
        let index = Arc::new(MemoryVectorIndex::new());

        // Indexed: 플래그 + 인덱스 벡터
        let indexed = add_doc(&store, "indexed");
        store.mark_indexed(&indexed, &[0.1]).unwrap();
        put_vector(&index, &indexed).await;

        // FlaggedButAbsent: 플래그만
        let drifted = add_doc(&store, "drifted");
        store.set_indexed_flag(&drifted, true).unwrap();

        // EmbeddingPresentButNotFlagged: 임베딩 기록 후 플래그 내림
        let unflagged = add_doc(&store, "unflagged");
        store.mark_indexed(&unflagged, &[0.2]).unwrap();
        store.set_indexed_flag(&unflagged, false).unwrap();

        // MissingEmbedding: 아무것도 없음
        let missing = add_doc(&store, "missing");

        let reporter = ConsistencyReporter::new(store, index);
        let report = reporter.generate_report().await.unwrap();

        let state_of = |id: &str| {
            report
                .iter()
                .find(|r| r.doc_id == id)
                .map(|r| r.state)
                .unwrap()
        };

        assert_eq!(state_of(&indexed), ConsistencyState::Indexed);
        assert_eq!(state_of(&drifted), ConsistencyState::FlaggedButAbsent);
        assert_eq!(
            state_of(&unflagged),
            ConsistencyState::EmbeddingPresentButNotFlagged
        );
        assert_eq!(state_of(&missing), ConsistencyState::MissingEmbedding);
    }

    #[tokio::test]
    async fn test_report_is_idempotent() {
        let (_dir, store) = test_store();
        let index = Arc::new(MemoryVectorIndex::new());

        let a = add_doc(&store, "a");
        store.mark_indexed(&a, &[0.1]).unwrap();
        put_vector(&index, &a).await;
        add_doc(&store, "b");

        let reporter = ConsistencyReporter::new(store, index);

        let first = reporter.generate_report().await.unwrap();
        let second = reporter.generate_report().await.unwrap();

        assert_eq!(first.len(), second.len());
        for (x, y) in first.iter().zip(second.iter()) {
            assert_eq!(x.doc_id, y.doc_id);
            assert_eq!(x.state, y.state);
        }
    }

    #[tokio::test]
    async fn test_unflagged_rows_are_not_probed() {
        let (_dir, store) = test_store();

        // 플래그가 선 행이 없으면 프로브가 실패해도 리포트는 성공해야 함
        add_doc(&store, "missing");

        let reporter = ConsistencyReporter::new(store, Arc::new(FailingProbeIndex));
        let report = reporter.generate_report().await.unwrap();
        assert_eq!(report[0].state, ConsistencyState::MissingEmbedding);
    }

    #[tokio::test]
    async fn test_probe_failure_aborts_report() {
        let (_dir, store) = test_store();

        let id = add_doc(&store, "flagged");
        store.set_indexed_flag(&id, true).unwrap();

        let reporter = ConsistencyReporter::new(store, Arc::new(FailingProbeIndex));
        let result = reporter.generate_report().await;
        assert!(matches!(
            result,
            Err(RagError::ProviderUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_store_yields_empty_report() {
        let (_dir, store) = test_store();
        let reporter = ConsistencyReporter::new(store, Arc::new(MemoryVectorIndex::new()));
        let report = reporter.generate_report().await.unwrap();
        assert!(report.is_empty());
    }
}
