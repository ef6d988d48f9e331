//! Indexing Coordinator - 문서 인덱싱 라이프사이클
//!
//! 한 문서의 벡터 표현을 콘텐츠와 일치시키는 책임을 집니다.
//! 절단 -> 임베딩 -> 업서트 -> 행 갱신 순서로 진행하며,
//! 각 단계 실패를 구분 가능한 에러로 보고합니다.
//!
//! 자동 재시도는 없습니다. 실패 시 호출자가 공격적 절단 정책
//! (`IndexingPolicy::aggressive`)으로 한 번 더 시도할 수 있으며,
//! 두 시도는 각각 완결된 독립 연산입니다.

use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

use super::store::DocumentStore;
use super::vector::{RecordKind, VectorIndex, VectorMetadata, VectorRecord};

// ============================================================================
// IndexingPolicy
// ============================================================================

/// 기본 콘텐츠 절단 상한 (문자 수)
///
/// 프로바이더 비용/지연을 제한합니다. 프로바이더 한도보다
/// 충분히 낮게 잡습니다.
pub const DEFAULT_MAX_CONTENT_CHARS: usize = 8000;

/// 공격적 절단 상한 (폴백 시도용)
pub const AGGRESSIVE_MAX_CONTENT_CHARS: usize = 4000;

/// 메타데이터에 싣는 발췌 길이
const METADATA_EXCERPT_CHARS: usize = 200;

/// 인덱싱 정책
///
/// 절단 상한을 파라미터로 받아, 기본 시도와 폴백 시도가
/// 같은 코드 경로를 공유합니다.
#[derive(Debug, Clone)]
pub struct IndexingPolicy {
    /// 임베딩 요청 전 콘텐츠 절단 상한 (문자 수)
    pub max_content_chars: usize,
}

impl Default for IndexingPolicy {
    fn default() -> Self {
        Self {
            max_content_chars: DEFAULT_MAX_CONTENT_CHARS,
        }
    }
}

impl IndexingPolicy {
    /// 폴백용 공격적 절단 정책
    pub fn aggressive() -> Self {
        Self {
            max_content_chars: AGGRESSIVE_MAX_CONTENT_CHARS,
        }
    }
}

/// 인덱싱 성공 결과
#[derive(Debug, Clone)]
pub struct IndexingOutcome {
    pub doc_id: String,
    /// 실제 임베딩된 문자 수 (절단 후)
    pub embedded_chars: usize,
    /// 절단이 일어났는지 여부
    pub truncated: bool,
}

// ============================================================================
// IndexingCoordinator
// ============================================================================

/// 인덱싱 코디네이터
///
/// 성공 경로의 부수효과는 정확히 업서트 1회 + 행 갱신 1회입니다.
/// 업서트 후 행 갱신이 실패하면 인덱스와 행이 불일치하지만,
/// 롤백하지 않고 정합성 리포트의 복구 대상으로 남깁니다.
pub struct IndexingCoordinator {
    store: Arc<DocumentStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
}

impl IndexingCoordinator {
    /// 새 코디네이터 생성
    pub fn new(
        store: Arc<DocumentStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            store,
            embedder,
            index,
        }
    }

    /// 문서 한 건 인덱싱
    ///
    /// # Errors
    /// - `InvalidInput` - 문서 없음
    /// - `EmptyContent` - 콘텐츠가 비어 있음 (업서트/행 갱신 없음)
    /// - `EmbeddingFailed` / `UpsertFailed` / `PersistenceFailed` - 단계별 실패
    pub async fn index_document(
        &self,
        doc_id: &str,
        policy: &IndexingPolicy,
    ) -> Result<IndexingOutcome> {
        let doc = self
            .store
            .get_document(doc_id)?
            .ok_or_else(|| RagError::InvalidInput(format!("Document not found: {}", doc_id)))?;

        // 1. 빈 콘텐츠 거부
        if doc.content.trim().is_empty() {
            return Err(RagError::EmptyContent(doc_id.to_string()));
        }

        // 2. 절단
        let total_chars = doc.content.chars().count();
        let truncated = total_chars > policy.max_content_chars;
        let content: String = doc.content.chars().take(policy.max_content_chars).collect();

        if truncated {
            tracing::debug!(
                "Truncating document {} ({} -> {} chars)",
                doc_id,
                total_chars,
                policy.max_content_chars
            );
        }

        // 3. 임베딩
        let embedding = self
            .embedder
            .embed(&content)
            .await
            .map_err(|e| RagError::EmbeddingFailed(Box::new(e)))?;

        // 4. 업서트
        let excerpt: String = content.chars().take(METADATA_EXCERPT_CHARS).collect();
        let record = VectorRecord {
            id: doc_id.to_string(),
            embedding: embedding.clone(),
            metadata: VectorMetadata {
                kind: RecordKind::Document,
                title: doc.title.clone(),
                doc_type: doc.doc_type.clone(),
                excerpt,
            },
        };

        self.index
            .upsert(record)
            .await
            .map_err(|e| RagError::UpsertFailed(Box::new(e)))?;

        // 5. 행 갱신 (실패 시 인덱스와 행이 불일치 - 리포트로 복구)
        self.store
            .mark_indexed(doc_id, &embedding)
            .map_err(|e| RagError::PersistenceFailed(Box::new(e)))?;

        tracing::info!(
            "Indexed document {} ({} chars{})",
            doc_id,
            content.chars().count(),
            if truncated { ", truncated" } else { "" }
        );

        Ok(IndexingOutcome {
            doc_id: doc_id.to_string(),
            embedded_chars: content.chars().count(),
            truncated,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
