//! Vector Index - 벡터 인덱스 트레이트 및 유틸리티
//!
//! 외부 벡터 인덱스(Pinecone)와 로컬 인메모리 인덱스가
//! 공유하는 인터페이스입니다. 인덱스는 문서/지식 항목 id를 키로
//! 임베딩과 메타데이터를 보관하고, 최근접 이웃 질의를 제공합니다.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{RagError, Result};

// ============================================================================
// Types
// ============================================================================

/// 인덱스에 저장되는 벡터의 출처 종류
///
/// 같은 인덱스 안에서 지식베이스 항목과 업로드 문서를
/// 메타데이터 필터로 구분합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// 큐레이션된 Q&A 지식베이스 항목
    Knowledge,
    /// 업로드된 원문 문서
    Document,
}

impl RecordKind {
    /// 메타데이터 필터 값
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Knowledge => "knowledge",
            RecordKind::Document => "document",
        }
    }
}

/// 벡터에 부착되는 메타데이터
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMetadata {
    /// 출처 종류
    pub kind: RecordKind,
    /// 문서 제목 또는 지식 항목의 질문
    pub title: String,
    /// 문서 타입 태그 (지식 항목은 없음)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    /// 콘텐츠 발췌 (문서) 또는 답변 (지식 항목)
    pub excerpt: String,
}

/// 업서트용 벡터 레코드
#[derive(Debug, Clone)]
pub struct VectorRecord {
    /// 문서/지식 항목 id
    pub id: String,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
    /// 메타데이터
    pub metadata: VectorMetadata,
}

/// 질의 결과 매치
///
/// 유사도 내림차순으로 정렬되어 반환됩니다. 동점 순서는
/// 프로바이더 반환 순서를 그대로 따릅니다.
#[derive(Debug, Clone)]
pub struct QueryMatch {
    /// 문서/지식 항목 id
    pub id: String,
    /// 유사도 스코어
    pub score: f32,
    /// 저장 시 부착한 메타데이터
    pub metadata: Option<VectorMetadata>,
}

// ============================================================================
// VectorIndex Trait
// ============================================================================

/// 벡터 인덱스 트레이트 (async)
///
/// 외부 인덱스 서비스의 경계 계약입니다. 모든 호출은 실패 가능하며
/// 타입 있는 에러로 감싸 반환합니다.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// 벡터 업서트 (id가 같으면 덮어쓰기)
    async fn upsert(&self, record: VectorRecord) -> Result<()>;

    /// 최근접 이웃 질의
    ///
    /// `top_k == 0`은 `InvalidInput` 에러입니다.
    /// `kind`를 주면 해당 출처 종류만 매칭합니다.
    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        kind: Option<RecordKind>,
    ) -> Result<Vec<QueryMatch>>;

    /// 특정 id의 벡터 존재 여부 (정합성 프로브)
    async fn contains(&self, id: &str) -> Result<bool>;

    /// 인덱스 내 벡터 개수
    async fn count(&self) -> Result<usize>;

    /// 연결 진단 (운영자 status 용도)
    async fn test_connection(&self) -> Result<()>;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 두 벡터 간의 코사인 유사도를 계산합니다.
/// 결과는 -1.0 ~ 1.0 범위입니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// top_k 인자 검증 (모든 구현체 공통)
pub(crate) fn validate_top_k(top_k: usize) -> Result<()> {
    if top_k == 0 {
        return Err(RagError::InvalidInput(
            "top_k must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

// ============================================================================
// MemoryVectorIndex (테스트/오프라인용)
// ============================================================================

/// 인메모리 벡터 인덱스
///
/// 정확한(브루트포스) 코사인 스캔입니다. 테스트와 오프라인 개발에서
/// 외부 인덱스 서비스 대신 사용합니다.
#[derive(Debug, Default)]
pub struct MemoryVectorIndex {
    records: RwLock<HashMap<String, (Vec<f32>, VectorMetadata)>>,
}

impl MemoryVectorIndex {
    /// 빈 인덱스 생성
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert(&self, record: VectorRecord) -> Result<()> {
        let mut records = self.records.write().await;
        records.insert(record.id, (record.embedding, record.metadata));
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        kind: Option<RecordKind>,
    ) -> Result<Vec<QueryMatch>> {
        validate_top_k(top_k)?;

        let records = self.records.read().await;

        let mut matches: Vec<QueryMatch> = records
            .iter()
            .filter(|(_, (_, meta))| kind.map(|k| meta.kind == k).unwrap_or(true))
            .map(|(id, (vec, meta))| QueryMatch {
                id: id.clone(),
                score: cosine_similarity(embedding, vec),
                metadata: Some(meta.clone()),
            })
            .collect();

        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(top_k);

        Ok(matches)
    }

    async fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.records.read().await.contains_key(id))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().await.len())
    }

    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
