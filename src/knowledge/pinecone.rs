//! Pinecone Vector Index - 호스팅 벡터 인덱스 클라이언트
//!
//! Pinecone REST API로 업서트/질의/프로브를 수행합니다.
//! ref: https://docs.pinecone.io/reference/api/data-plane/upsert
//!
//! 인덱스 내부 검색 알고리즘은 서비스 소관이며, 이 클라이언트는
//! 요청/응답 계약만 책임집니다. 응답은 항상 타입 있는 값으로
//! 변환해 반환하고, 원시 페이로드를 상위로 전달하지 않습니다.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{RagError, Result};

use super::vector::{
    validate_top_k, QueryMatch, RecordKind, VectorIndex, VectorMetadata, VectorRecord,
};

// ============================================================================
// PineconeIndex
// ============================================================================

/// Pinecone 벡터 인덱스 클라이언트
///
/// 인덱스 호스트 URL과 API 키로 구성됩니다. 키는 헤더로만 전송합니다.
#[derive(Debug)]
pub struct PineconeIndex {
    host: String,
    api_key: String,
    client: reqwest::Client,
}

impl PineconeIndex {
    /// 새 클라이언트 생성
    ///
    /// # Arguments
    /// * `host` - 인덱스 호스트 URL (예: https://advisor-xxxx.svc.pinecone.io)
    /// * `api_key` - Pinecone API 키
    pub fn new(host: impl Into<String>, api_key: String) -> Result<Self> {
        let host = host.into();
        if api_key.is_empty() {
            return Err(RagError::AuthError(
                "Pinecone API key is empty".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RagError::ProviderUnavailable {
                provider: "pinecone",
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            host: host.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    /// 환경변수에서 구성 로드
    ///
    /// - `PINECONE_API_KEY` - API 키
    /// - `PINECONE_INDEX_HOST` - 인덱스 호스트 URL
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("PINECONE_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                RagError::AuthError("PINECONE_API_KEY not set".to_string())
            })?;

        let host = std::env::var("PINECONE_INDEX_HOST")
            .ok()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| {
                RagError::IndexNotFound("PINECONE_INDEX_HOST not set".to_string())
            })?;

        Self::new(host, api_key)
    }

    /// 환경변수 구성 존재 여부
    pub fn has_env_config() -> bool {
        let key_ok = std::env::var("PINECONE_API_KEY")
            .map(|k| !k.is_empty())
            .unwrap_or(false);
        let host_ok = std::env::var("PINECONE_INDEX_HOST")
            .map(|h| !h.is_empty())
            .unwrap_or(false);
        key_ok && host_ok
    }

    /// POST 요청 공통 처리
    async fn post(&self, path: &str, body: serde_json::Value) -> Result<String> {
        let url = format!("{}{}", self.host, path);

        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::ProviderUnavailable {
                provider: "pinecone",
                message: format!("Request to {} failed: {}", path, e),
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RagError::ProviderUnavailable {
                provider: "pinecone",
                message: format!("Failed to read response body: {}", e),
            })?;

        if !status.is_success() {
            return Err(map_pinecone_error(status, &text));
        }

        Ok(text)
    }
}

/// Pinecone 응답 상태 코드를 에러로 변환
fn map_pinecone_error(status: reqwest::StatusCode, body: &str) -> RagError {
    match status.as_u16() {
        401 | 403 => RagError::AuthError(format!("Pinecone rejected credentials ({})", status)),
        404 => RagError::IndexNotFound(format!("Index endpoint not found: {}", body)),
        _ => RagError::ProviderUnavailable {
            provider: "pinecone",
            message: format!("HTTP {}: {}", status, body),
        },
    }
}

// ============================================================================
// Wire Types
// ============================================================================

/// 업서트 요청의 벡터 항목
#[derive(Debug, Serialize)]
struct UpsertVector {
    id: String,
    values: Vec<f32>,
    metadata: VectorMetadata,
}

/// /query 응답
#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<WireMatch>,
}

#[derive(Debug, Deserialize)]
struct WireMatch {
    id: String,
    #[serde(default)]
    score: f32,
    metadata: Option<VectorMetadata>,
}

/// /vectors/fetch 응답
#[derive(Debug, Deserialize)]
struct FetchResponse {
    #[serde(default)]
    vectors: HashMap<String, serde_json::Value>,
}

/// /describe_index_stats 응답
#[derive(Debug, Deserialize)]
struct StatsResponse {
    #[serde(rename = "totalVectorCount", default)]
    total_vector_count: usize,
}

// ============================================================================
// VectorIndex Implementation
// ============================================================================

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, record: VectorRecord) -> Result<()> {
        if record.embedding.is_empty() {
            return Err(RagError::InvalidInput(
                "Cannot upsert empty embedding".to_string(),
            ));
        }

        let body = json!({
            "vectors": [UpsertVector {
                id: record.id.clone(),
                values: record.embedding,
                metadata: record.metadata,
            }],
        });

        self.post("/vectors/upsert", body).await?;
        tracing::debug!("Upserted vector: {}", record.id);
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        kind: Option<RecordKind>,
    ) -> Result<Vec<QueryMatch>> {
        validate_top_k(top_k)?;

        let mut body = json!({
            "vector": embedding,
            "topK": top_k,
            "includeMetadata": true,
        });
        if let Some(kind) = kind {
            body["filter"] = json!({ "kind": { "$eq": kind.as_str() } });
        }

        let text = self.post("/query", body).await?;
        let parsed: QueryResponse =
            serde_json::from_str(&text).map_err(|e| RagError::ProviderUnavailable {
                provider: "pinecone",
                message: format!("Failed to parse query response: {}", e),
            })?;

        // 스코어 내림차순은 프로바이더가 보장. 동점 순서는 반환 순서 유지.
        Ok(parsed
            .matches
            .into_iter()
            .map(|m| QueryMatch {
                id: m.id,
                score: m.score,
                metadata: m.metadata,
            })
            .collect())
    }

    async fn contains(&self, id: &str) -> Result<bool> {
        let url = format!("{}/vectors/fetch?ids={}", self.host, id);

        let response = self
            .client
            .get(&url)
            .header("Api-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| RagError::ProviderUnavailable {
                provider: "pinecone",
                message: format!("Fetch request failed: {}", e),
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RagError::ProviderUnavailable {
                provider: "pinecone",
                message: format!("Failed to read response body: {}", e),
            })?;

        if !status.is_success() {
            return Err(map_pinecone_error(status, &text));
        }

        let parsed: FetchResponse =
            serde_json::from_str(&text).map_err(|e| RagError::ProviderUnavailable {
                provider: "pinecone",
                message: format!("Failed to parse fetch response: {}", e),
            })?;

        Ok(parsed.vectors.contains_key(id))
    }

    async fn count(&self) -> Result<usize> {
        let text = self.post("/describe_index_stats", json!({})).await?;
        let parsed: StatsResponse =
            serde_json::from_str(&text).map_err(|e| RagError::ProviderUnavailable {
                provider: "pinecone",
                message: format!("Failed to parse stats response: {}", e),
            })?;
        Ok(parsed.total_vector_count)
    }

    async fn test_connection(&self) -> Result<()> {
        let count = self.count().await?;
        tracing::info!("Pinecone connection OK ({} vectors)", count);
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
