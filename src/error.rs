//! 에러 타입 - 파이프라인 전역 에러 분류
//!
//! 모든 외부 호출은 실패 가능하며, 어느 단계에서 실패했는지
//! 호출자가 구분할 수 있도록 단계별 변형으로 감쌉니다.

use thiserror::Error;

/// 파이프라인 전역 Result 타입
pub type Result<T> = std::result::Result<T, RagError>;

/// RAG 파이프라인 에러 분류
///
/// - 호출자 오류: `InvalidInput`, `EmptyContent`
/// - 외부 프로바이더 오류: `ProviderUnavailable`, `AuthError`, `IndexNotFound`
/// - 인덱싱 단계별 오류: `EmbeddingFailed`, `UpsertFailed`, `PersistenceFailed`
/// - 질의 오류: `RetrievalFailed` (양쪽 소스 모두 실패), `SynthesisFailed`
#[derive(Debug, Error)]
pub enum RagError {
    /// 호출자 입력 오류 (재시도 불가)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 외부 프로바이더 접근 불가 (네트워크/서버 오류)
    #[error("Provider '{provider}' unavailable: {message}")]
    ProviderUnavailable {
        provider: &'static str,
        message: String,
    },

    /// 인증 실패 (API 키 누락/무효)
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// 벡터 인덱스를 찾을 수 없음
    #[error("Vector index not found: {0}")]
    IndexNotFound(String),

    /// 콘텐츠가 비어 있는 문서는 인덱싱 불가
    #[error("Document '{0}' has empty content")]
    EmptyContent(String),

    /// 인덱싱 1단계 실패: 임베딩 생성
    #[error("Embedding generation failed")]
    EmbeddingFailed(#[source] Box<RagError>),

    /// 인덱싱 2단계 실패: 벡터 업서트
    #[error("Vector upsert failed")]
    UpsertFailed(#[source] Box<RagError>),

    /// 인덱싱 3단계 실패: 행 갱신
    ///
    /// 벡터 인덱스에는 이미 업서트가 완료된 상태이므로
    /// 행과 인덱스가 일시적으로 불일치합니다 (정합성 리포트로 복구).
    #[error("Row persistence failed after upsert")]
    PersistenceFailed(#[source] Box<RagError>),

    /// 두 검색 소스가 모두 실패
    #[error("Retrieval failed: knowledge-base: {knowledge}; documents: {document}")]
    RetrievalFailed {
        knowledge: Box<RagError>,
        document: Box<RagError>,
    },

    /// 답변 합성 프로바이더 실패
    #[error("Answer synthesis failed")]
    SynthesisFailed(#[source] Box<RagError>),

    /// SQLite 오류
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// 스토어 락 오염 (다른 스레드 패닉 후)
    #[error("Store lock poisoned")]
    LockPoisoned,

    /// 파일시스템 오류 (데이터 디렉토리 생성 등)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// 직렬화 오류 (임베딩 컬럼 등)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RagError {
    /// 인덱싱 단계 에러인지 확인
    pub fn is_indexing_stage(&self) -> bool {
        matches!(
            self,
            RagError::EmbeddingFailed(_)
                | RagError::UpsertFailed(_)
                | RagError::PersistenceFailed(_)
        )
    }

    /// 호출자 정책으로 재시도 가능한 에러인지 확인
    ///
    /// 외부 프로바이더 오류만 재시도 대상입니다. 입력 오류는
    /// 동일 입력으로 재시도해도 결과가 같습니다.
    pub fn is_retryable(&self) -> bool {
        match self {
            RagError::ProviderUnavailable { .. }
            | RagError::AuthError(_)
            | RagError::IndexNotFound(_) => true,
            RagError::EmbeddingFailed(cause)
            | RagError::UpsertFailed(cause)
            | RagError::PersistenceFailed(cause)
            | RagError::SynthesisFailed(cause) => cause.is_retryable(),
            _ => false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_errors_carry_cause() {
        let cause = RagError::ProviderUnavailable {
            provider: "gemini",
            message: "connection refused".to_string(),
        };
        let err = RagError::EmbeddingFailed(Box::new(cause));

        assert!(err.is_indexing_stage());

        // source 체인으로 원인 확인 가능
        let source = std::error::Error::source(&err);
        assert!(source.is_some());
        assert!(source.unwrap().to_string().contains("connection refused"));
    }

    #[test]
    fn test_retryable_classification() {
        let provider = RagError::ProviderUnavailable {
            provider: "pinecone",
            message: "timeout".to_string(),
        };
        assert!(provider.is_retryable());

        let invalid = RagError::InvalidInput("empty".to_string());
        assert!(!invalid.is_retryable());

        // 단계 에러는 원인을 따라감
        let wrapped = RagError::UpsertFailed(Box::new(RagError::AuthError("no key".into())));
        assert!(wrapped.is_retryable());

        let wrapped = RagError::EmbeddingFailed(Box::new(RagError::InvalidInput("bad".into())));
        assert!(!wrapped.is_retryable());
    }

    #[test]
    fn test_retrieval_failed_message_names_both_sources() {
        let err = RagError::RetrievalFailed {
            knowledge: Box::new(RagError::AuthError("bad key".into())),
            document: Box::new(RagError::IndexNotFound("advisor".into())),
        };

        let msg = err.to_string();
        assert!(msg.contains("bad key"));
        assert!(msg.contains("advisor"));
    }
}
