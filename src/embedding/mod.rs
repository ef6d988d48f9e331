//! 임베딩 모듈 - Gemini API를 통한 텍스트 벡터화
//!
//! 텍스트를 고정 길이 벡터로 변환하는 임베딩 프로바이더입니다.
//! 시맨틱 검색과 문서 인덱싱의 기반 모듈입니다.
//!
//! 내부 재시도는 하지 않습니다. 재시도 정책은 호출자 소관이며,
//! 인덱싱 코디네이터의 "공격적 절단" 폴백이 그 예입니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = GeminiEmbedding::from_env()?;
//! let embedding = embedder.embed("복리란 무엇인가요?").await?;
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{RagError, Result};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    ///
    /// 빈 텍스트는 `InvalidInput` 에러입니다. 입력 절단은
    /// 호출자(인덱싱 코디네이터)가 수행합니다.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Google Gemini Embedding
// ============================================================================

/// Gemini 임베딩 API 엔드포인트 (gemini-embedding-001 - MRL 지원)
/// source: https://ai.google.dev/gemini-api/docs/embeddings
const GEMINI_EMBED_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-embedding-001:embedContent";

/// 기본 임베딩 차원
pub const DEFAULT_DIMENSION: usize = 768;

/// 호출 간 최소 딜레이 (무료 티어 60 RPM 준수)
const MIN_DELAY_MS: u64 = 1000;

/// Google Gemini 임베딩 구현체
#[derive(Debug)]
pub struct GeminiEmbedding {
    api_key: String,
    client: reqwest::Client,
    dimension: usize,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

/// 호출 간 최소 딜레이를 보장하는 rate limiter
///
/// 재시도가 아니라 쿼터 보호입니다. 버스트로 429를 유발하지 않도록
/// 연속 호출 사이에 딜레이만 넣습니다.
#[derive(Debug)]
struct RateLimiter {
    min_delay: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_request: None,
        }
    }

    async fn acquire(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let wait_time = self.min_delay - elapsed;
                tracing::debug!("Min delay: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }
        self.last_request = Some(Instant::now());
    }
}

impl GeminiEmbedding {
    /// 새 Gemini 임베딩 인스턴스 생성
    ///
    /// # Arguments
    /// * `api_key` - Google AI API 키
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_dimension(api_key, DEFAULT_DIMENSION)
    }

    /// 차원을 지정하여 생성
    ///
    /// # Arguments
    /// * `api_key` - Google AI API 키
    /// * `dimension` - 임베딩 차원 (768, 1536, 3072 중 선택)
    pub fn with_dimension(api_key: String, dimension: usize) -> Result<Self> {
        if ![768, 1536, 3072].contains(&dimension) {
            return Err(RagError::InvalidInput(format!(
                "Invalid dimension: {}. Must be 768, 1536, or 3072",
                dimension
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RagError::ProviderUnavailable {
                provider: "gemini",
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let rate_limiter = Arc::new(Mutex::new(RateLimiter::new(Duration::from_millis(
            MIN_DELAY_MS,
        ))));

        Ok(Self {
            api_key,
            client,
            dimension,
            rate_limiter,
        })
    }

    /// 환경변수에서 API 키를 읽어 생성
    ///
    /// 우선순위: GEMINI_API_KEY > GOOGLE_AI_API_KEY
    pub fn from_env() -> Result<Self> {
        let api_key = get_api_key()?;
        Self::new(api_key)
    }

    /// 환경변수에서 API 키를 읽어 차원 지정하여 생성
    pub fn from_env_with_dimension(dimension: usize) -> Result<Self> {
        let api_key = get_api_key()?;
        Self::with_dimension(api_key, dimension)
    }
}

/// Gemini API 요청 본문
/// source: https://ai.google.dev/gemini-api/docs/embeddings
#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: EmbedContent,
    #[serde(rename = "taskType")]
    task_type: String,
    #[serde(rename = "outputDimensionality", skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Debug, Serialize)]
struct EmbedContent {
    parts: Vec<EmbedPart>,
}

#[derive(Debug, Serialize)]
struct EmbedPart {
    text: String,
}

/// Gemini API 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

/// Gemini API 에러 응답
#[derive(Debug, Deserialize)]
pub(crate) struct GeminiError {
    pub(crate) error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeminiErrorDetail {
    pub(crate) message: String,
    #[serde(default)]
    pub(crate) status: String,
}

/// Gemini 응답 상태 코드를 에러로 변환
///
/// 임베딩/챗 클라이언트가 공유합니다.
pub(crate) fn map_gemini_error(status: reqwest::StatusCode, body: &str) -> RagError {
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return RagError::AuthError(format!("Gemini rejected credentials ({})", status));
    }

    if let Ok(parsed) = serde_json::from_str::<GeminiError>(body) {
        return RagError::ProviderUnavailable {
            provider: "gemini",
            message: format!("{}: {}", parsed.error.status, parsed.error.message),
        };
    }

    RagError::ProviderUnavailable {
        provider: "gemini",
        message: format!("HTTP {}: {}", status, body),
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        // 빈 텍스트는 호출자 오류
        if text.trim().is_empty() {
            return Err(RagError::InvalidInput(
                "Cannot embed empty text".to_string(),
            ));
        }

        let request = EmbedRequest {
            model: "models/gemini-embedding-001".to_string(),
            content: EmbedContent {
                parts: vec![EmbedPart {
                    text: text.to_string(),
                }],
            },
            task_type: "RETRIEVAL_DOCUMENT".to_string(),
            output_dimensionality: Some(self.dimension),
        };

        // Rate limiting (쿼터 보호)
        {
            let mut limiter = self.rate_limiter.lock().await;
            limiter.acquire().await;
        }

        // API 호출 (API 키는 URL이 아닌 헤더로 전송)
        let response = self
            .client
            .post(GEMINI_EMBED_URL)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::ProviderUnavailable {
                provider: "gemini",
                message: format!("Failed to send embedding request: {}", e),
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RagError::ProviderUnavailable {
                provider: "gemini",
                message: format!("Failed to read response body: {}", e),
            })?;

        if !status.is_success() {
            return Err(map_gemini_error(status, &body));
        }

        let embed_response: EmbedResponse =
            serde_json::from_str(&body).map_err(|e| RagError::ProviderUnavailable {
                provider: "gemini",
                message: format!("Failed to parse embedding response: {}", e),
            })?;

        Ok(embed_response.embedding.values)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "gemini-embedding-001"
    }
}

// ============================================================================
// Mock Embedding (테스트/오프라인용)
// ============================================================================

/// 결정적 목 임베딩 프로바이더
///
/// 네트워크 호출 없이 텍스트 바이트에서 결정적 벡터를 생성합니다.
/// 같은 입력은 항상 같은 벡터를 반환하므로 테스트가 재현 가능합니다.
#[derive(Debug, Clone)]
pub struct MockEmbedding {
    dimension: usize,
    fail: bool,
    /// 호출된 입력의 문자 수 기록 (절단 검증용)
    calls: Arc<std::sync::Mutex<Vec<usize>>>,
}

impl MockEmbedding {
    /// 지정한 차원의 목 프로바이더 생성
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            fail: false,
            calls: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    /// 항상 `ProviderUnavailable`로 실패하도록 설정
    pub fn failing(dimension: usize) -> Self {
        Self {
            fail: true,
            ..Self::new(dimension)
        }
    }

    /// 지금까지 임베딩한 입력들의 문자 수
    pub fn embedded_lengths(&self) -> Vec<usize> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(RagError::InvalidInput(
                "Cannot embed empty text".to_string(),
            ));
        }

        if self.fail {
            return Err(RagError::ProviderUnavailable {
                provider: "mock",
                message: "configured to fail".to_string(),
            });
        }

        self.calls.lock().unwrap().push(text.chars().count());

        // 바이트 합 기반 결정적 벡터
        let mut vector = vec![0.0f32; self.dimension];
        for (i, b) in text.bytes().enumerate() {
            vector[i % self.dimension] += b as f32 / 255.0;
        }

        // 정규화 (코사인 유사도 계산 안정화)
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }

        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "mock-embedding"
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 로드 (환경변수에서)
///
/// 우선순위:
/// 1. `GEMINI_API_KEY` 환경변수
/// 2. `GOOGLE_AI_API_KEY` 환경변수
pub fn get_api_key() -> Result<String> {
    if let Ok(key) = std::env::var("GEMINI_API_KEY") {
        if !key.is_empty() {
            tracing::debug!("Using API key from GEMINI_API_KEY");
            return Ok(key);
        }
    }

    if let Ok(key) = std::env::var("GOOGLE_AI_API_KEY") {
        if !key.is_empty() {
            tracing::debug!("Using API key from GOOGLE_AI_API_KEY");
            return Ok(key);
        }
    }

    Err(RagError::AuthError(
        "API key not found. Set GEMINI_API_KEY or GOOGLE_AI_API_KEY environment variable."
            .to_string(),
    ))
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    for var in ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"] {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                return true;
            }
        }
    }
    false
}

// ============================================================================
// Tests
// ============================================================================
