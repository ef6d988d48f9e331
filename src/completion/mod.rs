//! 챗 컴플리션 모듈 - Gemini generateContent API
//!
//! 조립된 컨텍스트와 질문을 받아 자연어 답변을 생성하는
//! 컴플리션 프로바이더입니다. 임베딩 모듈과 같은 프로바이더
//! 계열이므로 인증/에러 처리 방식을 공유합니다.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::embedding::{get_api_key, map_gemini_error};
use crate::error::{RagError, Result};

// ============================================================================
// CompletionProvider Trait
// ============================================================================

/// 챗 컴플리션 프로바이더 트레이트
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// 시스템 지시문 + 프롬프트로 답변 텍스트 생성
    async fn complete(&self, instructions: &str, prompt: &str) -> Result<String>;

    /// 모델 식별자 (출처 목록 표기용)
    fn model(&self) -> &str;
}

// ============================================================================
// Google Gemini Completion
// ============================================================================

/// Gemini generateContent API 베이스 URL
/// source: https://ai.google.dev/gemini-api/docs/text-generation
const GEMINI_GENERATE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// 기본 챗 모델
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.0-flash";

/// Google Gemini 챗 컴플리션 구현체
#[derive(Debug)]
pub struct GeminiCompletion {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiCompletion {
    /// 새 인스턴스 생성
    pub fn new(api_key: String, model: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| RagError::ProviderUnavailable {
                provider: "gemini",
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            api_key,
            model: model.into(),
            client,
        })
    }

    /// 환경변수에서 API 키를 읽어 생성
    ///
    /// 모델은 GEMINI_CHAT_MODEL 환경변수로 재정의할 수 있습니다.
    pub fn from_env() -> Result<Self> {
        let api_key = get_api_key()?;
        let model = std::env::var("GEMINI_CHAT_MODEL")
            .ok()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string());
        Self::new(api_key, model)
    }
}

/// generateContent 요청 본문
#[derive(Debug, Serialize)]
struct GenerateRequest {
    #[serde(rename = "systemInstruction")]
    system_instruction: ContentPayload,
    contents: Vec<ContentPayload>,
}

#[derive(Debug, Serialize)]
struct ContentPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
struct TextPart {
    text: String,
}

/// generateContent 응답
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl CompletionProvider for GeminiCompletion {
    async fn complete(&self, instructions: &str, prompt: &str) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(RagError::InvalidInput(
                "Cannot complete empty prompt".to_string(),
            ));
        }

        let url = format!("{}/{}:generateContent", GEMINI_GENERATE_URL, self.model);

        let request = GenerateRequest {
            system_instruction: ContentPayload {
                role: None,
                parts: vec![TextPart {
                    text: instructions.to_string(),
                }],
            },
            contents: vec![ContentPayload {
                role: Some("user".to_string()),
                parts: vec![TextPart {
                    text: prompt.to_string(),
                }],
            }],
        };

        tracing::debug!("Requesting completion from {} ({} chars)", self.model, prompt.len());

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::ProviderUnavailable {
                provider: "gemini",
                message: format!("Failed to send completion request: {}", e),
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

        let parsed: GenerateResponse =
            serde_json::from_str(&body).map_err(|e| RagError::ProviderUnavailable {
                provider: "gemini",
                message: format!("Failed to parse completion response: {}", e),
            })?;

        let answer: String = parsed
            .candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if answer.is_empty() {
            return Err(RagError::ProviderUnavailable {
                provider: "gemini",
                message: "Completion response contained no candidates".to_string(),
            });
        }

        Ok(answer)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Mock Completion (테스트용)
// ============================================================================

/// 테스트용 목 컴플리션 프로바이더
///
/// 고정 응답을 반환하고 수신한 프롬프트를 기록합니다.
/// 합성 단계 테스트에서 프롬프트 구성을 검증할 때 사용합니다.
#[derive(Debug, Clone)]
pub struct MockCompletion {
    response: String,
    fail: bool,
    calls: Arc<std::sync::Mutex<Vec<(String, String)>>>,
}

impl MockCompletion {
    /// 고정 응답을 반환하는 목 생성
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            fail: false,
            calls: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    /// 항상 실패하는 목 생성
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new("")
        }
    }

    /// 수신한 (instructions, prompt) 기록
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for MockCompletion {
    async fn complete(&self, instructions: &str, prompt: &str) -> Result<String> {
        if self.fail {
            return Err(RagError::ProviderUnavailable {
                provider: "mock",
                message: "configured to fail".to_string(),
            });
        }

        self.calls
            .lock()
            .unwrap()
            .push((instructions.to_string(), prompt.to_string()));

        Ok(self.response.clone())
    }

    fn model(&self) -> &str {
        "mock-completion"
    }
}

// ============================================================================
// Tests
// ============================================================================
