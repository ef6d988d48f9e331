//! Answer Synthesizer - 컨텍스트 기반 답변 합성
//!
//! 조립된 컨텍스트와 질문을 고정 지시문과 함께 컴플리션
//! 프로바이더로 보내 단일 답변을 생성합니다. 출처 목록에는
//! 사용된 컨텍스트 출처에 더해 항상 합성 모델 항목을 붙이므로
//! `sources`는 절대 비지 않습니다.

use std::sync::Arc;

use serde::Serialize;

use crate::completion::CompletionProvider;
use crate::error::{RagError, Result};

use super::context::QueryContext;

/// 고정 지시문
///
/// 제공된 참고 자료와 일반 지식을 함께 사용하되, 참고 자료를
/// 사용했으면 명시적으로 인용하고, 일반 투자자 눈높이로 설명하도록
/// 지시합니다.
const INSTRUCTIONS: &str = "\
당신은 금융 자문 서비스의 지식 도우미입니다.
- 아래 참고 자료가 있으면 우선 활용하고, 어떤 자료를 사용했는지 답변에서 명시하세요.
- 참고 자료가 없거나 부족하면 일반 금융 지식으로 답하세요.
- 전문 용어는 풀어 쓰고, 일반 투자자가 이해할 수 있는 수준으로 설명하세요.
- 특정 상품의 매수/매도 권유는 하지 마세요.";

// ============================================================================
// Types
// ============================================================================

/// 합성된 답변
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    /// 자연어 답변
    pub answer: String,
    /// 사용된 출처 라벨 (마지막은 항상 합성 모델 항목)
    pub sources: Vec<String>,
}

// ============================================================================
// AnswerSynthesizer
// ============================================================================

/// 답변 합성기
pub struct AnswerSynthesizer {
    completion: Arc<dyn CompletionProvider>,
}

impl AnswerSynthesizer {
    /// 새 합성기 생성
    pub fn new(completion: Arc<dyn CompletionProvider>) -> Self {
        Self { completion }
    }

    /// 질문 + 컨텍스트로 답변 생성
    ///
    /// 빈 컨텍스트도 정상 입력입니다 - 일반 지식만으로 답합니다.
    /// 프로바이더 실패는 `SynthesisFailed`로 감싸며 부분 답변은
    /// 반환하지 않습니다.
    pub async fn synthesize(&self, query: &str, context: &QueryContext) -> Result<Answer> {
        let prompt = if context.is_empty() {
            format!("질문: {}", query)
        } else {
            format!("참고 자료:\n{}질문: {}", context.render(), query)
        };

        tracing::debug!(
            "Synthesizing answer ({} context sections)",
            context.sections.len()
        );

        let answer = self
            .completion
            .complete(INSTRUCTIONS, &prompt)
            .await
            .map_err(|e| RagError::SynthesisFailed(Box::new(e)))?;

        // 컨텍스트 출처 + 합성 모델 항목 (항상 마지막에 추가)
        let mut sources = context.sources.clone();
        sources.push(format!("답변 생성 모델: {}", self.completion.model()));

        Ok(Answer { answer, sources })
    }
}

// ============================================================================
// Tests
// ============================================================================
