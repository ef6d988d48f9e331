//! Context Assembler - 검색 히트를 단일 컨텍스트로 병합
//!
//! 큐레이션된 지식베이스 항목을 먼저, 문서 발췌를 뒤에 배치합니다.
//! 지식 항목은 짧다고 가정하고 절단하지 않으며, 문서 발췌는
//! 소스당 예산(1000자)으로 잘라 전체 컨텍스트 크기를 제한합니다.
//! 각 항목은 같은 순서로 출처 목록에도 기록됩니다.

use serde::Serialize;

use super::retriever::RetrievalHit;

/// 문서 발췌 상한 (문자 수)
pub const DOCUMENT_EXCERPT_LIMIT: usize = 1000;

/// 절단 표시
const ELLIPSIS: &str = "...";

// ============================================================================
// Types
// ============================================================================

/// 컨텍스트 섹션 (출처 라벨 + 본문)
#[derive(Debug, Clone, Serialize)]
pub struct ContextSection {
    pub label: String,
    pub text: String,
}

/// 질의 컨텍스트
///
/// 질의 한 건 동안만 존재하며 합성 후 폐기됩니다.
/// `sources`는 섹션과 같은 순서의 사람이 읽을 출처 라벨입니다.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryContext {
    pub sections: Vec<ContextSection>,
    pub sources: Vec<String>,
}

impl QueryContext {
    /// 히트가 하나도 없었는지 여부
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// 합성 프롬프트용 텍스트 렌더링
    pub fn render(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            out.push_str(&format!("[{}]\n{}\n\n", section.label, section.text));
        }
        out
    }
}

// ============================================================================
// Assembly
// ============================================================================

/// 검색 히트를 컨텍스트로 조립
///
/// 양쪽 모두 비어 있으면 빈 컨텍스트를 반환합니다 (에러 아님).
/// 합성 단계는 빈 컨텍스트에서도 일반 지식만으로 동작해야 합니다.
pub fn assemble(knowledge_hits: &[RetrievalHit], document_hits: &[RetrievalHit]) -> QueryContext {
    let mut context = QueryContext::default();

    // 1. 지식베이스 항목 먼저 (권위 있는 큐레이션 콘텐츠, 절단 없음)
    for hit in knowledge_hits {
        context.sections.push(ContextSection {
            label: format!("지식베이스: {}", hit.label),
            text: format!("질문: {}\n답변: {}", hit.label, hit.excerpt),
        });
        context.sources.push(format!(
            "지식베이스: {} (관련도: {})",
            hit.label,
            format_score(hit.score)
        ));
    }

    // 2. 문서 발췌 (소스당 예산으로 절단)
    for hit in document_hits {
        context.sections.push(ContextSection {
            label: format!("문서: {}", hit.label),
            text: truncate_excerpt(&hit.excerpt, DOCUMENT_EXCERPT_LIMIT),
        });
        context.sources.push(format!(
            "문서: {} (관련도: {})",
            hit.label,
            format_score(hit.score)
        ));
    }

    context
}

/// 스코어 포맷 (소수 둘째 자리, 없으면 "N/A")
fn format_score(score: Option<f32>) -> String {
    match score {
        Some(s) => format!("{:.2}", s),
        None => "N/A".to_string(),
    }
}

/// 발췌 절단 (UTF-8 안전, 절단 시 표시 추가)
fn truncate_excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{}{}", truncated, ELLIPSIS)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::vector::RecordKind;

    fn knowledge_hit(question: &str, answer: &str, score: Option<f32>) -> RetrievalHit {
        RetrievalHit {
            kind: RecordKind::Knowledge,
            label: question.to_string(),
            excerpt: answer.to_string(),
            score,
        }
    }

    fn document_hit(title: &str, content: &str, score: Option<f32>) -> RetrievalHit {
        RetrievalHit {
            kind: RecordKind::Document,
            label: title.to_string(),
            excerpt: content.to_string(),
            score,
        }
    }

    #[test]
    fn test_knowledge_entries_come_first() {
        let knowledge = vec![knowledge_hit("질문", "답변", Some(0.9))];
        let documents = vec![document_hit("문서", "내용", Some(0.8))];

        let context = assemble(&knowledge, &documents);

        assert_eq!(context.sections.len(), 2);
        assert!(context.sections[0].label.starts_with("지식베이스"));
        assert!(context.sections[1].label.starts_with("문서"));
        // 출처 목록도 같은 순서
        assert!(context.sources[0].starts_with("지식베이스"));
        assert!(context.sources[1].starts_with("문서"));
    }

    #[test]
    fn test_knowledge_text_contains_full_question_and_answer() {
        let long_answer = "답".repeat(3000);
        let knowledge = vec![knowledge_hit("질문입니다", &long_answer, Some(0.9))];

        let context = assemble(&knowledge, &[]);

        // 지식 항목은 절단하지 않음
        assert!(context.sections[0].text.contains("질문입니다"));
        assert!(context.sections[0].text.contains(&long_answer));
    }

    #[test]
    fn test_document_excerpt_is_capped_at_limit() {
        let content = "a".repeat(1500);
        let documents = vec![document_hit("긴 문서", &content, Some(0.8))];

        let context = assemble(&[], &documents);

        let text = &context.sections[0].text;
        // 1000자 + 절단 표시
        assert_eq!(text.chars().count(), 1000 + ELLIPSIS.chars().count());
        assert!(text.ends_with(ELLIPSIS));
        assert!(text.starts_with(&"a".repeat(1000)));
    }

    #[test]
    fn test_short_document_excerpt_is_unmodified() {
        let content = "b".repeat(1000);
        let documents = vec![document_hit("짧은 문서", &content, None)];

        let context = assemble(&[], &documents);
        assert_eq!(context.sections[0].text, content);
    }

    #[test]
    fn test_score_formatting() {
        let hits = vec![
            knowledge_hit("q1", "a1", Some(0.9234)),
            knowledge_hit("q2", "a2", None),
        ];

        let context = assemble(&hits, &[]);

        assert!(context.sources[0].contains("0.92"));
        assert!(context.sources[1].contains("N/A"));
    }

    #[test]
    fn test_empty_hits_yield_empty_context() {
        let context = assemble(&[], &[]);

        assert!(context.is_empty());
        assert!(context.sources.is_empty());
        assert_eq!(context.render(), "");
    }

    #[test]
    fn test_compound_interest_example() {
        // 예시 시나리오: 지식 히트 1건 (0.92), 문서 히트 0건
        let knowledge = vec![knowledge_hit(
            "What is compound interest?",
            "Interest earned on interest.",
            Some(0.92),
        )];

        let context = assemble(&knowledge, &[]);

        assert_eq!(context.sources.len(), 1);
        assert!(context.sources[0].contains("What is compound interest?"));
        assert!(context.sources[0].contains("0.92"));
    }

    #[test]
    fn test_render_includes_labels_and_text() {
        let context = assemble(
            &[knowledge_hit("질문", "답변", Some(0.5))],
            &[document_hit("제목", "본문", Some(0.4))],
        );

        let rendered = context.render();
        assert!(rendered.contains("[지식베이스: 질문]"));
        assert!(rendered.contains("답변: 답변"));
        assert!(rendered.contains("[문서: 제목]"));
        assert!(rendered.contains("본문"));
    }
}
