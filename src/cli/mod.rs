//! CLI 모듈
//!
//! advisor-rag 관리/챗 명령어 정의 및 구현.
//! 파이프라인이 노출하는 경계 연산(인덱싱, 정합성 리포트, 질의응답)과
//! 업로드/지식베이스 큐레이션 협력자 액션을 명령어로 제공합니다.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::embedding::has_api_key;
use crate::knowledge::{
    AdvisorEngine, ConsistencyState, DocumentStore, IndexingPolicy, NewDocument, PineconeIndex,
    VectorIndex,
};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "advisor-rag")]
#[command(version, about = "금융 자문 지식 검색 + 답변 합성 파이프라인", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 문서를 저장소에 등록 (기본: 즉시 인덱싱)
    Ingest {
        /// 등록할 파일 경로
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// 직접 입력할 텍스트
        #[arg(short, long)]
        text: Option<String>,

        /// 문서 제목 (파일이면 생략 시 파일명)
        #[arg(long)]
        title: Option<String>,

        /// 문서 타입 태그
        #[arg(short = 'd', long)]
        doc_type: Option<String>,

        /// 인덱싱 없이 행만 등록
        #[arg(long)]
        no_index: bool,
    },

    /// 문서 한 건 인덱싱
    Index {
        /// 문서 ID
        id: String,

        /// 공격적 절단 폴백 (기본 시도 실패 후 사용)
        #[arg(long)]
        fix: bool,
    },

    /// 정합성 리포트 기반 백필 (미인덱싱 문서 재인덱싱)
    ReindexMissing,

    /// 행/인덱스 정합성 리포트
    Report,

    /// 지식베이스에 질문
    Ask {
        /// 질문
        query: String,

        /// 소스당 최대 히트 수
        #[arg(short, long, default_value = "5")]
        limit: usize,
    },

    /// 저장된 문서 목록
    List {
        /// 문서 타입 필터
        #[arg(short = 'd', long)]
        doc_type: Option<String>,

        /// 결과 개수 제한
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// 지식 항목 추가 (지식베이스 매니저 액션)
    KbAdd {
        /// 질문
        question: String,

        /// 답변
        answer: String,
    },

    /// 지식 항목 목록
    KbList {
        /// 결과 개수 제한
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// 문서 삭제
    Delete {
        /// 삭제할 문서 ID
        id: String,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Ingest {
            file,
            text,
            title,
            doc_type,
            no_index,
        } => cmd_ingest(file, text, title, doc_type, no_index).await,
        Commands::Index { id, fix } => cmd_index(&id, fix).await,
        Commands::ReindexMissing => cmd_reindex_missing().await,
        Commands::Report => cmd_report().await,
        Commands::Ask { query, limit } => cmd_ask(&query, limit).await,
        Commands::List { doc_type, limit } => cmd_list(doc_type, limit),
        Commands::KbAdd { question, answer } => cmd_kb_add(&question, &answer),
        Commands::KbList { limit } => cmd_kb_list(limit),
        Commands::Delete { id } => cmd_delete(&id),
        Commands::Status => cmd_status().await,
    }
}

/// 프로바이더 구성 확인 후 엔진 생성
fn build_engine() -> Result<AdvisorEngine> {
    if !has_api_key() {
        bail!(
            "API 키가 설정되지 않았습니다.\n\
             설정: export GEMINI_API_KEY=your-key"
        );
    }

    if !PineconeIndex::has_env_config() {
        bail!(
            "Pinecone 구성이 없습니다.\n\
             설정: export PINECONE_API_KEY=your-key\n  \
             export PINECONE_INDEX_HOST=https://your-index.svc.pinecone.io"
        );
    }

    AdvisorEngine::from_env().context("엔진 초기화 실패")
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 문서 등록 명령어 (ingest)
async fn cmd_ingest(
    file: Option<PathBuf>,
    text: Option<String>,
    title: Option<String>,
    doc_type: Option<String>,
    no_index: bool,
) -> Result<()> {
    let (content, title) = if let Some(ref path) = file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("파일 읽기 실패: {:?}", path))?;
        let title = title.unwrap_or_else(|| {
            path.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("untitled")
                .to_string()
        });
        (content, title)
    } else if let Some(text) = text {
        let title = match title {
            Some(t) => t,
            None => bail!("--text 사용 시 --title을 지정해야 합니다"),
        };
        (text, title)
    } else {
        bail!("--file 또는 --text 중 하나를 지정해야 합니다");
    };

    let engine = build_engine()?;

    println!("[*] 문서 등록 중: {}", title);

    let (id, outcome) = engine
        .ingest_document(
            NewDocument {
                title: title.clone(),
                doc_type,
                content,
            },
            !no_index,
        )
        .await
        .context("문서 등록 실패")?;

    println!("[OK] 문서가 등록되었습니다 (ID: {})", id);

    match outcome {
        Some(o) => {
            println!(
                "     인덱싱 완료: {} 문자{}",
                o.embedded_chars,
                if o.truncated { " (절단됨)" } else { "" }
            );
        }
        None => {
            println!("     인덱싱은 건너뛰었습니다 (advisor-rag index {} 로 실행)", id);
        }
    }

    Ok(())
}

/// 인덱싱 명령어 (index)
///
/// `--fix`는 기본 시도가 실패했을 때 운영자가 호출하는
/// 공격적 절단 폴백입니다. 두 시도는 독립 연산입니다.
async fn cmd_index(id: &str, fix: bool) -> Result<()> {
    let engine = build_engine()?;

    let policy = if fix {
        println!("[*] 공격적 절단 정책으로 인덱싱 중: {}", id);
        IndexingPolicy::aggressive()
    } else {
        println!("[*] 인덱싱 중: {}", id);
        IndexingPolicy::default()
    };

    match engine.index_document(id, &policy).await {
        Ok(outcome) => {
            println!(
                "[OK] 인덱싱 완료: {} 문자{}",
                outcome.embedded_chars,
                if outcome.truncated { " (절단됨)" } else { "" }
            );
        }
        Err(e) => {
            println!("[!] 인덱싱 실패: {}", e);
            if !fix {
                println!("    공격적 절단으로 재시도: advisor-rag index {} --fix", id);
            }
            return Err(e.into());
        }
    }

    Ok(())
}

/// 백필 명령어 (reindex-missing)
async fn cmd_reindex_missing() -> Result<()> {
    let engine = build_engine()?;

    println!("[*] 정합성 리포트 기반 백필 실행 중...");

    let outcome = engine.reindex_missing().await.context("백필 실패")?;

    println!("[OK] 백필 완료:");
    println!("     재인덱싱: {} 건", outcome.reindexed);
    println!("     플래그 복구: {} 건", outcome.flag_repaired);
    if outcome.failures > 0 {
        println!("[!]  실패: {} 건 (로그 확인)", outcome.failures);
    }
    if outcome.drift_warnings > 0 {
        println!(
            "[!]  드리프트 경고: {} 건 (플래그는 서 있으나 인덱스에 없음)",
            outcome.drift_warnings
        );
    }

    Ok(())
}

/// 정합성 리포트 명령어 (report)
async fn cmd_report() -> Result<()> {
    let engine = build_engine()?;

    println!("[*] 정합성 리포트 생성 중...");

    let report = engine
        .generate_consistency_report()
        .await
        .context("리포트 생성 실패")?;

    if report.is_empty() {
        println!("\n[!] 저장된 문서가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 정합성 리포트 ({} 건):\n", report.len());

    for record in &report {
        let state_str = match record.state {
            ConsistencyState::Indexed => "OK  ",
            ConsistencyState::EmbeddingPresentButNotFlagged => "FLAG",
            ConsistencyState::MissingEmbedding => "MISS",
            ConsistencyState::FlaggedButAbsent => "DRIFT",
        };

        println!(
            "  [{}] {} {}",
            state_str,
            record.doc_id,
            truncate_text(&record.title, 40)
        );
    }

    let missing = report
        .iter()
        .filter(|r| r.state == ConsistencyState::MissingEmbedding)
        .count();
    if missing > 0 {
        println!(
            "\n[*] 미인덱싱 {} 건 - advisor-rag reindex-missing 으로 백필할 수 있습니다.",
            missing
        );
    }

    Ok(())
}

/// 질문 명령어 (ask)
async fn cmd_ask(query: &str, limit: usize) -> Result<()> {
    let engine = build_engine()?;

    println!("[*] 검색 및 답변 생성 중: \"{}\"", query);

    let answer = engine
        .answer_question(query, limit)
        .await
        .context("답변 생성 실패")?;

    println!("\n{}\n", answer.answer);

    println!("출처:");
    for (i, source) in answer.sources.iter().enumerate() {
        println!("  {}. {}", i + 1, source);
    }

    Ok(())
}

/// 문서 목록 명령어 (list)
fn cmd_list(doc_type: Option<String>, limit: usize) -> Result<()> {
    let store = DocumentStore::open_default().context("DocumentStore 열기 실패")?;

    let docs = store
        .list_documents(limit, doc_type.as_deref())
        .context("문서 목록 조회 실패")?;

    if docs.is_empty() {
        println!("[!] 저장된 문서가 없습니다.");
        return Ok(());
    }

    println!("[OK] 저장된 문서 ({} 건):\n", docs.len());

    for doc in docs {
        let dt = doc.doc_type.as_deref().unwrap_or("-");
        let indexed = if doc.pinecone_indexed { "IDX" } else { "   " };

        println!(
            "  [{}] [{}] {}",
            indexed,
            dt,
            truncate_text(&doc.title, 40)
        );
        println!("        ID: {}", doc.id);
        println!(
            "        {} | {}",
            doc.created_at.format("%Y-%m-%d %H:%M"),
            format_bytes(doc.content.len())
        );
        println!();
    }

    Ok(())
}

/// 지식 항목 추가 명령어 (kb-add)
fn cmd_kb_add(question: &str, answer: &str) -> Result<()> {
    if question.trim().is_empty() || answer.trim().is_empty() {
        bail!("질문과 답변은 비어 있을 수 없습니다");
    }

    let store = DocumentStore::open_default().context("DocumentStore 열기 실패")?;

    let id = store
        .add_knowledge_entry(question, answer)
        .context("지식 항목 추가 실패")?;

    println!("[OK] 지식 항목이 추가되었습니다 (ID: {})", id);
    println!("     (벡터 인덱싱은 지식베이스 관리 파이프라인이 담당합니다)");

    Ok(())
}

/// 지식 항목 목록 명령어 (kb-list)
fn cmd_kb_list(limit: usize) -> Result<()> {
    let store = DocumentStore::open_default().context("DocumentStore 열기 실패")?;

    let entries = store
        .list_knowledge_entries(limit)
        .context("지식 항목 조회 실패")?;

    if entries.is_empty() {
        println!("[!] 지식 항목이 없습니다.");
        return Ok(());
    }

    println!("[OK] 지식 항목 ({} 건):\n", entries.len());

    for entry in entries {
        println!("  Q: {}", truncate_text(&entry.question, 60));
        println!("  A: {}", truncate_text(&entry.answer, 60));
        println!("     ID: {}\n", entry.id);
    }

    Ok(())
}

/// 삭제 명령어 (delete)
fn cmd_delete(id: &str) -> Result<()> {
    let store = DocumentStore::open_default().context("DocumentStore 열기 실패")?;

    let doc = store.get_document(id).context("문서 조회 실패")?;
    if doc.is_none() {
        bail!("ID {}인 문서를 찾을 수 없습니다", id);
    }

    let deleted = store.delete_document(id).context("문서 삭제 실패")?;

    if deleted {
        println!("[OK] 문서 {} 삭제됨", id);
        println!("     (주의: 벡터 인덱스의 벡터는 별도 정리가 필요할 수 있습니다)");
    } else {
        println!("[!] 삭제할 문서를 찾을 수 없습니다");
    }

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status() -> Result<()> {
    println!("advisor-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let data_dir = crate::knowledge::get_data_dir();
    println!("[*] 데이터 디렉토리: {}", data_dir.display());

    // API 키 상태
    if has_api_key() {
        println!("[OK] Gemini API 키: 설정됨");
    } else {
        println!("[!] Gemini API 키: 미설정");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }

    if PineconeIndex::has_env_config() {
        println!("[OK] Pinecone 구성: 설정됨");
    } else {
        println!("[!] Pinecone 구성: 미설정");
        println!("    설정: export PINECONE_API_KEY=... PINECONE_INDEX_HOST=...");
    }

    // 저장소 통계
    match DocumentStore::open_default() {
        Ok(store) => match store.stats() {
            Ok(stats) => {
                println!(
                    "[OK] 문서: {} 건 (인덱싱됨: {}), 지식 항목: {} 건",
                    stats.document_count, stats.indexed_count, stats.knowledge_count
                );
                println!(
                    "     총 콘텐츠: {}",
                    format_bytes(stats.total_content_bytes)
                );
            }
            Err(e) => {
                println!("[!] 통계 조회 실패: {}", e);
            }
        },
        Err(e) => {
            println!("[!] DocumentStore 열기 실패: {}", e);
        }
    }

    // 벡터 인덱스 연결 진단
    if PineconeIndex::has_env_config() {
        match PineconeIndex::from_env() {
            Ok(index) => match index.test_connection().await {
                Ok(()) => match index.count().await {
                    Ok(count) => println!("[OK] 벡터 인덱스: 연결됨 ({} 벡터)", count),
                    Err(_) => println!("[OK] 벡터 인덱스: 연결됨"),
                },
                Err(e) => {
                    println!("[!] 벡터 인덱스 연결 실패: {}", e);
                }
            },
            Err(e) => {
                println!("[!] 벡터 인덱스 구성 실패: {}", e);
            }
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
