//! Document Store - rusqlite 기반 동기 문서/지식 저장소
//!
//! 업로드된 문서 행과 큐레이션된 Q&A 지식 항목을 저장합니다.
//! 문서 행은 벡터 인덱스 멤버십 플래그(`pinecone_indexed`)와
//! 캐시된 임베딩을 함께 보관하며, 인덱싱 코디네이터가 갱신합니다.
//! 저장 위치: ~/.advisor-rag/advisor.db

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags};
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.advisor-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".advisor-rag")
}

// ============================================================================
// Types
// ============================================================================

/// 저장된 문서 행
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// 불투명 식별자 (UUID v4)
    pub id: String,
    pub title: String,
    /// 카테고리 태그 (예: "guide", "regulation")
    pub doc_type: Option<String>,
    pub content: String,
    /// 벡터 인덱스 멤버십 플래그
    ///
    /// true이면 같은 id의 벡터가 외부 인덱스에 존재해야 합니다.
    /// 일시적으로 깨질 수 있으며 정합성 리포트가 탐지합니다.
    pub pinecone_indexed: bool,
    /// 캐시된 임베딩 (인덱싱 성공 시 기록)
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 새 문서 입력용 구조체
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub title: String,
    pub doc_type: Option<String>,
    pub content: String,
}

/// 큐레이션된 Q&A 지식 항목
///
/// 지식베이스 매니저가 관리하며 파이프라인에는 읽기 전용입니다.
/// 인덱싱 라이프사이클의 대상이 아닙니다 (외부에서 선-인덱싱됨).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: String,
    pub question: String,
    pub answer: String,
    pub created_at: DateTime<Utc>,
}

/// 저장소 통계
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub document_count: usize,
    pub indexed_count: usize,
    pub knowledge_count: usize,
    pub total_content_bytes: usize,
    pub db_path: PathBuf,
}

// ============================================================================
// DocumentStore
// ============================================================================

/// Document Store - 동기 문서/지식 저장소
pub struct DocumentStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl DocumentStore {
    /// 저장소 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };

        store.initialize()?;
        Ok(store)
    }

    /// 기본 위치에서 열기 (~/.advisor-rag/advisor.db)
    pub fn open_default() -> Result<Self> {
        let data_dir = get_data_dir();
        let db_path = data_dir.join("advisor.db");
        Self::open(&db_path)
    }

    /// DB 경로 반환
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| RagError::LockPoisoned)
    }

    /// 스키마 초기화 (멱등)
    fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                doc_type TEXT,
                content TEXT NOT NULL,
                pinecone_indexed INTEGER NOT NULL DEFAULT 0,
                embedding TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_documents_type ON documents(doc_type)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS knowledge_entries (
                id TEXT PRIMARY KEY,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        tracing::debug!("Document store initialized at {:?}", self.db_path);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Documents
    // ------------------------------------------------------------------

    /// 문서 저장 (업로드 협력자 액션)
    ///
    /// 새 id를 발급하며 `pinecone_indexed = false`로 시작합니다.
    pub fn add_document(&self, doc: NewDocument) -> Result<String> {
        let conn = self.lock()?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO documents (id, title, doc_type, content, pinecone_indexed, embedding, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 0, NULL, ?5, ?5)",
            params![id, doc.title, doc.doc_type, doc.content, now],
        )?;

        tracing::info!("Added document: {} ({})", doc.title, id);
        Ok(id)
    }

    /// ID로 문서 조회
    pub fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, title, doc_type, content, pinecone_indexed, embedding, created_at, updated_at
             FROM documents WHERE id = ?1",
        )?;

        let doc = stmt.query_row(params![id], document_from_row).ok();
        Ok(doc)
    }

    /// 문서 목록 조회 (타입 필터 지원)
    pub fn list_documents(&self, limit: usize, doc_type: Option<&str>) -> Result<Vec<Document>> {
        let conn = self.lock()?;

        let docs: Vec<Document> = if let Some(dt) = doc_type {
            let mut stmt = conn.prepare(
                "SELECT id, title, doc_type, content, pinecone_indexed, embedding, created_at, updated_at
                 FROM documents WHERE doc_type = ?1
                 ORDER BY created_at DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![dt, limit as i64], document_from_row)?;
            rows.filter_map(|r| r.ok()).collect()
        } else {
            let mut stmt = conn.prepare(
                "SELECT id, title, doc_type, content, pinecone_indexed, embedding, created_at, updated_at
                 FROM documents ORDER BY created_at DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit as i64], document_from_row)?;
            rows.filter_map(|r| r.ok()).collect()
        };

        Ok(docs)
    }

    /// 전체 문서 순회 (정합성 리포트용)
    ///
    /// 리포트는 전수 조사이므로 limit 없이 읽습니다.
    pub fn all_documents(&self) -> Result<Vec<Document>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, title, doc_type, content, pinecone_indexed, embedding, created_at, updated_at
             FROM documents ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map([], document_from_row)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// 콘텐츠 수정 (업로드 협력자 액션)
    ///
    /// 내용이 바뀌면 기존 벡터는 더 이상 내용을 대표하지 않으므로
    /// `pinecone_indexed`를 내리고 캐시된 임베딩을 지웁니다.
    pub fn update_content(&self, id: &str, content: &str) -> Result<bool> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();

        let rows = conn.execute(
            "UPDATE documents
             SET content = ?2, pinecone_indexed = 0, embedding = NULL, updated_at = ?3
             WHERE id = ?1",
            params![id, content, now],
        )?;

        Ok(rows > 0)
    }

    /// 인덱싱 성공 기록 (부분 갱신)
    ///
    /// `pinecone_indexed = true`와 임베딩을 함께 기록합니다.
    pub fn mark_indexed(&self, id: &str, embedding: &[f32]) -> Result<()> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        let encoded = serde_json::to_string(embedding)?;

        let rows = conn.execute(
            "UPDATE documents
             SET pinecone_indexed = 1, embedding = ?2, updated_at = ?3
             WHERE id = ?1",
            params![id, encoded, now],
        )?;

        if rows == 0 {
            return Err(RagError::InvalidInput(format!(
                "Document not found: {}",
                id
            )));
        }

        Ok(())
    }

    /// 플래그만 갱신 (값싼 복구: 임베딩이 이미 있는 행)
    pub fn set_indexed_flag(&self, id: &str, indexed: bool) -> Result<bool> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();

        let rows = conn.execute(
            "UPDATE documents SET pinecone_indexed = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, indexed, now],
        )?;

        Ok(rows > 0)
    }

    /// 문서 삭제 (외부 협력자 액션 - 파이프라인은 호출하지 않음)
    pub fn delete_document(&self, id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let rows = conn.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // ------------------------------------------------------------------
    // Knowledge Entries
    // ------------------------------------------------------------------

    /// 지식 항목 추가 (지식베이스 매니저 액션)
    pub fn add_knowledge_entry(&self, question: &str, answer: &str) -> Result<String> {
        let conn = self.lock()?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO knowledge_entries (id, question, answer, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, question, answer, now],
        )?;

        tracing::info!("Added knowledge entry: {}", id);
        Ok(id)
    }

    /// ID로 지식 항목 조회
    pub fn get_knowledge_entry(&self, id: &str) -> Result<Option<KnowledgeEntry>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, question, answer, created_at FROM knowledge_entries WHERE id = ?1",
        )?;

        let entry = stmt.query_row(params![id], knowledge_from_row).ok();
        Ok(entry)
    }

    /// 지식 항목 목록 조회
    pub fn list_knowledge_entries(&self, limit: usize) -> Result<Vec<KnowledgeEntry>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, question, answer, created_at FROM knowledge_entries
             ORDER BY created_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], knowledge_from_row)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    // ------------------------------------------------------------------
    // Stats
    // ------------------------------------------------------------------

    /// 저장소 통계
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.lock()?;

        let document_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
            .unwrap_or(0);

        let indexed_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM documents WHERE pinecone_indexed = 1",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        let knowledge_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM knowledge_entries", [], |row| {
                row.get(0)
            })
            .unwrap_or(0);

        let total_size: i64 = conn
            .query_row(
                "SELECT COALESCE(SUM(LENGTH(content)), 0) FROM documents",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        Ok(StoreStats {
            document_count: document_count as usize,
            indexed_count: indexed_count as usize,
            knowledge_count: knowledge_count as usize,
            total_content_bytes: total_size as usize,
            db_path: self.db_path.clone(),
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// documents 행 매핑
fn document_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
    let embedding: Option<String> = row.get(5)?;

    Ok(Document {
        id: row.get(0)?,
        title: row.get(1)?,
        doc_type: row.get(2)?,
        content: row.get(3)?,
        pinecone_indexed: row.get::<_, i64>(4)? != 0,
        // 손상된 임베딩 컬럼은 없음으로 취급 (재인덱싱 후보가 됨)
        embedding: embedding.and_then(|e| serde_json::from_str(&e).ok()),
        created_at: parse_datetime(row.get::<_, String>(6)?),
        updated_at: parse_datetime(row.get::<_, String>(7)?),
    })
}

/// knowledge_entries 행 매핑
fn knowledge_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<KnowledgeEntry> {
    Ok(KnowledgeEntry {
        id: row.get(0)?,
        question: row.get(1)?,
        answer: row.get(2)?,
        created_at: parse_datetime(row.get::<_, String>(3)?),
    })
}

/// RFC3339 문자열을 DateTime<Utc>로 파싱
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, DocumentStore) {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("test.db");
        let store = DocumentStore::open(&db_path).unwrap();
        (dir, store)
    }

    fn new_doc(title: &str, content: &str) -> NewDocument {
        NewDocument {
            title: title.to_string(),
            doc_type: None,
            content: content.to_string(),
        }
    }

    #[test]
    fn test_add_and_get_document() {
        let (_dir, store) = create_test_store();

        let id = store
            .add_document(NewDocument {
                title: "연금 가이드".to_string(),
                doc_type: Some("guide".to_string()),
                content: "연금 저축의 기본".to_string(),
            })
            .unwrap();

        let doc = store.get_document(&id).unwrap().unwrap();
        assert_eq!(doc.title, "연금 가이드");
        assert_eq!(doc.doc_type, Some("guide".to_string()));
        // 새 문서는 비인덱싱 상태로 시작
        assert!(!doc.pinecone_indexed);
        assert!(doc.embedding.is_none());
    }

    #[test]
    fn test_get_missing_document() {
        let (_dir, store) = create_test_store();
        assert!(store.get_document("no-such-id").unwrap().is_none());
    }

    #[test]
    fn test_list_documents_with_type_filter() {
        let (_dir, store) = create_test_store();

        for i in 0..5 {
            store
                .add_document(NewDocument {
                    title: format!("Doc {}", i),
                    doc_type: if i % 2 == 0 {
                        Some("guide".to_string())
                    } else {
                        None
                    },
                    content: format!("Content {}", i),
                })
                .unwrap();
        }

        let all = store.list_documents(10, None).unwrap();
        assert_eq!(all.len(), 5);

        let guides = store.list_documents(10, Some("guide")).unwrap();
        assert_eq!(guides.len(), 3); // 0, 2, 4
    }

    #[test]
    fn test_mark_indexed_persists_flag_and_embedding() {
        let (_dir, store) = create_test_store();

        let id = store.add_document(new_doc("t", "content")).unwrap();
        store.mark_indexed(&id, &[0.1, 0.2, 0.3]).unwrap();

        let doc = store.get_document(&id).unwrap().unwrap();
        assert!(doc.pinecone_indexed);
        assert_eq!(doc.embedding, Some(vec![0.1, 0.2, 0.3]));
    }

    #[test]
    fn test_mark_indexed_missing_document_fails() {
        let (_dir, store) = create_test_store();
        let result = store.mark_indexed("ghost", &[0.1]);
        assert!(matches!(result, Err(RagError::InvalidInput(_))));
    }

    #[test]
    fn test_update_content_resets_index_state() {
        let (_dir, store) = create_test_store();

        let id = store.add_document(new_doc("t", "old content")).unwrap();
        store.mark_indexed(&id, &[0.5]).unwrap();

        let updated = store.update_content(&id, "new content").unwrap();
        assert!(updated);

        let doc = store.get_document(&id).unwrap().unwrap();
        assert_eq!(doc.content, "new content");
        // 내용이 바뀌면 인덱스 상태가 초기화되어 재인덱싱 후보가 됨
        assert!(!doc.pinecone_indexed);
        assert!(doc.embedding.is_none());
    }

    #[test]
    fn test_set_indexed_flag_only() {
        let (_dir, store) = create_test_store();

        let id = store.add_document(new_doc("t", "content")).unwrap();
        assert!(store.set_indexed_flag(&id, true).unwrap());

        let doc = store.get_document(&id).unwrap().unwrap();
        assert!(doc.pinecone_indexed);
        // 임베딩은 건드리지 않음
        assert!(doc.embedding.is_none());
    }

    #[test]
    fn test_delete_document() {
        let (_dir, store) = create_test_store();

        let id = store.add_document(new_doc("t", "content")).unwrap();
        assert!(store.delete_document(&id).unwrap());
        assert!(store.get_document(&id).unwrap().is_none());
        assert!(!store.delete_document(&id).unwrap());
    }

    #[test]
    fn test_knowledge_entries() {
        let (_dir, store) = create_test_store();

        let id = store
            .add_knowledge_entry("복리란 무엇인가요?", "이자에 이자가 붙는 구조입니다.")
            .unwrap();

        let entry = store.get_knowledge_entry(&id).unwrap().unwrap();
        assert_eq!(entry.question, "복리란 무엇인가요?");

        let list = store.list_knowledge_entries(10).unwrap();
        assert_eq!(list.len(), 1);

        assert!(store.get_knowledge_entry("ghost").unwrap().is_none());
    }

    #[test]
    fn test_stats() {
        let (_dir, store) = create_test_store();

        let id = store.add_document(new_doc("t", "1234567890")).unwrap();
        store.add_document(new_doc("u", "12345")).unwrap();
        store.add_knowledge_entry("q", "a").unwrap();
        store.mark_indexed(&id, &[0.1]).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.document_count, 2);
        assert_eq!(stats.indexed_count, 1);
        assert_eq!(stats.knowledge_count, 1);
        assert_eq!(stats.total_content_bytes, 15);
    }

    #[test]
    fn test_all_documents_for_report() {
        let (_dir, store) = create_test_store();

        for i in 0..3 {
            store.add_document(new_doc(&format!("d{}", i), "c")).unwrap();
        }

        let all = store.all_documents().unwrap();
        assert_eq!(all.len(), 3);
    }
}
