use crate::error::DbError;
use crate::models::{PhasePromptRow, ReferenceDocumentRow};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;
use vyve_core::{PhasePrompt, ReferenceDocument};

#[derive(Clone)]
pub struct PhasePromptRepository {
    pool: SqlitePool,
}

impl PhasePromptRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts or replaces the prompt stored under `(phase_number, sub_phase)`.
    pub async fn upsert(&self, prompt: &PhasePrompt) -> Result<PhasePrompt, DbError> {
        let mut row = PhasePromptRow::from(prompt);
        row.updated_at = Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO phase_prompts (id, phase_number, sub_phase, phase_name, prompt_text, document_ids, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (phase_number, sub_phase) DO UPDATE SET
                phase_name = excluded.phase_name,
                prompt_text = excluded.prompt_text,
                document_ids = excluded.document_ids,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&row.id)
        .bind(row.phase_number)
        .bind(row.sub_phase)
        .bind(&row.phase_name)
        .bind(&row.prompt_text)
        .bind(&row.document_ids)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;

        self.find(prompt.phase_number, prompt.sub_phase)
            .await?
            .ok_or(DbError::PromptNotFound {
                phase_number: prompt.phase_number,
                sub_phase: prompt.sub_phase,
            })
    }

    pub async fn find(
        &self,
        phase_number: i64,
        sub_phase: i64,
    ) -> Result<Option<PhasePrompt>, DbError> {
        let row: Option<PhasePromptRow> = sqlx::query_as(
            r#"
            SELECT id, phase_number, sub_phase, phase_name, prompt_text, document_ids, created_at, updated_at
            FROM phase_prompts
            WHERE phase_number = ? AND sub_phase = ?
            "#,
        )
        .bind(phase_number)
        .bind(sub_phase)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_domain()))
    }

    pub async fn list(&self) -> Result<Vec<PhasePrompt>, DbError> {
        let rows: Vec<PhasePromptRow> = sqlx::query_as(
            r#"
            SELECT id, phase_number, sub_phase, phase_name, prompt_text, document_ids, created_at, updated_at
            FROM phase_prompts
            ORDER BY phase_number, sub_phase
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }

    pub async fn delete(&self, phase_number: i64, sub_phase: i64) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM phase_prompts WHERE phase_number = ? AND sub_phase = ?")
            .bind(phase_number)
            .bind(sub_phase)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Result of resolving a prompt's reference document ids.
#[derive(Debug, Clone, Default)]
pub struct DocumentLookup {
    /// Found documents, in the order they were requested
    pub found: Vec<ReferenceDocument>,
    pub missing: Vec<Uuid>,
}

#[derive(Clone)]
pub struct ReferenceDocumentRepository {
    pool: SqlitePool,
}

impl ReferenceDocumentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts a document, replacing the content of one with the same filename.
    pub async fn upsert(&self, doc: &ReferenceDocument) -> Result<ReferenceDocument, DbError> {
        let row = ReferenceDocumentRow::from(doc);

        sqlx::query(
            r#"
            INSERT INTO reference_documents (id, filename, content, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (filename) DO UPDATE SET content = excluded.content
            "#,
        )
        .bind(&row.id)
        .bind(&row.filename)
        .bind(&row.content)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;

        let stored = self.find_by_filenames(&[doc.filename.clone()]).await?;
        Ok(stored.into_iter().next().unwrap_or_else(|| doc.clone()))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<ReferenceDocument>, DbError> {
        let row: Option<ReferenceDocumentRow> = sqlx::query_as(
            "SELECT id, filename, content, created_at FROM reference_documents WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_domain()))
    }

    pub async fn find_by_ids(&self, ids: &[Uuid]) -> Result<DocumentLookup, DbError> {
        let mut lookup = DocumentLookup::default();
        for id in ids {
            match self.find_by_id(*id).await? {
                Some(doc) => lookup.found.push(doc),
                None => lookup.missing.push(*id),
            }
        }
        Ok(lookup)
    }

    pub async fn find_by_filenames(
        &self,
        filenames: &[String],
    ) -> Result<Vec<ReferenceDocument>, DbError> {
        let mut docs = Vec::with_capacity(filenames.len());
        for filename in filenames {
            let row: Option<ReferenceDocumentRow> = sqlx::query_as(
                "SELECT id, filename, content, created_at FROM reference_documents WHERE filename = ?",
            )
            .bind(filename)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(row) = row {
                docs.push(row.into_domain());
            }
        }
        Ok(docs)
    }

    pub async fn list(&self) -> Result<Vec<ReferenceDocument>, DbError> {
        let rows: Vec<ReferenceDocumentRow> = sqlx::query_as(
            "SELECT id, filename, content, created_at FROM reference_documents ORDER BY filename",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};

    async fn setup_test_db() -> SqlitePool {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_upsert_and_find_prompt() {
        let pool = setup_test_db().await;
        let repo = PhasePromptRepository::new(pool);

        let doc_id = Uuid::new_v4();
        let prompt = PhasePrompt::new(1, "Activities", "Identify activities")
            .with_documents(vec![doc_id]);
        repo.upsert(&prompt).await.unwrap();

        let found = repo.find(1, 0).await.unwrap().unwrap();
        assert_eq!(found.prompt_text, "Identify activities");
        assert_eq!(found.document_ids, vec![doc_id]);
        assert!(repo.find(1, 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_replaces_same_key() {
        let pool = setup_test_db().await;
        let repo = PhasePromptRepository::new(pool);

        let first = repo
            .upsert(&PhasePrompt::new(2, "Env", "v1"))
            .await
            .unwrap();
        repo.upsert(&PhasePrompt::new(2, "Env", "v2")).await.unwrap();

        let all = repo.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].prompt_text, "v2");
        assert_eq!(all[0].id, first.id);
    }

    #[tokio::test]
    async fn test_list_is_ordered() {
        let pool = setup_test_db().await;
        let repo = PhasePromptRepository::new(pool);

        repo.upsert(&PhasePrompt::new(3, "c", "c")).await.unwrap();
        repo.upsert(&PhasePrompt::new(0, "a", "a")).await.unwrap();
        repo.upsert(&PhasePrompt::new(0, "b", "b").with_sub_phase(1))
            .await
            .unwrap();

        let keys: Vec<_> = repo
            .list()
            .await
            .unwrap()
            .iter()
            .map(|p| (p.phase_number, p.sub_phase))
            .collect();
        assert_eq!(keys, vec![(0, 0), (0, 1), (3, 0)]);
    }

    #[tokio::test]
    async fn test_delete_prompt() {
        let pool = setup_test_db().await;
        let repo = PhasePromptRepository::new(pool);

        repo.upsert(&PhasePrompt::new(4, "Gov", "x")).await.unwrap();
        assert!(repo.delete(4, 0).await.unwrap());
        assert!(!repo.delete(4, 0).await.unwrap());
    }

    #[tokio::test]
    async fn test_reference_lookup_reports_missing() {
        let pool = setup_test_db().await;
        let repo = ReferenceDocumentRepository::new(pool);

        let a = repo
            .upsert(&ReferenceDocument::new("a.md", "alpha"))
            .await
            .unwrap();
        let b = repo
            .upsert(&ReferenceDocument::new("b.md", "beta"))
            .await
            .unwrap();
        let missing = Uuid::new_v4();

        let lookup = repo.find_by_ids(&[b.id, missing, a.id]).await.unwrap();
        let names: Vec<_> = lookup.found.iter().map(|d| d.filename.as_str()).collect();
        assert_eq!(names, vec!["b.md", "a.md"]);
        assert_eq!(lookup.missing, vec![missing]);
    }

    #[tokio::test]
    async fn test_reference_upsert_by_filename() {
        let pool = setup_test_db().await;
        let repo = ReferenceDocumentRepository::new(pool);

        let first = repo
            .upsert(&ReferenceDocument::new("gri.md", "old"))
            .await
            .unwrap();
        let second = repo
            .upsert(&ReferenceDocument::new("gri.md", "new"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.content, "new");
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }
}
