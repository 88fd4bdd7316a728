use crate::error::DbError;
use crate::models::DocumentRow;
use sqlx::SqlitePool;
use uuid::Uuid;
use vyve_core::Document;

const DOCUMENT_COLUMNS: &str = "id, company_id, filename, content_type, file_path, size, url, is_website, should_process, is_latest, content, created_at";

#[derive(Clone)]
pub struct DocumentRepository {
    pool: SqlitePool,
}

impl DocumentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, doc: &Document) -> Result<Document, DbError> {
        let row = DocumentRow::from(doc);

        sqlx::query(
            r#"
            INSERT INTO documents (id, company_id, filename, content_type, file_path, size, url, is_website, should_process, is_latest, content, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.company_id)
        .bind(&row.filename)
        .bind(&row.content_type)
        .bind(&row.file_path)
        .bind(row.size)
        .bind(&row.url)
        .bind(row.is_website)
        .bind(row.should_process)
        .bind(row.is_latest)
        .bind(&row.content)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;

        Ok(doc.clone())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Document>, DbError> {
        let row: Option<DocumentRow> =
            sqlx::query_as(&format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|r| r.into_domain()))
    }

    /// Newest document scraped from `url`.
    pub async fn find_latest_by_url(&self, url: &str) -> Result<Option<Document>, DbError> {
        let row: Option<DocumentRow> = sqlx::query_as(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE url = ? ORDER BY created_at DESC, rowid DESC LIMIT 1"
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_domain()))
    }

    pub async fn list(&self, company_id: Option<Uuid>) -> Result<Vec<Document>, DbError> {
        let rows: Vec<DocumentRow> = match company_id {
            Some(company_id) => {
                sqlx::query_as(&format!(
                    "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE company_id = ? ORDER BY created_at DESC, rowid DESC"
                ))
                .bind(company_id.to_string())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY created_at DESC, rowid DESC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }

    /// Flips `should_process` and returns the new value.
    pub async fn toggle_should_process(&self, id: Uuid) -> Result<bool, DbError> {
        let value: Option<bool> = sqlx::query_scalar(
            "UPDATE documents SET should_process = NOT should_process WHERE id = ? RETURNING should_process",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        value.ok_or(DbError::DocumentNotFound(id))
    }

    /// Marks only the newest scrape of each website URL as latest.
    pub async fn refresh_latest_website_content(&self) -> Result<u64, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET is_latest = CASE
                WHEN id = (
                    SELECT newest.id FROM documents AS newest
                    WHERE newest.url = documents.url AND newest.is_website = 1
                    ORDER BY newest.created_at DESC, newest.rowid DESC
                    LIMIT 1
                ) THEN 1
                ELSE 0
            END
            WHERE is_website = 1 AND url IS NOT NULL
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn assign_company(&self, id: Uuid, company_id: Uuid) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE documents SET company_id = ? WHERE id = ?")
            .bind(company_id.to_string())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::DocumentNotFound(id));
        }
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
