use crate::error::DbError;
use crate::models::AnalysisResultRow;
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, warn};
use vyve_core::{AdjustmentRecord, AnalysisResult, AnalysisStatus};

/// Content longer than this many characters is stored out of line in chunks.
pub const CHUNK_SIZE: usize = 1_000_000;

const ADJUSTMENT_WRITE_ATTEMPTS: usize = 3;

/// Result store. Every write is a compare-and-swap on the row's `version`.
#[derive(Clone)]
pub struct AnalysisResultRepository {
    pool: SqlitePool,
    chunk_size: usize,
}

impl AnalysisResultRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            chunk_size: CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub async fn find_by_phase(&self, phase_number: i64) -> Result<Option<AnalysisResult>, DbError> {
        let row: Option<AnalysisResultRow> = sqlx::query_as(
            r#"
            SELECT id, phase_number, sub_phase, content, metadata, status, version, created_at, updated_at
            FROM analysis_results
            WHERE phase_number = ?
            "#,
        )
        .bind(phase_number)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    pub async fn list(&self) -> Result<Vec<AnalysisResult>, DbError> {
        let rows: Vec<AnalysisResultRow> = sqlx::query_as(
            r#"
            SELECT id, phase_number, sub_phase, content, metadata, status, version, created_at, updated_at
            FROM analysis_results
            ORDER BY phase_number
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            results.push(self.hydrate(row).await?);
        }
        Ok(results)
    }

    /// Status of every stored phase without loading content.
    pub async fn statuses(&self) -> Result<Vec<(i64, AnalysisStatus)>, DbError> {
        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT phase_number, status FROM analysis_results ORDER BY phase_number")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|(phase_number, status)| match AnalysisStatus::parse(&status) {
                Some(parsed) => Ok((phase_number, parsed)),
                None => Err(DbError::InvalidStatus {
                    phase_number,
                    status,
                }),
            })
            .collect()
    }

    async fn hydrate(&self, row: AnalysisResultRow) -> Result<AnalysisResult, DbError> {
        let mut result = row.into_domain()?;
        if result.metadata.chunks.is_some() {
            let parts: Vec<String> = sqlx::query_scalar(
                "SELECT content FROM analysis_result_chunks WHERE phase_number = ? ORDER BY chunk_index",
            )
            .bind(result.phase_number)
            .fetch_all(&self.pool)
            .await?;
            result.content = parts.concat();
        }
        Ok(result)
    }

    /// Writes `result` if the stored row still carries `expected_version`.
    ///
    /// `None` means the row must not exist yet. Returns the result as stored,
    /// carrying its new version.
    pub async fn save_progress(
        &self,
        result: &AnalysisResult,
        expected_version: Option<i64>,
    ) -> Result<AnalysisResult, DbError> {
        let (mut stored, row, chunks) = self.prepare(result)?;
        let mut tx = self.pool.begin().await?;

        let version = match expected_version {
            None => {
                insert_row(&mut tx, &row, 1).await.map_err(|err| match err {
                    DbError::Duplicate(_) => DbError::VersionConflict {
                        phase_number: row.phase_number,
                        expected: None,
                    },
                    other => other,
                })?;
                1
            }
            Some(expected) => {
                let updated = sqlx::query(
                    r#"
                    UPDATE analysis_results
                    SET sub_phase = ?, content = ?, metadata = ?, status = ?, version = version + 1, updated_at = ?
                    WHERE phase_number = ? AND version = ?
                    "#,
                )
                .bind(row.sub_phase)
                .bind(&row.content)
                .bind(&row.metadata)
                .bind(&row.status)
                .bind(row.updated_at)
                .bind(row.phase_number)
                .bind(expected)
                .execute(&mut *tx)
                .await?;

                if updated.rows_affected() == 0 {
                    return Err(DbError::VersionConflict {
                        phase_number: row.phase_number,
                        expected: Some(expected),
                    });
                }
                expected + 1
            }
        };

        write_chunks(&mut tx, row.phase_number, &chunks).await?;
        tx.commit().await?;

        debug!(phase = row.phase_number, version, status = %row.status, "Saved analysis result");
        stored.version = version;
        Ok(stored)
    }

    /// Final write of a run. Falls back to delete and reinsert when the
    /// in-place update fails for a reason other than a version conflict.
    pub async fn save_final(
        &self,
        result: &AnalysisResult,
        expected_version: Option<i64>,
    ) -> Result<AnalysisResult, DbError> {
        match self.save_progress(result, expected_version).await {
            Err(DbError::Sqlx(err)) => {
                warn!(
                    phase = result.phase_number,
                    error = %err,
                    "Result update failed, replacing row"
                );
                self.replace(result, expected_version).await
            }
            other => other,
        }
    }

    async fn replace(
        &self,
        result: &AnalysisResult,
        expected_version: Option<i64>,
    ) -> Result<AnalysisResult, DbError> {
        let (mut stored, row, chunks) = self.prepare(result)?;
        let mut tx = self.pool.begin().await?;

        if let Some(expected) = expected_version {
            let deleted =
                sqlx::query("DELETE FROM analysis_results WHERE phase_number = ? AND version = ?")
                    .bind(row.phase_number)
                    .bind(expected)
                    .execute(&mut *tx)
                    .await?;
            if deleted.rows_affected() == 0 {
                return Err(DbError::VersionConflict {
                    phase_number: row.phase_number,
                    expected: Some(expected),
                });
            }
        }

        let version = expected_version.unwrap_or(0) + 1;
        insert_row(&mut tx, &row, version).await?;
        write_chunks(&mut tx, row.phase_number, &chunks).await?;
        tx.commit().await?;

        stored.version = version;
        Ok(stored)
    }

    /// Records a user adjustment on the stored row, retrying on concurrent writes.
    pub async fn append_adjustment(
        &self,
        phase_number: i64,
        record: AdjustmentRecord,
    ) -> Result<Option<AnalysisResult>, DbError> {
        for _ in 0..ADJUSTMENT_WRITE_ATTEMPTS {
            let Some(mut result) = self.find_by_phase(phase_number).await? else {
                return Ok(None);
            };
            let expected = result.version;
            result.metadata.adjustments.push(record.clone());

            match self.save_progress(&result, Some(expected)).await {
                Ok(saved) => return Ok(Some(saved)),
                Err(DbError::VersionConflict { .. }) => continue,
                Err(err) => return Err(err),
            }
        }

        Err(DbError::VersionConflict {
            phase_number,
            expected: None,
        })
    }

    pub async fn delete(&self, phase_number: i64) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM analysis_results WHERE phase_number = ?")
            .bind(phase_number)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Removes every stored result. Returns the number of phases cleared.
    pub async fn clear(&self) -> Result<u64, DbError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM analysis_result_chunks")
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM analysis_results")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(result.rows_affected())
    }

    fn prepare(
        &self,
        result: &AnalysisResult,
    ) -> Result<(AnalysisResult, AnalysisResultRow, Vec<String>), DbError> {
        let mut stored = result.clone();
        stored.updated_at = Utc::now();

        let chunks = if stored.content.chars().count() > self.chunk_size {
            split_chunks(&stored.content, self.chunk_size)
        } else {
            Vec::new()
        };
        stored.metadata.chunks = (!chunks.is_empty()).then_some(chunks.len());

        let mut row = AnalysisResultRow::try_from_domain(&stored)?;
        if !chunks.is_empty() {
            row.content = String::new();
        }
        Ok((stored, row, chunks))
    }
}

async fn insert_row(
    conn: &mut SqliteConnection,
    row: &AnalysisResultRow,
    version: i64,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO analysis_results (id, phase_number, sub_phase, content, metadata, status, version, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&row.id)
    .bind(row.phase_number)
    .bind(row.sub_phase)
    .bind(&row.content)
    .bind(&row.metadata)
    .bind(&row.status)
    .bind(version)
    .bind(row.created_at)
    .bind(row.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|err| DbError::from_insert(err, format!("analysis result for phase {}", row.phase_number)))?;

    Ok(())
}

async fn write_chunks(
    conn: &mut SqliteConnection,
    phase_number: i64,
    chunks: &[String],
) -> Result<(), DbError> {
    sqlx::query("DELETE FROM analysis_result_chunks WHERE phase_number = ?")
        .bind(phase_number)
        .execute(&mut *conn)
        .await?;

    for (index, chunk) in chunks.iter().enumerate() {
        sqlx::query(
            "INSERT INTO analysis_result_chunks (phase_number, chunk_index, content) VALUES (?, ?, ?)",
        )
        .bind(phase_number)
        .bind(index as i64)
        .bind(chunk)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

fn split_chunks(content: &str, chunk_size: usize) -> Vec<String> {
    let chars: Vec<char> = content.chars().collect();
    chars
        .chunks(chunk_size)
        .map(|chunk| chunk.iter().collect())
        .collect()
}
