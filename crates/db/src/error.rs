use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Analysis result for phase {phase_number} changed concurrently (expected version {expected:?})")]
    VersionConflict {
        phase_number: i64,
        expected: Option<i64>,
    },

    #[error("Analysis result for phase {phase_number} has unknown status '{status}'")]
    InvalidStatus { phase_number: i64, status: String },

    #[error("Phase prompt not found: phase {phase_number}, sub-phase {sub_phase}")]
    PromptNotFound { phase_number: i64, sub_phase: i64 },

    #[error("Document not found: {0}")]
    DocumentNotFound(Uuid),

    #[error("Already exists: {0}")]
    Duplicate(String),
}

impl DbError {
    /// Maps unique-constraint failures to [`DbError::Duplicate`].
    pub(crate) fn from_insert(err: sqlx::Error, what: impl Into<String>) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DbError::Duplicate(what.into())
            }
            _ => DbError::Sqlx(err),
        }
    }
}
