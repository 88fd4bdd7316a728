use crate::error::DbError;
use crate::models::CompanyRow;
use sqlx::SqlitePool;
use tracing::info;
use vyve_core::Company;

#[derive(Clone)]
pub struct CompanyRepository {
    pool: SqlitePool,
}

impl CompanyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, company: &Company) -> Result<Company, DbError> {
        let row = CompanyRow::from(company);

        sqlx::query("INSERT INTO companies (id, name, created_at) VALUES (?, ?, ?)")
            .bind(&row.id)
            .bind(&row.name)
            .bind(row.created_at)
            .execute(&self.pool)
            .await
            .map_err(|err| DbError::from_insert(err, format!("company '{}'", company.name)))?;

        Ok(company.clone())
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Company>, DbError> {
        let row: Option<CompanyRow> =
            sqlx::query_as("SELECT id, name, created_at FROM companies WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|r| r.into_domain()))
    }

    pub async fn find_or_create(&self, name: &str) -> Result<Company, DbError> {
        if let Some(company) = self.find_by_name(name).await? {
            return Ok(company);
        }

        match self.create(&Company::new(name)).await {
            Ok(company) => {
                info!(company = %company.name, "Created company");
                Ok(company)
            }
            // Lost a race with another upload for the same company
            Err(DbError::Duplicate(_)) => self
                .find_by_name(name)
                .await?
                .ok_or_else(|| DbError::Duplicate(name.to_string())),
            Err(err) => Err(err),
        }
    }

    pub async fn list(&self) -> Result<Vec<Company>, DbError> {
        let rows: Vec<CompanyRow> =
            sqlx::query_as("SELECT id, name, created_at FROM companies ORDER BY name")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }
}
