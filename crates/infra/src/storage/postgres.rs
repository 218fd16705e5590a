//! Postgres-backed storage implementation.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `AlreadyExists` |
//! | RowNotFound | N/A | `NotFound` |
//! | Other | Any other | `Backend` |
//!
//! Updates and deletes that affect zero rows also map to `NotFound`.
//!
//! ## Thread Safety
//!
//! `PgStore` is `Send + Sync`; all operations go through the SQLx pool.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgPoolOptions};
use sqlx::{Arguments, FromRow, PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use companyhub_auth::{IdentityStore, Probe, ProbeError, User, Value};
use companyhub_core::{Company, CompanyFilters, CompanyId, CompanyKind};

use super::{CompanyStore, StoreError, UserStore};

const PING_RETRY: Duration = Duration::from_secs(2);

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect, retrying every two seconds until the database answers.
    pub async fn connect(dsn: &str, max_connections: u32) -> Result<Self, StoreError> {
        tracing::info!("storage: connecting to PostgreSQL database");
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_lazy(dsn)
            .map_err(|e| map_sqlx_error("connect", e))?;

        loop {
            match sqlx::query("SELECT 1").execute(&pool).await {
                Ok(_) => break,
                Err(err) => {
                    tracing::warn!(error = %err, "storage: ping PostgreSQL database error, will retry in 2s");
                    tokio::time::sleep(PING_RETRY).await;
                }
            }
        }

        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        tracing::info!("storage: applying PostgreSQL migrations");
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("migrate: {e}")))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::AlreadyExists(
                    db_err.constraint().unwrap_or("unique constraint").to_string(),
                ),
                _ => StoreError::Backend(msg),
            }
        }
        other => StoreError::Backend(format!("sqlx error in {}: {}", operation, other)),
    }
}

// SQLx row types

#[derive(Debug)]
struct CompanyRow {
    id: Uuid,
    name: String,
    description: String,
    employees_count: i32,
    registered: bool,
    kind: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, sqlx::postgres::PgRow> for CompanyRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(CompanyRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            employees_count: row.try_get("employees_count")?,
            registered: row.try_get("registered")?,
            kind: row.try_get("kind")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<CompanyRow> for Company {
    type Error = StoreError;

    fn try_from(row: CompanyRow) -> Result<Self, Self::Error> {
        Ok(Company {
            id: CompanyId::from_uuid(row.id),
            name: row.name,
            description: row.description,
            employees_count: u32::try_from(row.employees_count)
                .map_err(|_| StoreError::Backend("negative employees_count".into()))?,
            registered: row.registered,
            kind: CompanyKind::parse(&row.kind).map_err(|e| StoreError::Backend(e.to_string()))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    username: String,
    password_hash: String,
    is_admin: bool,
    session_ttl: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            username: row.username,
            password_hash: row.password_hash,
            is_admin: row.is_admin,
            session_ttl_hours: row.session_ttl,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn employees(company: &Company) -> Result<i32, StoreError> {
    i32::try_from(company.employees_count)
        .map_err(|_| StoreError::Backend("employees_count out of range".into()))
}

#[async_trait]
impl CompanyStore for PgStore {
    #[instrument(skip(self, company), fields(company_id = %company.id), err)]
    async fn create_company(&self, company: &Company) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO company (
                id,
                name,
                description,
                employees_count,
                registered,
                kind,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(company.id.as_uuid())
        .bind(&company.name)
        .bind(&company.description)
        .bind(employees(company)?)
        .bind(company.registered)
        .bind(company.kind.as_str())
        .bind(company.created_at)
        .bind(company.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_company", e))?;

        tracing::info!(name = %company.name, "company created");
        Ok(())
    }

    #[instrument(skip(self), fields(company_id = %id), err)]
    async fn get_company(&self, id: CompanyId) -> Result<Company, StoreError> {
        let row = sqlx::query("SELECT * FROM company WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_company", e))?;
        let row = CompanyRow::from_row(&row).map_err(|e| map_sqlx_error("get_company", e))?;
        row.try_into()
    }

    #[instrument(skip(self, company), fields(company_id = %company.id), err)]
    async fn update_company(&self, company: &Company) -> Result<(), StoreError> {
        let res = sqlx::query(
            r#"
            UPDATE company
            SET
                updated_at = now(),
                name = $2,
                description = $3,
                employees_count = $4,
                registered = $5,
                kind = $6
            WHERE
                id = $1
            "#,
        )
        .bind(company.id.as_uuid())
        .bind(&company.name)
        .bind(&company.description)
        .bind(employees(company)?)
        .bind(company.registered)
        .bind(company.kind.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_company", e))?;

        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        tracing::info!(name = %company.name, "company updated");
        Ok(())
    }

    #[instrument(skip(self), fields(company_id = %id), err)]
    async fn delete_company(&self, id: CompanyId) -> Result<(), StoreError> {
        let res = sqlx::query("DELETE FROM company WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_company", e))?;

        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        tracing::info!("company deleted");
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn list_companies(&self, filters: &CompanyFilters) -> Result<Vec<Company>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT *
            FROM company c
            WHERE ($1::text IS NULL OR c.name = $1)
              AND ($2::text IS NULL OR c.kind = $2)
              AND ($3::boolean IS NULL OR c.registered = $3)
            ORDER BY c.name
            LIMIT $4
            OFFSET $5
            "#,
        )
        .bind(filters.name.as_deref())
        .bind(filters.kind.map(|k| k.as_str()))
        .bind(filters.registered)
        .bind(i64::from(filters.effective_limit()))
        .bind(i64::from(filters.offset))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_companies", e))?;

        rows.iter()
            .map(|row| {
                CompanyRow::from_row(row)
                    .map_err(|e| map_sqlx_error("list_companies", e))
                    .and_then(Company::try_from)
            })
            .collect()
    }
}

#[async_trait]
impl UserStore for PgStore {
    #[instrument(skip(self, password_hash), err)]
    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        is_admin: bool,
        session_ttl_hours: i32,
    ) -> Result<User, StoreError> {
        let row: UserRow = sqlx::query_as(
            r#"
            INSERT INTO "user" (username, password_hash, is_admin, session_ttl, created_at, updated_at)
            VALUES ($1, $2, $3, $4, now(), now())
            RETURNING *
            "#,
        )
        .bind(username)
        .bind(password_hash)
        .bind(is_admin)
        .bind(session_ttl_hours)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_user", e))?;
        Ok(row.into())
    }

    #[instrument(skip(self), err)]
    async fn get_user_by_username(&self, username: &str) -> Result<User, StoreError> {
        let row: UserRow = sqlx::query_as(r#"SELECT * FROM "user" WHERE username = $1"#)
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_user_by_username", e))?;
        Ok(row.into())
    }
}

fn probe_arguments(probe: &Probe<'_>) -> Result<PgArguments, ProbeError> {
    let mut args = PgArguments::default();
    for value in probe.args() {
        let added = match value {
            Value::Text(s) => args.add(s.clone()),
            Value::Int(i) => args.add(*i),
            Value::Bool(b) => args.add(*b),
        };
        added.map_err(|e| ProbeError::Backend(format!("bind argument: {e}")))?;
    }
    Ok(args)
}

#[async_trait]
impl IdentityStore for PgStore {
    #[instrument(skip(self, probe), fields(rule = probe.rule), err)]
    async fn probe(&self, probe: &Probe<'_>) -> Result<bool, ProbeError> {
        let args = probe_arguments(probe)?;
        let count: i64 = sqlx::query_scalar_with(probe.sql, args)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ProbeError::Backend(format!("validator select error: {e}")))?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use companyhub_auth::{active_user, verify_password, Claims, SubjectKind};

    #[test]
    fn probe_arguments_follow_placeholder_order() {
        let claims = Claims {
            sub: SubjectKind::User,
            id: 5,
            username: "admin".into(),
            iss: "as".into(),
            aud: "as".into(),
            nbf: 0,
            exp: 1,
        };
        let probe = active_user().bind(&claims).unwrap();
        let args = probe_arguments(&probe).unwrap();
        assert_eq!(sqlx::Arguments::len(&args), 2);
    }

    #[test]
    fn seeded_admin_password_is_changeme() {
        let sql = include_str!("../../migrations/20240101000001_default_admin.sql");
        let hash = sql
            .split('\'')
            .find(|s| s.starts_with("PBKDF2$"))
            .unwrap();
        assert_eq!(verify_password("changeme", hash), Ok(true));
    }

    #[test]
    fn unique_violation_maps_to_already_exists() {
        assert_eq!(
            map_sqlx_error("get", sqlx::Error::RowNotFound),
            StoreError::NotFound
        );
        assert!(matches!(
            map_sqlx_error("get", sqlx::Error::PoolClosed),
            StoreError::Backend(_)
        ));
    }
}
