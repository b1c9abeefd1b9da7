use super::{map_unique_violation, RepositoryResult};
use crate::models::user::User;
use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait UserRepository: Send + Sync {
    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<User>>;
    /// Insert or update by email. The disabled flag is never cleared by a save.
    async fn save(&self, user: &User) -> RepositoryResult<User>;
    /// Insert only; fails with `AlreadyExists` when the email is taken.
    async fn create(&self, user: &User) -> RepositoryResult<User>;
    async fn list_by_emails(&self, emails: &[String]) -> RepositoryResult<Vec<User>>;
}

pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str = "id, email, role, disabled, created_at, last_login";

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ?"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn save(&self, user: &User) -> RepositoryResult<User> {
        let saved = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, role, disabled, created_at, last_login)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(email) DO UPDATE SET
                role = excluded.role,
                disabled = (users.disabled OR excluded.disabled),
                last_login = excluded.last_login
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.email)
        .bind(user.role)
        .bind(user.disabled)
        .bind(user.created_at)
        .bind(user.last_login)
        .fetch_one(&self.pool)
        .await?;

        Ok(saved)
    }

    async fn create(&self, user: &User) -> RepositoryResult<User> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, role, disabled, created_at, last_login)
            VALUES (?, ?, ?, ?, ?)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.email)
        .bind(user.role)
        .bind(user.disabled)
        .bind(user.created_at)
        .bind(user.last_login)
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique_violation)
    }

    async fn list_by_emails(&self, emails: &[String]) -> RepositoryResult<Vec<User>> {
        if emails.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users WHERE email IN ("));
        let mut separated = builder.separated(", ");
        for email in emails {
            separated.push_bind(email);
        }
        separated.push_unseparated(")");

        let users = builder
            .build_query_as::<User>()
            .fetch_all(&self.pool)
            .await?;

        Ok(users)
    }
}
