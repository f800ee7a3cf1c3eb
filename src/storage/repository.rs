use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::domain::{Units, User, UserId};

use super::{StoreError, UserStore, MIGRATION_001_USERS};

const USER_COLUMNS: &str = "id, name, credential_digest, solid_balance, stock_balance, is_blocked, last_farming_at, created_at, version";

/// SQLite-backed user store. Updates are optimistic on the `version` column.
pub struct SqliteUserStore {
    pool: SqlitePool,
}

impl SqliteUserStore {
    /// Create a new store with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_USERS)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let store = Self::connect(database_url).await?;
        store.migrate().await?;
        Ok(store)
    }

    async fn fetch_one_where(&self, clause: &str, key: Key<'_>) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE {} = ?", USER_COLUMNS, clause);
        let query = sqlx::query(&sql);
        let query = match key {
            Key::Id(id) => query.bind(id),
            Key::Name(name) => query.bind(name),
        };

        let row = query
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user")?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
        let last_farming_at: String = row.get("last_farming_at");
        let created_at: String = row.get("created_at");

        Ok(User {
            id: row.get("id"),
            name: row.get("name"),
            credential_digest: row.get("credential_digest"),
            solid_balance: from_column(row.get("solid_balance"), "solid_balance")?,
            stock_balance: from_column(row.get("stock_balance"), "stock_balance")?,
            is_blocked: row.get::<i32, _>("is_blocked") != 0,
            last_farming_at: parse_timestamp(&last_farming_at)
                .context("Invalid last_farming_at timestamp")?,
            created_at: parse_timestamp(&created_at).context("Invalid created_at timestamp")?,
            version: from_column(row.get("version"), "version")?,
        })
    }
}

enum Key<'a> {
    Id(UserId),
    Name(&'a str),
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

fn from_column(value: i64, column: &str) -> Result<Units> {
    Units::try_from(value).with_context(|| format!("Negative value in column {}", column))
}

fn to_column(value: Units, column: &str) -> Result<i64> {
    i64::try_from(value).with_context(|| format!("Value for {} exceeds storage range", column))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn get_by_id(&self, id: UserId) -> Result<User, StoreError> {
        self.fetch_one_where("id", Key::Id(id))
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn get_by_name(&self, name: &str) -> Result<User, StoreError> {
        self.fetch_one_where("name", Key::Name(name))
            .await?
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn create(&self, user: &User) -> Result<User, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO users (name, credential_digest, solid_balance, stock_balance, is_blocked, last_farming_at, created_at, version)
            VALUES (?, ?, ?, ?, ?, ?, ?, 0)
            RETURNING id
            "#,
        )
        .bind(&user.name)
        .bind(&user.credential_digest)
        .bind(to_column(user.solid_balance, "solid_balance")?)
        .bind(to_column(user.stock_balance, "stock_balance")?)
        .bind(user.is_blocked)
        .bind(user.last_farming_at.to_rfc3339())
        .bind(user.created_at.to_rfc3339())
        .fetch_one(&self.pool)
        .await;

        match row {
            Ok(row) => Ok(User {
                id: row.get("id"),
                version: 0,
                ..user.clone()
            }),
            Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateName(user.name.clone())),
            Err(e) => Err(StoreError::Storage(
                anyhow::Error::new(e).context("Failed to create user"),
            )),
        }
    }

    async fn compare_and_update(
        &self,
        id: UserId,
        expected_version: u64,
        new_state: &User,
    ) -> Result<User, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET name = ?, credential_digest = ?, solid_balance = ?, stock_balance = ?,
                is_blocked = ?, last_farming_at = ?, version = version + 1
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(&new_state.name)
        .bind(&new_state.credential_digest)
        .bind(to_column(new_state.solid_balance, "solid_balance")?)
        .bind(to_column(new_state.stock_balance, "stock_balance")?)
        .bind(new_state.is_blocked)
        .bind(new_state.last_farming_at.to_rfc3339())
        .bind(id)
        .bind(to_column(expected_version, "version")?)
        .execute(&self.pool)
        .await;

        let result = match result {
            Ok(result) => result,
            Err(e) if is_unique_violation(&e) => {
                return Err(StoreError::DuplicateName(new_state.name.clone()));
            }
            Err(e) => {
                return Err(StoreError::Storage(
                    anyhow::Error::new(e).context("Failed to update user"),
                ));
            }
        };

        if result.rows_affected() == 0 {
            // Either the row is gone or someone else committed first.
            self.get_by_id(id).await?;
            return Err(StoreError::VersionConflict {
                id,
                expected: expected_version,
            });
        }

        Ok(User {
            id,
            version: expected_version + 1,
            ..new_state.clone()
        })
    }
}
