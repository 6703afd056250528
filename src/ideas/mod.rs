//! Idea persistence behind a narrow CRUD interface.
//!
//! Ideas are stored as submitted; scoring and tagging happen elsewhere.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

/// A stored idea.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Idea {
    pub id: i64,
    pub content: String,
    pub created_at: String,
}

/// Body of `POST /api/v1/ideas`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewIdea {
    pub content: String,
}

pub const MAX_CONTENT_CHARS: usize = 10_000;

impl NewIdea {
    /// Trimmed content, or a reason the submission is unacceptable.
    pub fn validated(&self) -> Result<&str, &'static str> {
        let content = self.content.trim();
        if content.is_empty() {
            return Err("content must not be empty");
        }
        if content.chars().count() > MAX_CONTENT_CHARS {
            return Err("content is too long");
        }
        Ok(content)
    }
}

#[async_trait]
pub trait IdeaRepository: Send + Sync + 'static {
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Idea>, sqlx::Error>;

    async fn get(&self, id: i64) -> Result<Option<Idea>, sqlx::Error>;

    async fn create(&self, content: &str) -> Result<Idea, sqlx::Error>;

    /// Returns whether a row was removed.
    async fn delete(&self, id: i64) -> Result<bool, sqlx::Error>;
}

/// [`IdeaRepository`] on the shared SQLite pool.
pub struct SqliteIdeaRepository {
    pool: SqlitePool,
}

impl SqliteIdeaRepository {
    pub async fn new(pool: SqlitePool) -> Result<Self, sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS ideas (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl IdeaRepository for SqliteIdeaRepository {
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Idea>, sqlx::Error> {
        sqlx::query_as("SELECT id, content, created_at FROM ideas ORDER BY id DESC LIMIT ?1 OFFSET ?2")
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
    }

    async fn get(&self, id: i64) -> Result<Option<Idea>, sqlx::Error> {
        sqlx::query_as("SELECT id, content, created_at FROM ideas WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn create(&self, content: &str) -> Result<Idea, sqlx::Error> {
        let created_at = now_ts(Utc::now());
        let result = sqlx::query("INSERT INTO ideas (content, created_at) VALUES (?1, ?2)")
            .bind(content)
            .bind(&created_at)
            .execute(&self.pool)
            .await?;

        Ok(Idea {
            id: result.last_insert_rowid(),
            content: content.to_string(),
            created_at,
        })
    }

    async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM ideas WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn now_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;

    #[tokio::test]
    async fn test_crud() {
        let repo = SqliteIdeaRepository::new(connect_in_memory().await.unwrap())
            .await
            .unwrap();

        let first = repo.create("compost bins for the office").await.unwrap();
        let second = repo.create("weekly reading group").await.unwrap();

        let listed = repo.list(10, 0).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);

        assert_eq!(repo.get(first.id).await.unwrap(), Some(first.clone()));
        assert!(repo.delete(first.id).await.unwrap());
        assert!(!repo.delete(first.id).await.unwrap());
        assert!(repo.get(first.id).await.unwrap().is_none());
    }

    #[test]
    fn test_validation() {
        assert_eq!(NewIdea { content: "  hi  ".into() }.validated(), Ok("hi"));
        assert!(NewIdea { content: "   ".into() }.validated().is_err());
        assert!(NewIdea { content: "x".repeat(MAX_CONTENT_CHARS + 1) }.validated().is_err());
    }
}
