//! Comment storage.

use crate::db::{Database, StoreError};
use crate::pagination::PageRequest;
use crate::validation::{sanitize, FieldError, Rule, Validator};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const COMMENT_SORTS: &[&str] = &["id", "created_at"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    pub content: String,
    pub user_id: u64,
    pub post_id: u64,
    pub created_at: String,
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get::<_, i64>(0)? as u64,
        content: row.get(1)?,
        user_id: row.get::<_, i64>(2)? as u64,
        post_id: row.get::<_, i64>(3)? as u64,
        created_at: row.get(4)?,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewComment {
    pub content: String,
}

impl NewComment {
    pub fn validate(&mut self) -> Result<(), Vec<FieldError>> {
        self.content = sanitize(&self.content);
        let mut v = Validator::new();
        v.check("content", &self.content, &[Rule::Required, Rule::MaxLen(1000)]);
        v.finish()
    }
}

#[derive(Clone)]
pub struct CommentStore {
    db: Database,
}

impl CommentStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// `NotFound` when the post does not exist.
    pub async fn create(
        &self,
        post_id: u64,
        user_id: u64,
        comment: &NewComment,
    ) -> Result<Comment, StoreError> {
        let id = {
            let conn = self.db.conn().await;
            conn.execute(
                "INSERT INTO comments (content, user_id, post_id, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    comment.content,
                    user_id as i64,
                    post_id as i64,
                    Utc::now().to_rfc3339()
                ],
            )
            .map_err(|e| StoreError::from_insert(e, "comment"))?;
            conn.last_insert_rowid() as u64
        };
        info!(comment_id = id, post_id, user_id, "Comment created");
        self.get(id).await
    }

    pub async fn get(&self, id: u64) -> Result<Comment, StoreError> {
        let conn = self.db.conn().await;
        conn.query_row(
            "SELECT id, content, user_id, post_id, created_at FROM comments WHERE id = ?1",
            params![id as i64],
            comment_from_row,
        )
        .optional()?
        .ok_or(StoreError::NotFound)
    }

    pub async fn list_for_post(
        &self,
        post_id: u64,
        page: &PageRequest,
    ) -> Result<(Vec<Comment>, u64), StoreError> {
        let conn = self.db.conn().await;
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM comments WHERE post_id = ?1",
            params![post_id as i64],
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT id, content, user_id, post_id, created_at FROM comments
             WHERE post_id = ?1 {} LIMIT ?2 OFFSET ?3",
            page.order_by()
        );
        let mut stmt = conn.prepare(&sql)?;
        let comments = stmt
            .query_map(
                params![post_id as i64, page.limit(), page.offset()],
                comment_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((comments, total as u64))
    }

    pub async fn delete(&self, id: u64) -> Result<(), StoreError> {
        let conn = self.db.conn().await;
        let removed = conn.execute("DELETE FROM comments WHERE id = ?1", params![id as i64])?;
        if removed == 0 {
            return Err(StoreError::NotFound);
        }
        info!(comment_id = id, "Comment deleted");
        Ok(())
    }
}
