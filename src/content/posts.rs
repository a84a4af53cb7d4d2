//! Post storage.

use crate::db::{Database, StoreError};
use crate::pagination::PageRequest;
use crate::validation::{sanitize, FieldError, Rule, Validator};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const POST_SORTS: &[&str] = &["id", "title", "status", "created_at", "updated_at"];
pub const POST_STATUSES: &[&str] = &["draft", "published", "archived"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: u64,
    pub title: String,
    pub content: String,
    pub status: String,
    pub user_id: u64,
    pub created_at: String,
    pub updated_at: String,
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get::<_, i64>(0)? as u64,
        title: row.get(1)?,
        content: row.get(2)?,
        status: row.get(3)?,
        user_id: row.get::<_, i64>(4)? as u64,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

const POST_COLUMNS: &str = "id, title, content, status, user_id, created_at, updated_at";

#[derive(Debug, Clone, Deserialize)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub status: Option<String>,
}

fn check_status(v: &mut Validator, status: &str) {
    if !POST_STATUSES.contains(&status) {
        v.add(
            "status",
            format!("Status must be one of: {}", POST_STATUSES.join(", ")),
            "INVALID_STATUS",
        );
    }
}

impl NewPost {
    pub fn validate(&mut self) -> Result<(), Vec<FieldError>> {
        self.title = sanitize(&self.title);
        self.content = sanitize(&self.content);

        let mut v = Validator::new();
        v.check("title", &self.title, &[Rule::Required, Rule::MaxLen(200)])
            .check("content", &self.content, &[Rule::Required]);
        if let Some(status) = &self.status {
            check_status(&mut v, status);
        }
        v.finish()
    }
}

impl PostUpdate {
    pub fn validate(&mut self) -> Result<(), Vec<FieldError>> {
        let mut v = Validator::new();
        if let Some(title) = self.title.as_mut() {
            *title = sanitize(title);
            v.check("title", title, &[Rule::Required, Rule::MaxLen(200)]);
        }
        if let Some(content) = self.content.as_mut() {
            *content = sanitize(content);
            v.check("content", content, &[Rule::Required]);
        }
        if let Some(status) = &self.status {
            check_status(&mut v, status);
        }
        v.finish()
    }
}

/// Which posts a listing may show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Published posts only.
    Public,
    /// Published posts plus everything the viewer wrote.
    Viewer(u64),
}

#[derive(Clone)]
pub struct PostStore {
    db: Database,
}

impl PostStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create(&self, user_id: u64, post: &NewPost) -> Result<Post, StoreError> {
        let now = Utc::now().to_rfc3339();
        let status = post.status.as_deref().unwrap_or("draft");
        let id = {
            let conn = self.db.conn().await;
            conn.execute(
                "INSERT INTO posts (title, content, status, user_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![post.title, post.content, status, user_id as i64, now],
            )
            .map_err(|e| StoreError::from_insert(e, "post"))?;
            conn.last_insert_rowid() as u64
        };
        info!(post_id = id, user_id, "Post created");
        self.get(id).await
    }

    pub async fn get(&self, id: u64) -> Result<Post, StoreError> {
        let conn = self.db.conn().await;
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1");
        conn.query_row(&sql, params![id as i64], post_from_row)
            .optional()?
            .ok_or(StoreError::NotFound)
    }

    pub async fn list(
        &self,
        visibility: Visibility,
        page: &PageRequest,
    ) -> Result<(Vec<Post>, u64), StoreError> {
        // -1 never matches a user id, so Public sees published posts only.
        let viewer = match visibility {
            Visibility::Public => -1,
            Visibility::Viewer(id) => id as i64,
        };
        let filter = "WHERE status = 'published' OR user_id = ?1";

        let conn = self.db.conn().await;
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM posts {filter}"),
            params![viewer],
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts {filter} {} LIMIT ?2 OFFSET ?3",
            page.order_by()
        );
        let mut stmt = conn.prepare(&sql)?;
        let posts = stmt
            .query_map(params![viewer, page.limit(), page.offset()], post_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((posts, total as u64))
    }

    pub async fn update(&self, id: u64, update: &PostUpdate) -> Result<Post, StoreError> {
        {
            let conn = self.db.conn().await;
            let changed = conn.execute(
                "UPDATE posts SET
                    title      = COALESCE(?2, title),
                    content    = COALESCE(?3, content),
                    status     = COALESCE(?4, status),
                    updated_at = ?5
                 WHERE id = ?1",
                params![
                    id as i64,
                    update.title,
                    update.content,
                    update.status,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
        }
        self.get(id).await
    }

    /// Comments go with the post.
    pub async fn delete(&self, id: u64) -> Result<(), StoreError> {
        let conn = self.db.conn().await;
        let removed = conn.execute("DELETE FROM posts WHERE id = ?1", params![id as i64])?;
        if removed == 0 {
            return Err(StoreError::NotFound);
        }
        info!(post_id = id, "Post deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::tests::db_with_users;

    fn new_post(title: &str, status: Option<&str>) -> NewPost {
        NewPost {
            title: title.to_string(),
            content: "body".to_string(),
            status: status.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_create_defaults_to_draft() {
        let store = PostStore::new(db_with_users(&[1]).await);
        let post = store.create(1, &new_post("Hello", None)).await.unwrap();
        assert_eq!(post.status, "draft");
        assert_eq!(post.user_id, 1);
        assert_eq!(store.get(post.id).await.unwrap(), post);
    }

    #[tokio::test]
    async fn test_create_for_unknown_author_fails() {
        let store = PostStore::new(db_with_users(&[1]).await);
        assert!(store.create(99, &new_post("Hello", None)).await.is_err());
    }

    #[tokio::test]
    async fn test_visibility() {
        let store = PostStore::new(db_with_users(&[1, 2]).await);
        store.create(1, &new_post("pub", Some("published"))).await.unwrap();
        store.create(1, &new_post("mine", None)).await.unwrap();
        store.create(2, &new_post("theirs", None)).await.unwrap();

        let page = PageRequest::default();
        let (public, total) = store.list(Visibility::Public, &page).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(public[0].title, "pub");

        let (own, total) = store.list(Visibility::Viewer(1), &page).await.unwrap();
        assert_eq!(total, 2);
        assert!(own.iter().all(|p| p.user_id == 1));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store = PostStore::new(db_with_users(&[1]).await);
        let post = store.create(1, &new_post("Hello", None)).await.unwrap();

        let update = PostUpdate {
            status: Some("published".to_string()),
            ..Default::default()
        };
        let updated = store.update(post.id, &update).await.unwrap();
        assert_eq!(updated.status, "published");
        assert_eq!(updated.title, "Hello");

        store.delete(post.id).await.unwrap();
        assert!(matches!(store.get(post.id).await, Err(StoreError::NotFound)));
        assert!(matches!(store.delete(post.id).await, Err(StoreError::NotFound)));
    }

    #[test]
    fn test_validation() {
        let mut post = new_post(" <b>Title</b> ", Some("live"));
        let errors = post.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, "INVALID_STATUS");
        assert_eq!(post.title, "&lt;b&gt;Title&lt;/b&gt;");

        let mut empty = PostUpdate {
            title: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(empty.validate().is_err());
    }
}
