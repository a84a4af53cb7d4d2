//! User Storage
//! Mission: Persist principals in SQLite. Accounts are deactivated, never
//! removed, by the API; `purge` exists for maintenance and tests.

use crate::auth::models::{Principal, PrincipalUpdate};
use crate::db::{Database, StoreError};
use crate::pagination::PageRequest;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, info};

pub const USER_SORTS: &[&str] = &["id", "username", "email", "created_at", "updated_at"];

const USER_COLUMNS: &str = "id, username, email, password_hash, first_name, last_name,
     is_active, created_at, updated_at";

fn principal_from_row(row: &Row<'_>) -> rusqlite::Result<Principal> {
    Ok(Principal {
        id: row.get::<_, i64>(0)? as u64,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        first_name: row.get(4)?,
        last_name: row.get(5)?,
        is_active: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

/// Fields written by [`UserStore::create`]. The secret arrives already hashed.
#[derive(Debug, Clone)]
pub struct PrincipalRecord<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
}

/// User storage with SQLite backend
#[derive(Clone)]
pub struct UserStore {
    db: Database,
}

impl UserStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert an active principal and return it with its new id.
    pub async fn create(&self, record: PrincipalRecord<'_>) -> Result<Principal, StoreError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.db.conn().await;
        conn.execute(
            "INSERT INTO users (username, email, password_hash, first_name, last_name,
                                is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)",
            params![
                record.username,
                record.email,
                record.password_hash,
                record.first_name,
                record.last_name,
                now,
            ],
        )
        .map_err(|e| StoreError::from_insert(e, "username or email"))?;

        let id = conn.last_insert_rowid() as u64;
        info!(principal_id = id, username = %record.username, "User created");

        Ok(Principal {
            id,
            username: record.username.to_string(),
            email: record.email.to_string(),
            password_hash: record.password_hash.to_string(),
            first_name: record.first_name.to_string(),
            last_name: record.last_name.to_string(),
            is_active: true,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Look a principal up by contact address. An active account wins over
    /// deactivated ones sharing the address.
    pub async fn find_by_contact(&self, email: &str) -> Result<Option<Principal>, StoreError> {
        let conn = self.db.conn().await;
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ?1
             ORDER BY is_active DESC, id DESC LIMIT 1"
        );
        Ok(conn
            .query_row(&sql, params![email], principal_from_row)
            .optional()?)
    }

    pub async fn find_by_id(&self, id: u64) -> Result<Option<Principal>, StoreError> {
        let conn = self.db.conn().await;
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
        Ok(conn
            .query_row(&sql, params![id as i64], principal_from_row)
            .optional()?)
    }

    pub async fn get(&self, id: u64) -> Result<Principal, StoreError> {
        self.find_by_id(id).await?.ok_or(StoreError::NotFound)
    }

    /// Apply the present fields of `update` and return the stored row.
    pub async fn update(&self, id: u64, update: &PrincipalUpdate) -> Result<Principal, StoreError> {
        {
            let conn = self.db.conn().await;
            let changed = conn
                .execute(
                    "UPDATE users SET
                        username   = COALESCE(?2, username),
                        email      = COALESCE(?3, email),
                        first_name = COALESCE(?4, first_name),
                        last_name  = COALESCE(?5, last_name),
                        is_active  = COALESCE(?6, is_active),
                        updated_at = ?7
                     WHERE id = ?1",
                    params![
                        id as i64,
                        update.username,
                        update.email,
                        update.first_name,
                        update.last_name,
                        update.is_active,
                        Utc::now().to_rfc3339(),
                    ],
                )
                .map_err(|e| StoreError::from_insert(e, "username or email"))?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
        }
        debug!(principal_id = id, "User updated");
        self.get(id).await
    }

    pub async fn set_active(&self, id: u64, active: bool) -> Result<(), StoreError> {
        let update = PrincipalUpdate {
            is_active: Some(active),
            ..Default::default()
        };
        self.update(id, &update).await?;
        info!(principal_id = id, active, "User activation changed");
        Ok(())
    }

    pub async fn deactivate(&self, id: u64) -> Result<(), StoreError> {
        self.set_active(id, false).await
    }

    /// One page of active principals and the total count.
    pub async fn list(&self, page: &PageRequest) -> Result<(Vec<Principal>, u64), StoreError> {
        let conn = self.db.conn().await;
        let total: i64 =
            conn.query_row("SELECT COUNT(*) FROM users WHERE is_active = 1", [], |row| {
                row.get(0)
            })?;

        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE is_active = 1 {} LIMIT ?1 OFFSET ?2",
            page.order_by()
        );
        let mut stmt = conn.prepare(&sql)?;
        let users = stmt
            .query_map(params![page.limit(), page.offset()], principal_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((users, total as u64))
    }

    /// Hard delete. Role grants and content cascade with the row.
    pub async fn purge(&self, id: u64) -> Result<(), StoreError> {
        let conn = self.db.conn().await;
        let removed = conn.execute("DELETE FROM users WHERE id = ?1", params![id as i64])?;
        if removed == 0 {
            return Err(StoreError::NotFound);
        }
        info!(principal_id = id, "User purged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::PageQuery;

    fn record<'a>(username: &'a str, email: &'a str) -> PrincipalRecord<'a> {
        PrincipalRecord {
            username,
            email,
            password_hash: "$2b$04$hash",
            first_name: "",
            last_name: "",
        }
    }

    fn create_test_store() -> UserStore {
        UserStore::new(Database::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let store = create_test_store();
        let ada = store.create(record("ada", "ada@x.io")).await.unwrap();
        assert!(ada.id > 0);
        assert!(ada.is_active);

        let by_contact = store.find_by_contact("ada@x.io").await.unwrap().unwrap();
        assert_eq!(by_contact.id, ada.id);
        assert_eq!(by_contact.password_hash, "$2b$04$hash");

        assert!(store.find_by_id(ada.id).await.unwrap().is_some());
        assert!(store.find_by_contact("nobody@x.io").await.unwrap().is_none());
        assert!(matches!(store.get(999).await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_duplicate_active_email_conflicts() {
        let store = create_test_store();
        store.create(record("ada", "ada@x.io")).await.unwrap();

        let dup = store.create(record("ada2", "ada@x.io")).await;
        assert!(matches!(dup, Err(StoreError::Conflict(_))));
        let dup = store.create(record("ada", "other@x.io")).await;
        assert!(matches!(dup, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_deactivated_address_can_be_reused() {
        let store = create_test_store();
        let old = store.create(record("ada", "ada@x.io")).await.unwrap();
        store.deactivate(old.id).await.unwrap();

        let inactive = store.find_by_contact("ada@x.io").await.unwrap().unwrap();
        assert!(!inactive.is_active);

        let new = store.create(record("ada", "ada@x.io")).await.unwrap();
        let found = store.find_by_contact("ada@x.io").await.unwrap().unwrap();
        assert_eq!(found.id, new.id);
        assert!(found.is_active);
    }

    #[tokio::test]
    async fn test_partial_update() {
        let store = create_test_store();
        let ada = store.create(record("ada", "ada@x.io")).await.unwrap();

        let update = PrincipalUpdate {
            first_name: Some("Ada".to_string()),
            ..Default::default()
        };
        let updated = store.update(ada.id, &update).await.unwrap();
        assert_eq!(updated.first_name, "Ada");
        assert_eq!(updated.email, "ada@x.io");

        assert!(matches!(
            store.update(404, &update).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_list_paginates_active_users() {
        let store = create_test_store();
        for i in 0..12 {
            store
                .create(record(&format!("user{i}"), &format!("user{i}@x.io")))
                .await
                .unwrap();
        }
        store.deactivate(1).await.unwrap();

        let query = PageQuery {
            page: Some("2".to_string()),
            per_page: Some("5".to_string()),
            ..Default::default()
        };
        let (page, total) = store.list(&query.resolve(USER_SORTS)).await.unwrap();
        assert_eq!(total, 11);
        assert_eq!(page.len(), 5);
        assert_eq!(page[0].id, 7);
    }

    #[tokio::test]
    async fn test_purge() {
        let store = create_test_store();
        let ada = store.create(record("ada", "ada@x.io")).await.unwrap();
        store.purge(ada.id).await.unwrap();
        assert!(store.find_by_id(ada.id).await.unwrap().is_none());
        assert!(matches!(store.purge(ada.id).await, Err(StoreError::NotFound)));
    }
}
