//! Datastore VM inventory (`bt_vm`).
//!
//! Rows are live while `del_yn = 'N'`. Deletion flips the flag and stamps
//! `del_dt` in one statement; deleted rows are invisible to every read.

use crate::db::{Database, StoreError};
use crate::validation::{sanitize, FieldError, Rule, Validator};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VmRecord {
    pub id: u64,
    pub hostname: String,
    pub host_user: String,
    pub host_ip: String,
    #[serde(skip_serializing)]
    pub host_pwd: String,
    pub message: String,
    pub reg_dt: String,
    pub mod_dt: Option<String>,
}

fn vm_from_row(row: &Row<'_>) -> rusqlite::Result<VmRecord> {
    Ok(VmRecord {
        id: row.get::<_, i64>(0)? as u64,
        hostname: row.get(1)?,
        host_user: row.get(2)?,
        host_ip: row.get(3)?,
        host_pwd: row.get(4)?,
        message: row.get(5)?,
        reg_dt: row.get(6)?,
        mod_dt: row.get(7)?,
    })
}

const VM_COLUMNS: &str = "id, hostname, host_user, host_ip, host_pwd, message, reg_dt, mod_dt";

/// Client payload for insert and update. Update replaces every field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VmData {
    pub hostname: String,
    #[serde(default)]
    pub host_user: String,
    #[serde(default)]
    pub host_ip: String,
    #[serde(default)]
    pub host_pwd: String,
    #[serde(default)]
    pub message: String,
}

impl VmData {
    /// The password is stored as given.
    pub fn validate(&mut self) -> Result<(), Vec<FieldError>> {
        self.hostname = sanitize(&self.hostname);
        self.host_user = sanitize(&self.host_user);
        self.host_ip = sanitize(&self.host_ip);
        self.message = sanitize(&self.message);

        let mut v = Validator::new();
        v.check("hostname", &self.hostname, &[Rule::Required, Rule::MaxLen(255)])
            .check("host_user", &self.host_user, &[Rule::MaxLen(100)])
            .check("host_ip", &self.host_ip, &[Rule::MaxLen(64)])
            .check("message", &self.message, &[Rule::MaxLen(1000)]);
        if !self.host_ip.is_empty() && self.host_ip.parse::<std::net::IpAddr>().is_err() {
            v.add("host_ip", "Invalid IP address", "INVALID_IP");
        }
        v.finish()
    }
}

#[derive(Clone)]
pub struct VmStore {
    db: Database,
}

impl VmStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn insert(&self, data: &VmData) -> Result<VmRecord, StoreError> {
        let id = {
            let conn = self.db.conn().await;
            conn.execute(
                "INSERT INTO bt_vm (hostname, host_user, host_ip, host_pwd, message, del_yn, reg_dt)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'N', ?6)",
                params![
                    data.hostname,
                    data.host_user,
                    data.host_ip,
                    data.host_pwd,
                    data.message,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            conn.last_insert_rowid() as u64
        };
        info!(vm_id = id, hostname = %data.hostname, "VM inserted");
        self.search(id).await
    }

    /// A live row by id; `NotFound` on no match.
    pub async fn search(&self, id: u64) -> Result<VmRecord, StoreError> {
        let conn = self.db.conn().await;
        let sql = format!("SELECT {VM_COLUMNS} FROM bt_vm WHERE id = ?1 AND del_yn IN ('N', 'n')");
        conn.query_row(&sql, params![id as i64], vm_from_row)
            .optional()?
            .ok_or(StoreError::NotFound)
    }

    pub async fn list(&self) -> Result<Vec<VmRecord>, StoreError> {
        let conn = self.db.conn().await;
        let sql = format!("SELECT {VM_COLUMNS} FROM bt_vm WHERE del_yn IN ('N', 'n') ORDER BY id");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], vm_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub async fn update(&self, id: u64, data: &VmData) -> Result<VmRecord, StoreError> {
        {
            let conn = self.db.conn().await;
            let changed = conn.execute(
                "UPDATE bt_vm SET hostname = ?2, host_user = ?3, host_ip = ?4, host_pwd = ?5,
                                  message = ?6, mod_dt = ?7
                 WHERE id = ?1 AND del_yn IN ('N', 'n')",
                params![
                    id as i64,
                    data.hostname,
                    data.host_user,
                    data.host_ip,
                    data.host_pwd,
                    data.message,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
        }
        info!(vm_id = id, "VM updated");
        self.search(id).await
    }

    /// Soft delete: flag and timestamp in a single update.
    pub async fn delete(&self, id: u64) -> Result<(), StoreError> {
        let conn = self.db.conn().await;
        let changed = conn.execute(
            "UPDATE bt_vm SET del_yn = 'Y', del_dt = ?2 WHERE id = ?1 AND del_yn IN ('N', 'n')",
            params![id as i64, Utc::now().to_rfc3339()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        info!(vm_id = id, "VM soft-deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> VmStore {
        VmStore::new(Database::open_in_memory().unwrap())
    }

    fn vm(hostname: &str) -> VmData {
        VmData {
            hostname: hostname.to_string(),
            host_user: "root".to_string(),
            host_ip: "10.0.0.5".to_string(),
            host_pwd: "s3cret".to_string(),
            message: String::new(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_search() {
        let store = store();
        let record = store.insert(&vm("db-01")).await.unwrap();
        assert_eq!(record.hostname, "db-01");
        assert_eq!(store.search(record.id).await.unwrap(), record);
    }

    #[tokio::test]
    async fn test_search_miss_is_not_found() {
        assert!(matches!(store().search(1).await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_soft_delete_is_atomic_and_final() {
        let store = store();
        let record = store.insert(&vm("db-01")).await.unwrap();
        store.delete(record.id).await.unwrap();

        assert!(matches!(store.search(record.id).await, Err(StoreError::NotFound)));
        assert!(matches!(store.delete(record.id).await, Err(StoreError::NotFound)));
        assert!(matches!(
            store.update(record.id, &vm("db-02")).await,
            Err(StoreError::NotFound)
        ));

        let conn = store.db.conn().await;
        let (flag, deleted_at): (String, Option<String>) = conn
            .query_row(
                "SELECT del_yn, del_dt FROM bt_vm WHERE id = ?1",
                params![record.id as i64],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(flag, "Y");
        assert!(deleted_at.is_some());
    }

    #[tokio::test]
    async fn test_list_and_update() {
        let store = store();
        let a = store.insert(&vm("a")).await.unwrap();
        let b = store.insert(&vm("b")).await.unwrap();
        store.delete(a.id).await.unwrap();

        let updated = store.update(b.id, &vm("b2")).await.unwrap();
        assert_eq!(updated.hostname, "b2");
        assert!(updated.mod_dt.is_some());

        let live = store.list().await.unwrap();
        assert_eq!(live, vec![updated]);
    }

    #[test]
    fn test_password_never_serialized() {
        let record = VmRecord {
            id: 1,
            hostname: "h".to_string(),
            host_user: "u".to_string(),
            host_ip: "127.0.0.1".to_string(),
            host_pwd: "s3cret".to_string(),
            message: String::new(),
            reg_dt: String::new(),
            mod_dt: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("s3cret"));
        assert!(!json.contains("host_pwd"));
    }

    #[test]
    fn test_validation() {
        let mut bad = vm("");
        bad.host_ip = "999.1.1.1".to_string();
        let codes: Vec<_> = bad.validate().unwrap_err().iter().map(|e| e.code).collect();
        assert_eq!(codes, vec!["REQUIRED", "INVALID_IP"]);
        assert!(vm("ok").validate().is_ok());
    }
}
