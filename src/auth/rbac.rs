//! Role-based access control.
//!
//! Principals hold roles, roles hold permissions. Two backings share one
//! contract: [`SqliteAuthorizationStore`] persists the tuples next to the user
//! table, [`MemoryAuthorizationStore`] keeps them in process.
//!
//! Queries never mutate anything. Writers are idempotent: granting a pair that
//! already exists, or assigning a role the principal already holds, is a no-op.

use crate::auth::models::{Permission, Role};
use crate::db::{Database, StoreError};
use async_trait::async_trait;
use parking_lot::RwLock;
use rusqlite::params;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What a caller must hold to proceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Permission(Permission),
    Role(Role),
    AnyRole(Vec<Role>),
    OwnershipOrRole { owner_id: u64, role: Role },
}

/// Role → permission table installed by [`AuthorizationStore::initialize_defaults`].
pub fn default_grants() -> Vec<(Role, Vec<Permission>)> {
    let post_and_comment = [
        Permission::CREATE_POST,
        Permission::READ_POST,
        Permission::UPDATE_POST,
        Permission::DELETE_POST,
        Permission::CREATE_COMMENT,
        Permission::READ_COMMENT,
        Permission::UPDATE_COMMENT,
        Permission::DELETE_COMMENT,
    ];

    let mut admin = vec![
        Permission::CREATE_USER,
        Permission::READ_USER,
        Permission::UPDATE_USER,
        Permission::DELETE_USER,
    ];
    admin.extend(post_and_comment.iter().cloned());
    admin.push(Permission::MANAGE_SYSTEM);

    vec![
        (Role::ADMIN, admin),
        (Role::USER, post_and_comment.to_vec()),
        (Role::GUEST, vec![Permission::READ_POST, Permission::READ_COMMENT]),
    ]
}

#[async_trait]
pub trait AuthorizationStore: Send + Sync {
    async fn assign_role(&self, principal_id: u64, role: &Role) -> Result<(), AuthzError>;

    async fn remove_role(&self, principal_id: u64, role: &Role) -> Result<(), AuthzError>;

    async fn roles_of(&self, principal_id: u64) -> Result<BTreeSet<Role>, AuthzError>;

    async fn grant_permission(&self, role: &Role, permission: &Permission)
        -> Result<(), AuthzError>;

    async fn revoke_permission(
        &self,
        role: &Role,
        permission: &Permission,
    ) -> Result<(), AuthzError>;

    async fn permissions_of(&self, role: &Role) -> Result<BTreeSet<Permission>, AuthzError>;

    async fn has_role(&self, principal_id: u64, role: &Role) -> Result<bool, AuthzError> {
        Ok(self.roles_of(principal_id).await?.contains(role))
    }

    /// True iff any role of the principal grants `permission`.
    async fn has_permission(
        &self,
        principal_id: u64,
        permission: &Permission,
    ) -> Result<bool, AuthzError> {
        for role in self.roles_of(principal_id).await? {
            if self.permissions_of(&role).await?.contains(permission) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn require_role(&self, principal_id: u64, role: &Role) -> Result<(), AuthzError> {
        if self.has_role(principal_id, role).await? {
            Ok(())
        } else {
            Err(AuthzError::Forbidden(format!("role {role} required")))
        }
    }

    async fn require_any_role(&self, principal_id: u64, roles: &[Role]) -> Result<(), AuthzError> {
        let held = self.roles_of(principal_id).await?;
        if roles.iter().any(|r| held.contains(r)) {
            return Ok(());
        }
        let wanted: Vec<&str> = roles.iter().map(Role::as_str).collect();
        Err(AuthzError::Forbidden(format!(
            "one of roles [{}] required",
            wanted.join(", ")
        )))
    }

    async fn require_permission(
        &self,
        principal_id: u64,
        permission: &Permission,
    ) -> Result<(), AuthzError> {
        if self.has_permission(principal_id, permission).await? {
            Ok(())
        } else {
            Err(AuthzError::Forbidden(format!("permission {permission} required")))
        }
    }

    /// Owners pass without any role lookup.
    async fn require_ownership_or_role(
        &self,
        principal_id: u64,
        resource_owner_id: u64,
        role: &Role,
    ) -> Result<(), AuthzError> {
        if principal_id == resource_owner_id {
            return Ok(());
        }
        self.require_role(principal_id, role).await
    }

    async fn authorize(
        &self,
        principal_id: u64,
        requirement: &Requirement,
    ) -> Result<(), AuthzError> {
        match requirement {
            Requirement::Permission(p) => self.require_permission(principal_id, p).await,
            Requirement::Role(r) => self.require_role(principal_id, r).await,
            Requirement::AnyRole(roles) => self.require_any_role(principal_id, roles).await,
            Requirement::OwnershipOrRole { owner_id, role } => {
                self.require_ownership_or_role(principal_id, *owner_id, role)
                    .await
            }
        }
    }

    async fn initialize_defaults(&self) -> Result<(), AuthzError> {
        let mut pairs = 0usize;
        for (role, permissions) in default_grants() {
            for permission in &permissions {
                self.grant_permission(&role, permission).await?;
                pairs += 1;
            }
        }
        info!(pairs, "Default role permissions installed");
        Ok(())
    }
}

/// Role tables stored in SQLite alongside `users`.
#[derive(Clone)]
pub struct SqliteAuthorizationStore {
    db: Database,
}

impl SqliteAuthorizationStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AuthorizationStore for SqliteAuthorizationStore {
    async fn assign_role(&self, principal_id: u64, role: &Role) -> Result<(), AuthzError> {
        let conn = self.db.conn().await;
        // OR IGNORE covers the duplicate pair; an unknown principal still fails.
        conn.execute(
            "INSERT OR IGNORE INTO user_roles (user_id, role) VALUES (?1, ?2)",
            params![principal_id as i64, role.as_str()],
        )
        .map_err(|e| StoreError::from_insert(e, "role grant"))?;

        debug!(principal_id, role = %role, "Role assigned");
        Ok(())
    }

    async fn remove_role(&self, principal_id: u64, role: &Role) -> Result<(), AuthzError> {
        let conn = self.db.conn().await;
        conn.execute(
            "DELETE FROM user_roles WHERE user_id = ?1 AND role = ?2",
            params![principal_id as i64, role.as_str()],
        )
        .map_err(StoreError::from)?;

        debug!(principal_id, role = %role, "Role removed");
        Ok(())
    }

    async fn roles_of(&self, principal_id: u64) -> Result<BTreeSet<Role>, AuthzError> {
        let conn = self.db.conn().await;
        let mut stmt = conn
            .prepare_cached("SELECT role FROM user_roles WHERE user_id = ?1")
            .map_err(StoreError::from)?;
        let names = stmt
            .query_map(params![principal_id as i64], |row| row.get::<_, String>(0))
            .map_err(StoreError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)?;

        // Rows that no longer parse are ignored rather than granting anything.
        Ok(names.iter().filter_map(|n| n.parse().ok()).collect())
    }

    async fn grant_permission(
        &self,
        role: &Role,
        permission: &Permission,
    ) -> Result<(), AuthzError> {
        let conn = self.db.conn().await;
        conn.execute(
            "INSERT OR IGNORE INTO role_permissions (role, permission) VALUES (?1, ?2)",
            params![role.as_str(), permission.as_str()],
        )
        .map_err(StoreError::from)?;
        Ok(())
    }

    async fn revoke_permission(
        &self,
        role: &Role,
        permission: &Permission,
    ) -> Result<(), AuthzError> {
        let conn = self.db.conn().await;
        conn.execute(
            "DELETE FROM role_permissions WHERE role = ?1 AND permission = ?2",
            params![role.as_str(), permission.as_str()],
        )
        .map_err(StoreError::from)?;
        Ok(())
    }

    async fn permissions_of(&self, role: &Role) -> Result<BTreeSet<Permission>, AuthzError> {
        let conn = self.db.conn().await;
        let mut stmt = conn
            .prepare_cached("SELECT permission FROM role_permissions WHERE role = ?1")
            .map_err(StoreError::from)?;
        let names = stmt
            .query_map(params![role.as_str()], |row| row.get::<_, String>(0))
            .map_err(StoreError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)?;

        Ok(names.iter().filter_map(|n| n.parse().ok()).collect())
    }

    async fn has_role(&self, principal_id: u64, role: &Role) -> Result<bool, AuthzError> {
        let conn = self.db.conn().await;
        let found: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM user_roles WHERE user_id = ?1 AND role = ?2)",
                params![principal_id as i64, role.as_str()],
                |row| row.get(0),
            )
            .map_err(StoreError::from)?;
        Ok(found)
    }

    async fn has_permission(
        &self,
        principal_id: u64,
        permission: &Permission,
    ) -> Result<bool, AuthzError> {
        let conn = self.db.conn().await;
        let found: bool = conn
            .query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM user_roles ur
                    JOIN role_permissions rp ON rp.role = ur.role
                    WHERE ur.user_id = ?1 AND rp.permission = ?2
                )",
                params![principal_id as i64, permission.as_str()],
                |row| row.get(0),
            )
            .map_err(StoreError::from)?;
        Ok(found)
    }
}

/// Process-local role tables. Does not check that principals exist.
#[derive(Default)]
pub struct MemoryAuthorizationStore {
    roles: RwLock<HashMap<u64, BTreeSet<Role>>>,
    permissions: RwLock<HashMap<Role, BTreeSet<Permission>>>,
}

impl MemoryAuthorizationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthorizationStore for MemoryAuthorizationStore {
    async fn assign_role(&self, principal_id: u64, role: &Role) -> Result<(), AuthzError> {
        self.roles
            .write()
            .entry(principal_id)
            .or_default()
            .insert(role.clone());
        Ok(())
    }

    async fn remove_role(&self, principal_id: u64, role: &Role) -> Result<(), AuthzError> {
        let mut roles = self.roles.write();
        if let Some(held) = roles.get_mut(&principal_id) {
            held.remove(role);
            if held.is_empty() {
                roles.remove(&principal_id);
            }
        }
        Ok(())
    }

    async fn roles_of(&self, principal_id: u64) -> Result<BTreeSet<Role>, AuthzError> {
        Ok(self
            .roles
            .read()
            .get(&principal_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn grant_permission(
        &self,
        role: &Role,
        permission: &Permission,
    ) -> Result<(), AuthzError> {
        self.permissions
            .write()
            .entry(role.clone())
            .or_default()
            .insert(permission.clone());
        Ok(())
    }

    async fn revoke_permission(
        &self,
        role: &Role,
        permission: &Permission,
    ) -> Result<(), AuthzError> {
        let mut permissions = self.permissions.write();
        if let Some(granted) = permissions.get_mut(role) {
            granted.remove(permission);
            if granted.is_empty() {
                permissions.remove(role);
            }
        }
        Ok(())
    }

    async fn permissions_of(&self, role: &Role) -> Result<BTreeSet<Permission>, AuthzError> {
        Ok(self
            .permissions
            .read()
            .get(role)
            .cloned()
            .unwrap_or_default())
    }
}
