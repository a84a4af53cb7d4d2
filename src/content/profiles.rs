//! User profile storage.

use crate::db::{Database, StoreError};
use crate::validation::{sanitize, FieldError, Rule, Validator};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: u64,
    pub user_id: u64,
    pub bio: String,
    pub avatar: String,
    pub website: String,
    pub location: String,
    pub created_at: String,
    pub updated_at: String,
}

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: row.get::<_, i64>(0)? as u64,
        user_id: row.get::<_, i64>(1)? as u64,
        bio: row.get(2)?,
        avatar: row.get(3)?,
        website: row.get(4)?,
        location: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

const PROFILE_COLUMNS: &str =
    "id, user_id, bio, avatar, website, location, created_at, updated_at";

/// Full replacement body; omitted fields are stored empty.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub location: String,
}

impl ProfileUpdate {
    pub fn validate(&mut self) -> Result<(), Vec<FieldError>> {
        self.bio = sanitize(&self.bio);
        self.avatar = sanitize(&self.avatar);
        self.website = sanitize(&self.website);
        self.location = sanitize(&self.location);

        let mut v = Validator::new();
        v.check("bio", &self.bio, &[Rule::MaxLen(500)])
            .check("avatar", &self.avatar, &[Rule::MaxLen(255)])
            .check("website", &self.website, &[Rule::MaxLen(255), Rule::Url])
            .check("location", &self.location, &[Rule::MaxLen(100)]);
        v.finish()
    }
}

#[derive(Clone)]
pub struct ProfileStore {
    db: Database,
}

impl ProfileStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn find(&self, user_id: u64) -> Result<Option<Profile>, StoreError> {
        let conn = self.db.conn().await;
        let profile = conn
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM user_profiles WHERE user_id = ?1"),
                params![user_id as i64],
                profile_from_row,
            )
            .optional()?;
        Ok(profile)
    }

    /// Create or replace the profile of `user_id`. `NotFound` when the user
    /// does not exist.
    pub async fn upsert(
        &self,
        user_id: u64,
        update: &ProfileUpdate,
    ) -> Result<Profile, StoreError> {
        {
            let now = Utc::now().to_rfc3339();
            let conn = self.db.conn().await;
            conn.execute(
                "INSERT INTO user_profiles
                     (user_id, bio, avatar, website, location, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(user_id) DO UPDATE SET
                     bio = excluded.bio,
                     avatar = excluded.avatar,
                     website = excluded.website,
                     location = excluded.location,
                     updated_at = excluded.updated_at",
                params![
                    user_id as i64,
                    update.bio,
                    update.avatar,
                    update.website,
                    update.location,
                    now
                ],
            )
            .map_err(|e| StoreError::from_insert(e, "profile"))?;
        }
        info!(principal_id = user_id, "Profile saved");
        self.find(user_id).await?.ok_or(StoreError::NotFound)
    }
}
