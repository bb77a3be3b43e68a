use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Column, FieldMap, FieldValue, Filter, NewUser, RecordStore};
use crate::users::repo_types::User;

/// Process-local store. Each call holds the lock for its whole write, so
/// concurrent `update_by_id` calls are serialized.
#[derive(Default)]
pub struct MemoryStore {
    rows: RwLock<HashMap<Uuid, User>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn username_taken(rows: &HashMap<Uuid, User>, username: &str, except: Option<Uuid>) -> bool {
    rows.values()
        .any(|u| u.username == username && Some(u.id) != except)
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn fetch_one(&self, filter: &Filter) -> anyhow::Result<Option<User>> {
        let rows = self.rows.read().await;
        Ok(rows.values().find(|u| filter.matches(u)).cloned())
    }

    async fn fetch_many(&self, filter: &Filter, limit: Option<i64>) -> anyhow::Result<Vec<User>> {
        let rows = self.rows.read().await;
        let mut out: Vec<User> = rows.values().filter(|u| filter.matches(u)).cloned().collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        if let Some(limit) = limit {
            out.truncate(limit.max(0) as usize);
        }
        Ok(out)
    }

    async fn count(&self, filter: &Filter) -> anyhow::Result<i64> {
        let rows = self.rows.read().await;
        Ok(rows.values().filter(|u| filter.matches(u)).count() as i64)
    }

    async fn insert(&self, new: NewUser) -> anyhow::Result<User> {
        let mut rows = self.rows.write().await;
        if username_taken(&rows, &new.username, None) {
            anyhow::bail!("duplicate key value violates unique constraint \"users_username_key\"");
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            username: new.username,
            password_hash: new.password_hash,
            role: new.role,
            profile_image: None,
            suspended: 0,
            created_at: now,
            updated_at: now,
        };
        rows.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_by_id(&self, id: Uuid, fields: &FieldMap) -> anyhow::Result<Option<User>> {
        anyhow::ensure!(!fields.is_empty(), "no columns to update");
        let mut rows = self.rows.write().await;
        if let Some(FieldValue::Text(name)) = fields.get(&Column::Username) {
            if username_taken(&rows, name, Some(id)) {
                anyhow::bail!("duplicate key value violates unique constraint \"users_username_key\"");
            }
        }
        let Some(current) = rows.get(&id) else {
            return Ok(None);
        };
        // Apply to a copy so a bad column leaves the stored row untouched.
        let mut next = current.clone();
        for (column, value) in fields {
            next.set_column(*column, value)?;
        }
        next.updated_at = OffsetDateTime::now_utc();
        rows.insert(id, next.clone());
        Ok(Some(next))
    }

    async fn delete_many(&self, filter: &Filter) -> anyhow::Result<bool> {
        let mut rows = self.rows.write().await;
        rows.retain(|_, u| !filter.matches(u));
        Ok(true)
    }
}
