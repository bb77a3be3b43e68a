use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use uuid::Uuid;

use crate::users::repo_types::User;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Stored columns of the `users` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Column {
    Id,
    Username,
    PasswordHash,
    Role,
    ProfileImage,
    Suspended,
}

impl Column {
    pub fn as_str(self) -> &'static str {
        match self {
            Column::Id => "id",
            Column::Username => "username",
            Column::PasswordHash => "password_hash",
            Column::Role => "role",
            Column::ProfileImage => "profile_image",
            Column::Suspended => "suspended",
        }
    }

    /// Columns a caller may filter on from outside the service.
    pub fn filterable(name: &str) -> Option<Column> {
        match name {
            "id" => Some(Column::Id),
            "username" => Some(Column::Username),
            "role" => Some(Column::Role),
            "profile_image" => Some(Column::ProfileImage),
            "suspended" => Some(Column::Suspended),
            _ => None,
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical stored representation of a single column value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Uuid(Uuid),
    Text(String),
    Int(i32),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Uuid(u) => write!(f, "{u}"),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Int(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i32> for FieldValue {
    fn from(n: i32) -> Self {
        FieldValue::Int(n)
    }
}

impl From<Uuid> for FieldValue {
    fn from(u: Uuid) -> Self {
        FieldValue::Uuid(u)
    }
}

/// Column -> value set handed to `update_by_id`.
pub type FieldMap = BTreeMap<Column, FieldValue>;

/// Conjunction of column equality predicates. Empty matches every record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter(BTreeMap<Column, FieldValue>);

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: Uuid) -> Self {
        Self::new().with(Column::Id, id)
    }

    pub fn with(mut self, column: Column, value: impl Into<FieldValue>) -> Self {
        self.0.insert(column, value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Column, &FieldValue)> {
        self.0.iter()
    }

    /// Column names only, for logging; values may be secret.
    pub fn columns(&self) -> Vec<Column> {
        self.0.keys().copied().collect()
    }

    pub fn matches(&self, user: &User) -> bool {
        self.0
            .iter()
            .all(|(col, want)| user.column_value(*col).as_ref() == Some(want))
    }

    /// Builds a filter from untrusted `column=value` pairs.
    pub fn from_pairs<'a, I>(pairs: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut filter = Self::new();
        for (key, raw) in pairs {
            let column = Column::filterable(key)
                .ok_or_else(|| anyhow::anyhow!("unknown filter field `{key}`"))?;
            let value = match column {
                Column::Id => FieldValue::Uuid(
                    raw.parse::<Uuid>()
                        .map_err(|_| anyhow::anyhow!("`id` must be a UUID"))?,
                ),
                Column::Suspended => FieldValue::Int(
                    raw.parse::<i32>()
                        .map_err(|_| anyhow::anyhow!("`suspended` must be 0 or 1"))?,
                ),
                _ => FieldValue::Text(raw.to_string()),
            };
            filter.0.insert(column, value);
        }
        Ok(filter)
    }
}

/// Values needed to insert a fresh record; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub role: String,
}

/// Persistence collaborator for user records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn fetch_one(&self, filter: &Filter) -> anyhow::Result<Option<User>>;
    async fn fetch_many(&self, filter: &Filter, limit: Option<i64>) -> anyhow::Result<Vec<User>>;
    async fn count(&self, filter: &Filter) -> anyhow::Result<i64>;
    async fn insert(&self, user: NewUser) -> anyhow::Result<User>;
    /// Applies `fields` in one atomic write. `Ok(None)` when the id is unknown.
    async fn update_by_id(&self, id: Uuid, fields: &FieldMap) -> anyhow::Result<Option<User>>;
    async fn delete_many(&self, filter: &Filter) -> anyhow::Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_from_pairs_parses_typed_columns() {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let filter = Filter::from_pairs([("id", id_str.as_str()), ("suspended", "1"), ("role", "admin")])
            .expect("valid filter");
        assert_eq!(
            filter,
            Filter::new()
                .with(Column::Id, id)
                .with(Column::Suspended, FieldValue::Int(1))
                .with(Column::Role, "admin")
        );
    }

    #[test]
    fn filter_columns_omit_values() {
        let filter = Filter::new()
            .with(Column::PasswordHash, "$argon2id$secret")
            .with(Column::Role, "admin");
        let columns = filter.columns();
        assert_eq!(columns, vec![Column::PasswordHash, Column::Role]);
        assert!(!format!("{columns:?}").contains("secret"));
    }

    #[test]
    fn filter_from_pairs_rejects_hash_and_unknown_columns() {
        assert!(Filter::from_pairs([("password_hash", "x")]).is_err());
        assert!(Filter::from_pairs([("email", "x")]).is_err());
        assert!(Filter::from_pairs([("id", "not-a-uuid")]).is_err());
    }
}
