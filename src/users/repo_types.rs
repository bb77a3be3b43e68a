use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::store::{Column, FieldValue};

/// User record as persisted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,        // Argon2 PHC string, never exposed
    pub role: String,
    pub profile_image: Option<String>,
    pub suspended: i32,               // 0 or 1
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    /// Current stored value of `column`; `None` for SQL NULL.
    pub fn column_value(&self, column: Column) -> Option<FieldValue> {
        match column {
            Column::Id => Some(FieldValue::Uuid(self.id)),
            Column::Username => Some(FieldValue::Text(self.username.clone())),
            Column::PasswordHash => Some(FieldValue::Text(self.password_hash.clone())),
            Column::Role => Some(FieldValue::Text(self.role.clone())),
            Column::ProfileImage => self.profile_image.clone().map(FieldValue::Text),
            Column::Suspended => Some(FieldValue::Int(self.suspended)),
        }
    }

    /// Writes one column in place, rejecting values of the wrong kind.
    pub fn set_column(&mut self, column: Column, value: &FieldValue) -> anyhow::Result<()> {
        match (column, value) {
            (Column::Id, _) => anyhow::bail!("column `id` is immutable"),
            (Column::Username, FieldValue::Text(s)) => self.username = s.clone(),
            (Column::PasswordHash, FieldValue::Text(s)) => self.password_hash = s.clone(),
            (Column::Role, FieldValue::Text(s)) => self.role = s.clone(),
            (Column::ProfileImage, FieldValue::Text(s)) => self.profile_image = Some(s.clone()),
            (Column::Suspended, FieldValue::Int(n)) => self.suspended = *n,
            (col, v) => anyhow::bail!("invalid value {v:?} for column `{col}`"),
        }
        Ok(())
    }
}

/// Secret-stripped user, the only shape that leaves the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub role: String,
    pub profile_image: Option<String>,
    pub suspended: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Drops the password hash and keeps everything else.
pub fn expose(user: User) -> PublicUser {
    let User {
        id,
        username,
        password_hash: _,
        role,
        profile_image,
        suspended,
        created_at,
        updated_at,
    } = user;
    PublicUser {
        id,
        username,
        role,
        profile_image,
        suspended,
        created_at,
        updated_at,
    }
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        expose(user)
    }
}

#[cfg(test)]
pub(crate) fn sample_user(username: &str) -> User {
    let now = OffsetDateTime::now_utc();
    User {
        id: Uuid::new_v4(),
        username: username.into(),
        password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".into(),
        role: "default".into(),
        profile_image: None,
        suspended: 0,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expose_strips_hash_and_keeps_fields() {
        let user = sample_user("alice");
        let id = user.id;
        let public = expose(user);
        assert_eq!(public.id, id);
        assert_eq!(public.username, "alice");

        let json = serde_json::to_string(&public).unwrap();
        assert!(!json.contains("password"));
        assert!(!json.contains("argon2"));
    }

    #[test]
    fn raw_user_never_serializes_hash() {
        let json = serde_json::to_value(sample_user("bob")).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["username"], "bob");
    }

    #[test]
    fn set_column_refuses_id_and_mismatched_kinds() {
        let mut user = sample_user("carol");
        assert!(user.set_column(Column::Id, &FieldValue::Uuid(Uuid::new_v4())).is_err());
        assert!(user.set_column(Column::Suspended, &FieldValue::Text("1".into())).is_err());
        user.set_column(Column::Suspended, &FieldValue::Int(1)).unwrap();
        assert_eq!(user.suspended, 1);
        user.set_column(Column::ProfileImage, &"img/1.png".into()).unwrap();
        assert_eq!(
            user.column_value(Column::ProfileImage),
            Some(FieldValue::Text("img/1.png".into()))
        );
    }
}
