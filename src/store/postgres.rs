use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{FieldMap, FieldValue, Filter, NewUser, RecordStore};
use crate::users::repo_types::User;

const USER_COLUMNS: &str =
    "id, username, password_hash, role, profile_image, suspended, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn push_value(qb: &mut QueryBuilder<'_, Postgres>, value: &FieldValue) {
    match value {
        FieldValue::Uuid(u) => qb.push_bind(*u),
        FieldValue::Text(s) => qb.push_bind(s.clone()),
        FieldValue::Int(n) => qb.push_bind(*n),
    };
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &Filter) {
    for (i, (column, value)) in filter.iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        qb.push(column.as_str()).push(" = ");
        push_value(qb, value);
    }
}

fn select_query(filter: &Filter, limit: Option<i64>) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users"));
    push_filter(&mut qb, filter);
    qb.push(" ORDER BY created_at ASC");
    if let Some(limit) = limit {
        qb.push(" LIMIT ").push_bind(limit);
    }
    qb
}

fn update_query(id: Uuid, fields: &FieldMap) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("UPDATE users SET ");
    for (column, value) in fields {
        qb.push(column.as_str()).push(" = ");
        push_value(&mut qb, value);
        qb.push(", ");
    }
    qb.push("updated_at = now() WHERE id = ").push_bind(id);
    qb.push(format!(" RETURNING {USER_COLUMNS}"));
    qb
}

#[async_trait]
impl RecordStore for PgStore {
    async fn fetch_one(&self, filter: &Filter) -> anyhow::Result<Option<User>> {
        let mut qb = select_query(filter, Some(1));
        let user = qb
            .build_query_as::<User>()
            .fetch_optional(&self.db)
            .await
            .context("fetch user")?;
        Ok(user)
    }

    async fn fetch_many(&self, filter: &Filter, limit: Option<i64>) -> anyhow::Result<Vec<User>> {
        let mut qb = select_query(filter, limit);
        let users = qb
            .build_query_as::<User>()
            .fetch_all(&self.db)
            .await
            .context("fetch users")?;
        Ok(users)
    }

    async fn count(&self, filter: &Filter) -> anyhow::Result<i64> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM users");
        push_filter(&mut qb, filter);
        let (n,): (i64,) = qb
            .build_query_as()
            .fetch_one(&self.db)
            .await
            .context("count users")?;
        Ok(n)
    }

    async fn insert(&self, new: NewUser) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, password_hash, role)
            VALUES ($1, $2, $3)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new.username)
        .bind(&new.password_hash)
        .bind(&new.role)
        .fetch_one(&self.db)
        .await
        .context("insert user")?;
        Ok(user)
    }

    async fn update_by_id(&self, id: Uuid, fields: &FieldMap) -> anyhow::Result<Option<User>> {
        anyhow::ensure!(!fields.is_empty(), "no columns to update");
        let mut qb = update_query(id, fields);
        let user = qb
            .build_query_as::<User>()
            .fetch_optional(&self.db)
            .await
            .context("update user")?;
        Ok(user)
    }

    async fn delete_many(&self, filter: &Filter) -> anyhow::Result<bool> {
        let mut qb = QueryBuilder::new("DELETE FROM users");
        push_filter(&mut qb, filter);
        qb.build().execute(&self.db).await.context("delete users")?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Column;

    #[test]
    fn select_renders_parameterised_equality() {
        let filter = Filter::new()
            .with(Column::Username, "bob")
            .with(Column::Suspended, FieldValue::Int(0));
        let qb = select_query(&filter, Some(5));
        assert_eq!(
            qb.sql(),
            format!(
                "SELECT {USER_COLUMNS} FROM users WHERE username = $1 AND suspended = $2 \
                 ORDER BY created_at ASC LIMIT $3"
            )
        );
    }

    #[test]
    fn select_without_filter_has_no_where() {
        let qb = select_query(&Filter::new(), None);
        assert!(!qb.sql().contains("WHERE"));
        assert!(!qb.sql().contains("LIMIT"));
    }

    #[test]
    fn update_sets_only_given_columns_and_touches_updated_at() {
        let mut fields = FieldMap::new();
        fields.insert(Column::Role, "admin".into());
        fields.insert(Column::Suspended, FieldValue::Int(1));
        let qb = update_query(Uuid::new_v4(), &fields);
        assert_eq!(
            qb.sql(),
            format!(
                "UPDATE users SET role = $1, suspended = $2, updated_at = now() \
                 WHERE id = $3 RETURNING {USER_COLUMNS}"
            )
        );
    }
}
