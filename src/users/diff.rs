use std::collections::BTreeMap;

use crate::store::{Column, FieldMap};

use super::repo_types::User;

/// Columns that never appear in an audit change set.
pub const SENSITIVE_COLUMNS: &[Column] = &[Column::PasswordHash];

/// Redacted `column -> "before => after"` description of an update.
pub type ChangeSet = BTreeMap<String, String>;

/// Lists the columns whose value in `updates` differs from `previous`.
/// Sensitive columns are skipped whether or not they changed.
pub fn diff(previous: &User, updates: &FieldMap) -> ChangeSet {
    updates
        .iter()
        .filter(|(column, _)| !SENSITIVE_COLUMNS.contains(*column))
        .filter_map(|(column, next)| {
            let before = previous.column_value(*column);
            if before.as_ref() == Some(next) {
                return None;
            }
            let before = before.map(|v| v.to_string()).unwrap_or_default();
            Some((column.to_string(), format!("{before} => {next}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FieldValue;
    use crate::users::repo_types::sample_user;

    #[test]
    fn only_changed_columns_are_listed() {
        let user = sample_user("alice");
        let mut updates = FieldMap::new();
        updates.insert(Column::Username, "alice".into());
        updates.insert(Column::Role, "admin".into());
        updates.insert(Column::Suspended, FieldValue::Int(1));

        let changes = diff(&user, &updates);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes["role"], "default => admin");
        assert_eq!(changes["suspended"], "0 => 1");
    }

    #[test]
    fn null_previous_renders_empty() {
        let user = sample_user("alice");
        let mut updates = FieldMap::new();
        updates.insert(Column::ProfileImage, "img/a.png".into());
        assert_eq!(diff(&user, &updates)["profile_image"], " => img/a.png");
    }

    #[test]
    fn password_hash_never_listed() {
        let user = sample_user("alice");
        let old_hash = user.password_hash.clone();
        let new_hash = "$argon2id$v=19$m=1024,t=1,p=1$bmV3$bmV3aGFzaA".to_string();
        let mut updates = FieldMap::new();
        updates.insert(Column::PasswordHash, new_hash.clone().into());
        updates.insert(Column::Role, "admin".into());

        let changes = diff(&user, &updates);
        assert_eq!(changes.len(), 1);
        for (k, v) in &changes {
            for secret in [&old_hash, &new_hash] {
                assert!(!k.contains(secret.as_str()) && !v.contains(secret.as_str()));
            }
            assert!(!k.contains("password"));
        }
    }
}
