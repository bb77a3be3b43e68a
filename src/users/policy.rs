use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::errors::UserError;
use crate::store::{Column, FieldMap, FieldValue};

pub const USERNAME_MIN_LEN: usize = 2;
pub const USERNAME_MAX_LEN: usize = 100;

/// Semantic check run on an already-coerced value.
pub type Validator = fn(&FieldValue) -> Result<(), String>;

/// How raw input becomes the stored representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    Text,
    /// 0/1 from truthiness.
    Flag,
    /// Text that must be hashed before it is stored.
    Secret,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub column: Column,
    pub coercion: Coercion,
    pub validator: Option<Validator>,
}

/// Writable input keys and their rules, fixed at start-up.
#[derive(Debug, Clone)]
pub struct FieldPolicy {
    rules: BTreeMap<&'static str, FieldRule>,
}

impl FieldPolicy {
    pub fn standard() -> Self {
        let mut rules = BTreeMap::new();
        rules.insert("username", FieldRule {
            column: Column::Username,
            coercion: Coercion::Text,
            validator: Some(validate_username),
        });
        rules.insert("password", FieldRule {
            column: Column::PasswordHash,
            coercion: Coercion::Secret,
            validator: None,
        });
        rules.insert("role", FieldRule {
            column: Column::Role,
            coercion: Coercion::Text,
            validator: None,
        });
        rules.insert("profile_image", FieldRule {
            column: Column::ProfileImage,
            coercion: Coercion::Text,
            validator: None,
        });
        rules.insert("suspended", FieldRule {
            column: Column::Suspended,
            coercion: Coercion::Flag,
            validator: None,
        });
        Self { rules }
    }

    /// Attaches (or replaces) the validator of a writable key. Unknown keys
    /// are ignored.
    // Extension point for embedders; the shipped binary uses `standard()` as is.
    #[allow(dead_code)]
    pub fn with_validator(mut self, key: &str, validator: Validator) -> Self {
        if let Some(rule) = self.rules.get_mut(key) {
            rule.validator = Some(validator);
        }
        self
    }

    #[cfg(test)]
    pub fn rule(&self, key: &str) -> Option<&FieldRule> {
        self.rules.get(key)
    }

    #[cfg(test)]
    pub fn is_writable(&self, key: &str) -> bool {
        self.rules.contains_key(key)
    }

    #[cfg(test)]
    pub fn writable_keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.keys().copied()
    }

    /// Keeps writable keys and coerces their values. Returns the projected
    /// field map and the names of dropped keys.
    pub fn project(&self, input: &Map<String, Value>) -> (FieldMap, Vec<String>) {
        let mut fields = FieldMap::new();
        let mut dropped = Vec::new();
        for (key, raw) in input {
            match self.rules.get(key.as_str()) {
                Some(rule) => {
                    fields.insert(rule.column, coerce(rule.coercion, raw));
                }
                None => dropped.push(key.clone()),
            }
        }
        (fields, dropped)
    }

    /// Runs every registered validator over `fields`; first failure wins.
    pub fn validate(&self, fields: &FieldMap) -> Result<(), UserError> {
        for (key, rule) in &self.rules {
            let (Some(validator), Some(value)) = (rule.validator, fields.get(&rule.column)) else {
                continue;
            };
            validator(value).map_err(|reason| UserError::validation(*key, reason))?;
        }
        Ok(())
    }

    /// Coerces and validates a single writable key.
    pub fn check(&self, key: &str, raw: &Value) -> Result<FieldValue, UserError> {
        let rule = self
            .rules
            .get(key)
            .ok_or_else(|| UserError::validation(key, "is not writable"))?;
        let value = coerce(rule.coercion, raw);
        if let Some(validator) = rule.validator {
            validator(&value).map_err(|reason| UserError::validation(key, reason))?;
        }
        Ok(value)
    }
}

pub fn coerce(kind: Coercion, raw: &Value) -> FieldValue {
    match kind {
        Coercion::Text | Coercion::Secret => FieldValue::Text(to_text(raw)),
        Coercion::Flag => FieldValue::Int(i32::from(is_truthy(raw))),
    }
}

fn to_text(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// `null`, `false`, numeric zero and the empty string are false; anything
/// else is true. Strings are not parsed, so `"0"` and `"false"` are true.
pub fn is_truthy(raw: &Value) -> bool {
    match raw {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn validate_username(value: &FieldValue) -> Result<(), String> {
    let FieldValue::Text(name) = value else {
        return Err("must be a string".into());
    };
    let len = name.chars().count();
    if len < USERNAME_MIN_LEN {
        return Err(format!("is too short (minimum {USERNAME_MIN_LEN} characters)"));
    }
    if len > USERNAME_MAX_LEN {
        return Err(format!("is too long (maximum {USERNAME_MAX_LEN} characters)"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn username_bounds() {
        let policy = FieldPolicy::standard();
        for len in [2, 3, 50, 99, 100] {
            assert!(policy.check("username", &json!("x".repeat(len))).is_ok(), "len {len}");
        }

        let short = policy.check("username", &json!("x")).unwrap_err();
        assert!(short.to_string().contains("too short"));
        assert!(short.to_string().contains("minimum 2"));

        let long = policy.check("username", &json!("x".repeat(101))).unwrap_err();
        assert!(long.to_string().contains("too long"));
    }

    #[test]
    fn username_length_counts_characters_not_bytes() {
        let policy = FieldPolicy::standard();
        assert!(policy.check("username", &json!("é".repeat(100))).is_ok());
    }

    #[test]
    fn truthiness_rule() {
        for falsy in [json!(null), json!(false), json!(0), json!(0.0), json!("")] {
            assert!(!is_truthy(&falsy), "{falsy} should be false");
        }
        for truthy in [
            json!(true),
            json!(1),
            json!(-3),
            json!("true"),
            json!("no"),
            json!("0"),
            json!("false"),
            json!("FALSE"),
            json!(" "),
            json!([]),
            json!({}),
        ] {
            assert!(is_truthy(&truthy), "{truthy} should be true");
        }
    }

    #[test]
    fn project_drops_non_writable_keys() {
        let policy = FieldPolicy::standard();
        let (fields, mut dropped) = policy.project(&input(json!({
            "id": "abc",
            "password_hash": "sneaky",
            "role": 7,
            "suspended": "true",
            "created_at": "now",
        })));
        dropped.sort();
        assert_eq!(dropped, vec!["created_at", "id", "password_hash"]);
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[&Column::Role], FieldValue::Text("7".into()));
        assert_eq!(fields[&Column::Suspended], FieldValue::Int(1));
        assert!(!fields.contains_key(&Column::PasswordHash));
    }

    #[test]
    fn null_text_becomes_empty_string() {
        let policy = FieldPolicy::standard();
        let (fields, _) = policy.project(&input(json!({ "profile_image": null, "role": 3 })));
        assert_eq!(fields[&Column::ProfileImage], FieldValue::Text(String::new()));
        assert_eq!(fields[&Column::Role], FieldValue::Text("3".into()));
    }

    #[test]
    fn password_key_maps_to_hash_column_as_text() {
        let policy = FieldPolicy::standard();
        let (fields, dropped) = policy.project(&input(json!({ "password": "s3cret-pass" })));
        assert!(dropped.is_empty());
        assert_eq!(policy.rule("password").unwrap().coercion, Coercion::Secret);
        assert_eq!(fields[&Column::PasswordHash], FieldValue::Text("s3cret-pass".into()));
    }

    #[test]
    fn validators_attach_without_pipeline_changes() {
        fn no_root(v: &FieldValue) -> Result<(), String> {
            match v {
                FieldValue::Text(s) if s == "root" => Err("is reserved".into()),
                _ => Ok(()),
            }
        }
        let policy = FieldPolicy::standard().with_validator("role", no_root);
        let (fields, _) = policy.project(&input(json!({ "role": "root" })));
        let err = policy.validate(&fields).unwrap_err();
        assert_eq!(err.to_string(), "role is reserved");
    }

    #[test]
    fn writable_set_is_closed() {
        let policy = FieldPolicy::standard();
        let keys: Vec<_> = policy.writable_keys().collect();
        assert_eq!(keys, vec!["password", "profile_image", "role", "suspended", "username"]);
        assert!(!policy.is_writable("password_hash"));
        assert!(!policy.is_writable("id"));
    }
}
