use serde::{Deserialize, Serialize};

use super::diff::ChangeSet;
use super::errors::UserError;
use super::repo_types::PublicUser;

/// Request body for user creation.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<String>,
}

/// Result of `update`. Never an `Err`; failures carry a code and message.
#[derive(Debug, Serialize)]
pub struct UpdateOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<ChangeSet>,
}

impl UpdateOutcome {
    pub fn done(changes: ChangeSet) -> Self {
        Self {
            success: true,
            error: None,
            code: None,
            changes: Some(changes),
        }
    }

    pub fn failed(err: &UserError) -> Self {
        Self {
            success: false,
            error: Some(err.public_message()),
            code: Some(err.code()),
            changes: None,
        }
    }
}

/// Result of `create` and `direct_set`: a secret-stripped record or an error.
#[derive(Debug, Serialize)]
pub struct RecordOutcome {
    pub record: Option<PublicUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

impl RecordOutcome {
    pub fn ok(record: PublicUser) -> Self {
        Self {
            record: Some(record),
            error: None,
            code: None,
        }
    }

    pub fn failed(err: &UserError) -> Self {
        Self {
            record: None,
            error: Some(err.public_message()),
            code: Some(err.code()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
}
