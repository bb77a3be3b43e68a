use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::{
    diff::{diff, ChangeSet},
    dto::{CreateUserRequest, RecordOutcome, UpdateOutcome},
    errors::UserError,
    password::{Argon2Hasher, BasicComplexity, ComplexityCheck, CredentialHasher},
    policy::FieldPolicy,
    repo_types::{expose, PublicUser, User},
};
use crate::{
    config::AppConfig,
    store::{Column, FieldMap, FieldValue, Filter, NewUser, RecordStore},
};

/// Update pipeline stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetching,
    Filtering,
    Validating,
    PasswordHandling,
    Diffing,
    Persisting,
    Done,
}

/// User account operations. Cheap to clone; all shared parts are
/// immutable after construction.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn RecordStore>,
    hasher: Arc<dyn CredentialHasher>,
    complexity: Arc<dyn ComplexityCheck>,
    policy: Arc<FieldPolicy>,
    default_role: String,
}

impl UserService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        hasher: Arc<dyn CredentialHasher>,
        complexity: Arc<dyn ComplexityCheck>,
        policy: FieldPolicy,
        default_role: impl Into<String>,
    ) -> Self {
        Self {
            store,
            hasher,
            complexity,
            policy: Arc::new(policy),
            default_role: default_role.into(),
        }
    }

    pub fn from_config(config: &AppConfig, store: Arc<dyn RecordStore>) -> Result<Self, UserError> {
        let hasher = Arc::new(Argon2Hasher::new(&config.hashing)?);
        let complexity = Arc::new(BasicComplexity {
            min_length: config.password_min_length,
        });
        Ok(Self::new(
            store,
            hasher,
            complexity,
            FieldPolicy::standard(),
            config.default_role.clone(),
        ))
    }

    /// Hashes off the async runtime; the plaintext is wiped when the task ends.
    async fn hash_secret(&self, plain: Zeroizing<String>) -> Result<String, UserError> {
        let hasher = Arc::clone(&self.hasher);
        tokio::task::spawn_blocking(move || hasher.hash(&plain))
            .await
            .map_err(|e| UserError::Credential(format!("hashing task failed: {e}")))?
    }

    #[instrument(skip(self, req), fields(username = %req.username))]
    pub async fn create(&self, req: CreateUserRequest) -> RecordOutcome {
        match self.try_create(req).await {
            Ok(user) => {
                info!(user_id = %user.id, role = %user.role, "user created");
                RecordOutcome::ok(expose(user))
            }
            Err(e) => {
                log_failure(&e, "create user failed");
                RecordOutcome::failed(&e)
            }
        }
    }

    async fn try_create(&self, req: CreateUserRequest) -> Result<User, UserError> {
        let CreateUserRequest {
            username,
            password,
            role,
        } = req;
        let password = Zeroizing::new(password);
        let role = role.unwrap_or_else(|| self.default_role.clone());

        self.policy.check("username", &Value::String(username.clone()))?;
        self.policy.check("role", &Value::String(role.clone()))?;

        let password_hash = self.hash_secret(password).await?;
        self.store
            .insert(NewUser {
                username,
                password_hash,
                role,
            })
            .await
            .map_err(UserError::Store)
    }

    /// Applies a caller-supplied update through the field policy.
    #[instrument(skip(self, input), fields(user_id = %id))]
    pub async fn update(&self, id: Uuid, input: &Map<String, Value>) -> UpdateOutcome {
        let mut run = UpdateRun {
            service: self,
            id,
            stage: Stage::Fetching,
        };
        match run.execute(input).await {
            Ok(changes) => {
                info!(user_id = %id, ?changes, "user updated");
                UpdateOutcome::done(changes)
            }
            Err(e) => {
                match &e {
                    UserError::Store(_) | UserError::Credential(_) => {
                        error!(user_id = %id, stage = ?run.stage, error = %e, "update user failed")
                    }
                    _ => warn!(user_id = %id, stage = ?run.stage, code = e.code(), error = %e, "update user rejected"),
                }
                UpdateOutcome::failed(&e)
            }
        }
    }

    /// Writes `values` verbatim, without policy filtering or validation.
    /// Only for system-initiated changes; not routed from HTTP.
    // No in-process caller yet; kept for system jobs.
    #[allow(dead_code)]
    #[instrument(skip(self, values), fields(user_id = %id))]
    pub async fn direct_set(&self, id: Uuid, values: FieldMap) -> RecordOutcome {
        match self.try_direct_set(id, &values).await {
            Ok(user) => {
                let columns: Vec<Column> = values.keys().copied().collect();
                info!(user_id = %id, ?columns, "user fields set directly");
                RecordOutcome::ok(expose(user))
            }
            Err(e) => {
                log_failure(&e, "direct set failed");
                RecordOutcome::failed(&e)
            }
        }
    }

    async fn try_direct_set(&self, id: Uuid, values: &FieldMap) -> Result<User, UserError> {
        if values.is_empty() {
            return Err(UserError::EmptyUpdate);
        }
        if values.contains_key(&Column::Id) {
            return Err(UserError::validation("id", "is immutable"));
        }
        self.store
            .update_by_id(id, values)
            .await
            .map_err(UserError::Store)?
            .ok_or(UserError::NotFound)
    }

    pub async fn get_one(&self, filter: &Filter) -> Option<PublicUser> {
        self.get_one_raw(filter).await.map(expose)
    }

    /// Full record including the password hash. Internal callers only.
    pub async fn get_one_raw(&self, filter: &Filter) -> Option<User> {
        match self.store.fetch_one(filter).await {
            Ok(user) => user,
            Err(e) => {
                error!(error = ?e, "fetch user failed");
                None
            }
        }
    }

    pub async fn list_where(&self, filter: &Filter, limit: Option<i64>) -> Vec<PublicUser> {
        match self.store.fetch_many(filter, limit).await {
            Ok(users) => users.into_iter().map(expose).collect(),
            Err(e) => {
                error!(error = ?e, "list users failed");
                Vec::new()
            }
        }
    }

    pub async fn count_where(&self, filter: &Filter) -> i64 {
        match self.store.count(filter).await {
            Ok(n) => n,
            Err(e) => {
                error!(error = ?e, "count users failed");
                0
            }
        }
    }

    #[instrument(skip(self, filter))]
    pub async fn delete_where(&self, filter: &Filter) -> bool {
        match self.store.delete_many(filter).await {
            Ok(ok) => {
                info!(columns = ?filter.columns(), "users deleted");
                ok
            }
            Err(e) => {
                error!(error = ?e, "delete users failed");
                false
            }
        }
    }
}

fn log_failure(err: &UserError, msg: &str) {
    match err {
        UserError::Store(_) | UserError::Credential(_) => error!(error = %err, "{msg}"),
        _ => warn!(code = err.code(), error = %err, "{msg}"),
    }
}

/// One pass through the update pipeline for a single record.
struct UpdateRun<'a> {
    service: &'a UserService,
    id: Uuid,
    stage: Stage,
}

impl UpdateRun<'_> {
    fn enter(&mut self, stage: Stage) {
        debug!(user_id = %self.id, ?stage, "update stage");
        self.stage = stage;
    }

    async fn execute(&mut self, input: &Map<String, Value>) -> Result<ChangeSet, UserError> {
        let svc = self.service;

        self.enter(Stage::Fetching);
        let current = svc
            .store
            .fetch_one(&Filter::by_id(self.id))
            .await
            .map_err(UserError::Store)?
            .ok_or(UserError::NotFound)?;

        self.enter(Stage::Filtering);
        let (mut fields, dropped) = svc.policy.project(input);
        if !dropped.is_empty() {
            debug!(user_id = %self.id, ?dropped, "dropped non-writable fields");
        }
        if fields.is_empty() {
            return Err(UserError::EmptyUpdate);
        }

        self.enter(Stage::Validating);
        svc.policy.validate(&fields)?;

        // `password` is the only key mapped onto the hash column.
        if let Some(secret) = fields.remove(&Column::PasswordHash) {
            self.enter(Stage::PasswordHandling);
            let FieldValue::Text(plain) = secret else {
                return Err(UserError::validation("password", "must be a string"));
            };
            let plain = Zeroizing::new(plain);
            svc.complexity.check(&plain)?;
            let hash = svc.hash_secret(plain).await?;
            fields.insert(Column::PasswordHash, FieldValue::Text(hash));
        }

        self.enter(Stage::Diffing);
        let changes = diff(&current, &fields);

        self.enter(Stage::Persisting);
        svc.store
            .update_by_id(self.id, &fields)
            .await
            .map_err(UserError::Store)?
            .ok_or(UserError::NotFound)?;

        self.enter(Stage::Done);
        Ok(changes)
    }
}
