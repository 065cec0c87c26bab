//! In-memory record collections: trainers, batches, and topics.
//!
//! Records are free-form JSON objects. The collection assigns `_id`; callers
//! decide which other fields are required or protected.

use std::sync::Arc;

use common::ServiceError;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::credentials::PasswordDigest;

/// A stored record.
pub type Record = Map<String, Value>;

/// Field holding the generated record id.
pub const ID_FIELD: &str = "_id";

/// Field naming the trainer that owns a batch or topic.
pub const OWNER_FIELD: &str = "trainerId";

/// Read a required, non-blank string field.
pub fn required_str<'a>(fields: &'a Record, name: &str) -> Result<&'a str, ServiceError> {
    match fields.get(name).and_then(Value::as_str) {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ServiceError::BadRequest(format!("{name} is required"))),
    }
}

fn id_of(record: &Record) -> Option<&str> {
    record.get(ID_FIELD).and_then(Value::as_str)
}

/// Copy `patch` into `record`, skipping `_id` and any `protected` field.
fn merge(record: &mut Record, patch: Record, protected: &[&str]) {
    for (k, v) in patch {
        if k == ID_FIELD || protected.contains(&k.as_str()) {
            continue;
        }
        record.insert(k, v);
    }
}

/// Ordered collection of records, shared between handlers.
#[derive(Clone, Debug, Default)]
pub struct Collection {
    inner: Arc<RwLock<Vec<Record>>>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `fields` under a fresh `_id` and return the stored record.
    pub async fn insert(&self, fields: Record) -> Record {
        let mut record = Record::new();
        record.insert(ID_FIELD.into(), Value::String(Uuid::new_v4().to_string()));
        merge(&mut record, fields, &[]);
        self.inner.write().await.push(record.clone());
        record
    }

    /// Every record, in insertion order.
    pub async fn all(&self) -> Vec<Record> {
        self.inner.read().await.clone()
    }

    /// Records whose string `field` equals `value`.
    pub async fn matching(&self, field: &str, value: &str) -> Vec<Record> {
        self.inner
            .read()
            .await
            .iter()
            .filter(|r| r.get(field).and_then(Value::as_str) == Some(value))
            .cloned()
            .collect()
    }

    pub async fn get(&self, id: &str) -> Option<Record> {
        self.inner
            .read()
            .await
            .iter()
            .find(|r| id_of(r) == Some(id))
            .cloned()
    }

    /// Merge `patch` into record `id` once `check` approves the current record.
    ///
    /// # Errors
    ///
    /// [`ServiceError::NotFound`] if there is no such record, or whatever
    /// `check` returns.
    pub async fn update<F>(
        &self,
        id: &str,
        patch: Record,
        protected: &[&str],
        check: F,
    ) -> Result<Record, ServiceError>
    where
        F: FnOnce(&Record) -> Result<(), ServiceError>,
    {
        let mut guard = self.inner.write().await;
        let record = guard
            .iter_mut()
            .find(|r| id_of(r) == Some(id))
            .ok_or_else(|| ServiceError::NotFound(format!("{id} not found")))?;
        check(&*record)?;
        merge(record, patch, protected);
        Ok(record.clone())
    }

    /// Remove record `id` once `check` approves it.
    pub async fn remove<F>(&self, id: &str, check: F) -> Result<Record, ServiceError>
    where
        F: FnOnce(&Record) -> Result<(), ServiceError>,
    {
        let mut guard = self.inner.write().await;
        let pos = guard
            .iter()
            .position(|r| id_of(r) == Some(id))
            .ok_or_else(|| ServiceError::NotFound(format!("{id} not found")))?;
        check(&guard[pos])?;
        Ok(guard.remove(pos))
    }

    /// Remove every record whose string `field` equals `value`.
    pub async fn remove_matching(&self, field: &str, value: &str) -> usize {
        let mut guard = self.inner.write().await;
        let before = guard.len();
        guard.retain(|r| r.get(field).and_then(Value::as_str) != Some(value));
        before - guard.len()
    }
}

/// Require that `record` is owned by `trainer_id`.
pub fn owned_by(record: &Record, trainer_id: &str) -> Result<(), ServiceError> {
    if record.get(OWNER_FIELD).and_then(Value::as_str) == Some(trainer_id) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden)
    }
}

// ---------------------------------------------------------------------------
// Trainers
// ---------------------------------------------------------------------------

/// Field trainers log in with.
pub const LOGIN_FIELD: &str = "empId";
const PASSWORD_FIELD: &str = "password";
const STATUS_FIELD: &str = "status";
const INACTIVE: &str = "inactive";

#[derive(Debug, Clone)]
struct Trainer {
    record: Record,
    digest: PasswordDigest,
}

impl Trainer {
    fn id(&self) -> Option<&str> {
        id_of(&self.record)
    }

    fn login(&self) -> Option<&str> {
        self.record.get(LOGIN_FIELD).and_then(Value::as_str)
    }
}

/// Trainer accounts: profile records plus password digests.
///
/// The password is split off on write and never returned.
#[derive(Clone, Debug, Default)]
pub struct TrainerDirectory {
    inner: Arc<RwLock<Vec<Trainer>>>,
}

impl TrainerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a trainer from `fields` (`empId` and `password` required).
    ///
    /// # Errors
    ///
    /// [`ServiceError::BadRequest`] for missing fields,
    /// [`ServiceError::Conflict`] if the `empId` is taken.
    pub async fn create(&self, mut fields: Record) -> Result<Record, ServiceError> {
        let login = required_str(&fields, LOGIN_FIELD)?.to_owned();
        let digest = PasswordDigest::hash(required_str(&fields, PASSWORD_FIELD)?)?;
        fields.remove(PASSWORD_FIELD);

        let mut record = Record::new();
        record.insert(ID_FIELD.into(), Value::String(Uuid::new_v4().to_string()));
        merge(&mut record, fields, &[]);
        record
            .entry(STATUS_FIELD)
            .or_insert_with(|| Value::String("active".into()));

        let mut guard = self.inner.write().await;
        if guard.iter().any(|t| t.login() == Some(login.as_str())) {
            return Err(ServiceError::Conflict(format!("{LOGIN_FIELD} already exists")));
        }
        guard.push(Trainer {
            record: record.clone(),
            digest,
        });
        Ok(record)
    }

    /// Check login credentials and return the trainer's record.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Unauthorized`] for unknown `empId` or wrong password,
    /// [`ServiceError::Forbidden`] if the account is inactive.
    pub async fn authenticate(&self, login: &str, password: &str) -> Result<Record, ServiceError> {
        let guard = self.inner.read().await;
        let trainer = guard
            .iter()
            .find(|t| t.login() == Some(login))
            .ok_or(ServiceError::Unauthorized)?;
        if !trainer.digest.verify(password) {
            return Err(ServiceError::Unauthorized);
        }
        if trainer.record.get(STATUS_FIELD).and_then(Value::as_str) == Some(INACTIVE) {
            return Err(ServiceError::Forbidden);
        }
        Ok(trainer.record.clone())
    }

    pub async fn list(&self) -> Vec<Record> {
        self.inner
            .read()
            .await
            .iter()
            .map(|t| t.record.clone())
            .collect()
    }

    pub async fn get(&self, id: &str) -> Option<Record> {
        self.inner
            .read()
            .await
            .iter()
            .find(|t| t.id() == Some(id))
            .map(|t| t.record.clone())
    }

    /// Apply `patch` to trainer `id`. A `password` field resets the digest.
    ///
    /// # Errors
    ///
    /// [`ServiceError::NotFound`], [`ServiceError::BadRequest`] for a blank
    /// password, [`ServiceError::Conflict`] if a new `empId` is taken.
    pub async fn update(&self, id: &str, mut patch: Record) -> Result<Record, ServiceError> {
        let digest = match patch.remove(PASSWORD_FIELD) {
            Some(Value::String(p)) if !p.trim().is_empty() => Some(PasswordDigest::hash(&p)?),
            Some(_) => {
                return Err(ServiceError::BadRequest(format!(
                    "{PASSWORD_FIELD} must be a non-empty string"
                )))
            }
            None => None,
        };
        if let Some(v) = patch.get(LOGIN_FIELD) {
            if v.as_str().map_or(true, |s| s.trim().is_empty()) {
                return Err(ServiceError::BadRequest(format!("{LOGIN_FIELD} is required")));
            }
        }

        let mut guard = self.inner.write().await;
        if let Some(new_login) = patch.get(LOGIN_FIELD).and_then(Value::as_str) {
            if guard
                .iter()
                .any(|t| t.login() == Some(new_login) && t.id() != Some(id))
            {
                return Err(ServiceError::Conflict(format!("{LOGIN_FIELD} already exists")));
            }
        }
        let trainer = guard
            .iter_mut()
            .find(|t| t.id() == Some(id))
            .ok_or_else(|| ServiceError::NotFound("Trainer not found".into()))?;
        merge(&mut trainer.record, patch, &[]);
        if let Some(digest) = digest {
            trainer.digest = digest;
        }
        Ok(trainer.record.clone())
    }

    pub async fn remove(&self, id: &str) -> Result<Record, ServiceError> {
        let mut guard = self.inner.write().await;
        let pos = guard
            .iter()
            .position(|t| t.id() == Some(id))
            .ok_or_else(|| ServiceError::NotFound("Trainer not found".into()))?;
        Ok(guard.remove(pos).record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(v: Value) -> Record {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[tokio::test]
    async fn insert_assigns_id_and_ignores_supplied_one() {
        let c = Collection::new();
        let r = c.insert(rec(json!({"_id": "forged", "batchCode": "B1"}))).await;
        let id = r[ID_FIELD].as_str().unwrap();
        assert_ne!(id, "forged");
        assert_eq!(c.get(id).await.unwrap()["batchCode"], "B1");
    }

    #[tokio::test]
    async fn update_keeps_protected_fields() {
        let c = Collection::new();
        let r = c.insert(rec(json!({"trainerId": "t-1", "batchCode": "B1"}))).await;
        let id = r[ID_FIELD].as_str().unwrap();
        let updated = c
            .update(
                id,
                rec(json!({"_id": "x", "trainerId": "t-2", "batchCode": "B2"})),
                &[OWNER_FIELD],
                |r| owned_by(r, "t-1"),
            )
            .await
            .unwrap();
        assert_eq!(updated[ID_FIELD], id);
        assert_eq!(updated[OWNER_FIELD], "t-1");
        assert_eq!(updated["batchCode"], "B2");
    }

    #[tokio::test]
    async fn update_rejected_by_check_leaves_record() {
        let c = Collection::new();
        let r = c.insert(rec(json!({"trainerId": "t-1", "batchCode": "B1"}))).await;
        let id = r[ID_FIELD].as_str().unwrap();
        let err = c
            .update(id, rec(json!({"batchCode": "B2"})), &[], |r| owned_by(r, "t-2"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden));
        assert_eq!(c.get(id).await.unwrap()["batchCode"], "B1");
    }

    #[tokio::test]
    async fn missing_record_is_not_found() {
        let c = Collection::new();
        let err = c.remove("nope", |_| Ok(())).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn remove_matching_counts() {
        let c = Collection::new();
        c.insert(rec(json!({"batchId": "b1"}))).await;
        c.insert(rec(json!({"batchId": "b1"}))).await;
        c.insert(rec(json!({"batchId": "b2"}))).await;
        assert_eq!(c.remove_matching("batchId", "b1").await, 2);
        assert_eq!(c.all().await.len(), 1);
    }

    #[tokio::test]
    async fn trainer_password_is_never_stored_in_record() {
        let d = TrainerDirectory::new();
        let r = d
            .create(rec(json!({"empId": "E1", "password": "pw", "name": "Asha"})))
            .await
            .unwrap();
        assert!(r.get("password").is_none());
        assert_eq!(r["status"], "active");
        assert!(d.list().await.iter().all(|t| t.get("password").is_none()));
    }

    #[tokio::test]
    async fn trainer_authenticates_with_emp_id() {
        let d = TrainerDirectory::new();
        d.create(rec(json!({"empId": "E1", "password": "pw"}))).await.unwrap();
        assert!(d.authenticate("E1", "pw").await.is_ok());
        assert!(matches!(
            d.authenticate("E1", "bad").await,
            Err(ServiceError::Unauthorized)
        ));
        assert!(matches!(
            d.authenticate("E2", "pw").await,
            Err(ServiceError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn duplicate_emp_id_conflicts() {
        let d = TrainerDirectory::new();
        d.create(rec(json!({"empId": "E1", "password": "pw"}))).await.unwrap();
        let err = d
            .create(rec(json!({"empId": "E1", "password": "other"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn inactive_trainer_cannot_log_in() {
        let d = TrainerDirectory::new();
        let r = d.create(rec(json!({"empId": "E1", "password": "pw"}))).await.unwrap();
        let id = r[ID_FIELD].as_str().unwrap();
        d.update(id, rec(json!({"status": "inactive"}))).await.unwrap();
        assert!(matches!(
            d.authenticate("E1", "pw").await,
            Err(ServiceError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn password_update_replaces_digest() {
        let d = TrainerDirectory::new();
        let r = d.create(rec(json!({"empId": "E1", "password": "old"}))).await.unwrap();
        let id = r[ID_FIELD].as_str().unwrap();
        d.update(id, rec(json!({"password": "new"}))).await.unwrap();
        assert!(d.authenticate("E1", "old").await.is_err());
        assert!(d.authenticate("E1", "new").await.is_ok());
    }

    #[tokio::test]
    async fn create_requires_password() {
        let d = TrainerDirectory::new();
        let err = d.create(rec(json!({"empId": "E1"}))).await.unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(ref m) if m.contains("password")));
    }
}
