//! Replay protection for mutating ledger calls.
//!
//! A caller may attach an `Idempotency-Key` to Add, Subtract or Transfer. The
//! first committed call stores its result under (caller, operation, key) in the
//! same transaction as the stock movement; later calls with the same key and the
//! same command get the stored result back and move nothing. Reusing a key for a
//! different command is a `Conflict`.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::CallerId;
use crate::db::is_unique_violation;
use crate::entities::idempotency_key;
use crate::errors::ServiceError;

/// Header carrying the client-chosen key
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

const MAX_KEY_LEN: usize = 255;

/// Where a stored result lives: who asked, for which operation, under which key.
#[derive(Debug, Clone)]
pub struct IdempotencyScope {
    pub caller: CallerId,
    pub operation: &'static str,
    pub key: String,
    /// Fingerprint of the command the key was sent with
    pub request_hash: String,
}

impl IdempotencyScope {
    pub fn new<R: Serialize>(
        caller: CallerId,
        operation: &'static str,
        request: &R,
        key: Option<String>,
    ) -> Result<Option<Self>, ServiceError> {
        let Some(key) = key.map(|k| k.trim().to_string()) else {
            return Ok(None);
        };
        if key.is_empty() || key.len() > MAX_KEY_LEN {
            return Err(ServiceError::ValidationError(format!(
                "Idempotency-Key must be between 1 and {} characters",
                MAX_KEY_LEN
            )));
        }
        Ok(Some(Self {
            caller,
            operation,
            key,
            request_hash: fingerprint(request)?,
        }))
    }

    /// The stored result for this scope, if an earlier call committed one.
    pub async fn replay<T, C>(&self, conn: &C) -> Result<Option<T>, ServiceError>
    where
        T: DeserializeOwned,
        C: ConnectionTrait,
    {
        let stored = idempotency_key::Entity::find()
            .filter(idempotency_key::Column::CallerId.eq(self.caller.as_uuid()))
            .filter(idempotency_key::Column::Operation.eq(self.operation))
            .filter(idempotency_key::Column::IdempotencyKey.eq(self.key.as_str()))
            .one(conn)
            .await?;

        match stored {
            Some(row) if row.request_hash != self.request_hash => {
                warn!(operation = self.operation, key = %self.key, "idempotency key reused with a different request");
                Err(ServiceError::Conflict(
                    "Idempotency-Key was already used with a different request".into(),
                ))
            }
            Some(row) => {
                debug!(operation = self.operation, key = %self.key, "replaying stored result");
                Ok(Some(serde_json::from_value(row.response)?))
            }
            None => Ok(None),
        }
    }

    /// Record `result` for this scope. A concurrent call that already stored
    /// the same key surfaces as `Conflict`.
    pub async fn remember<T, C>(&self, conn: &C, result: &T) -> Result<(), ServiceError>
    where
        T: Serialize,
        C: ConnectionTrait,
    {
        let row = idempotency_key::ActiveModel {
            id: Set(Uuid::new_v4()),
            caller_id: Set(self.caller.as_uuid()),
            operation: Set(self.operation.to_string()),
            idempotency_key: Set(self.key.clone()),
            request_hash: Set(self.request_hash.clone()),
            response: Set(serde_json::to_value(result)?),
            created_at: Set(Utc::now()),
        };

        row.insert(conn).await.map(|_| ()).map_err(|err| {
            if is_unique_violation(&err) {
                warn!(operation = self.operation, key = %self.key, "concurrent request with same idempotency key");
                ServiceError::Conflict(
                    "A request with this Idempotency-Key is already being processed".into(),
                )
            } else {
                ServiceError::db_error(err)
            }
        })
    }
}

fn fingerprint<R: Serialize>(request: &R) -> Result<String, ServiceError> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(request)?);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn absent_key_means_no_scope() {
        let scope =
            IdempotencyScope::new(CallerId(Uuid::new_v4()), "inventory.add", &"cmd", None).unwrap();
        assert!(scope.is_none());
    }

    #[test]
    fn key_is_trimmed_and_bounded() {
        let caller = CallerId(Uuid::new_v4());
        let scope = IdempotencyScope::new(caller, "inventory.add", &"cmd", Some("  abc ".into()))
            .unwrap()
            .unwrap();
        assert_eq!(scope.key, "abc");
        assert_eq!(scope.request_hash.len(), 64);

        assert_matches!(
            IdempotencyScope::new(caller, "inventory.add", &"cmd", Some("   ".into())),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            IdempotencyScope::new(caller, "inventory.add", &"cmd", Some("k".repeat(256))),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn fingerprint_follows_the_command() {
        let caller = CallerId(Uuid::new_v4());
        let scope = |cmd: &str| {
            IdempotencyScope::new(caller, "inventory.add", &cmd, Some("k".into()))
                .unwrap()
                .unwrap()
                .request_hash
        };
        assert_eq!(scope("a"), scope("a"));
        assert_ne!(scope("a"), scope("b"));
    }
}
