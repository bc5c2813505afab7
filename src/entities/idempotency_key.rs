use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Stored result of a mutating call made with an `Idempotency-Key`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "idempotency_keys")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub caller_id: Uuid,
    pub operation: String,
    pub idempotency_key: String,
    /// SHA-256 of the serialized command, hex encoded
    pub request_hash: String,
    pub response: Json,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
