use sea_orm::entity::prelude::*;
use sea_orm::sea_query::SimpleExpr;
use sea_orm::{PrimaryKeyTrait, Select};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Logical lifecycle of products, locations and stock entries.
/// Rows are never physically removed; they move to `Deleted`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "deleted")]
    Deleted,
}

impl Lifecycle {
    pub fn is_active(self) -> bool {
        matches!(self, Lifecycle::Active)
    }
}

/// Entities carrying a `Lifecycle` column.
///
/// All "active rows only" filtering goes through these helpers so that
/// aggregation, uniqueness checks and reads agree on what is live.
pub trait SoftDelete: EntityTrait {
    fn status_column() -> Self::Column;

    fn active() -> SimpleExpr {
        Self::status_column().eq(Lifecycle::Active)
    }

    fn find_active() -> Select<Self> {
        Self::find().filter(Self::active())
    }

    fn find_active_by_id<T>(id: T) -> Select<Self>
    where
        T: Into<<Self::PrimaryKey as PrimaryKeyTrait>::ValueType>,
    {
        Self::find_by_id(id).filter(Self::active())
    }
}
