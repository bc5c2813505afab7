use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::DatabaseAccess;
use crate::entities::{location, product, SoftDelete};
use crate::errors::ServiceError;
use crate::services::quantity::fixed;

/// Trailing window of the creation histogram, today included
pub const CREATION_WINDOW_DAYS: i64 = 14;
const MOST_STOCKED_LIMIT: u64 = 3;
const TOP_VALUE_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DailyCount {
    /// Display label such as `Mar 07`
    pub label: String,
    pub date: NaiveDate,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DashboardStatistics {
    pub active_inventories: u64,
    pub location_count: u64,
    pub most_stocked_products: Vec<String>,
    pub products_created: Vec<DailyCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProductValue {
    pub product_id: Uuid,
    pub name: String,
    #[schema(value_type = String, example = "19.99")]
    pub price: Decimal,
    #[schema(value_type = String, example = "10.00")]
    pub total_quantity: Decimal,
    #[schema(value_type = String, example = "199.90")]
    pub total_value: Decimal,
}

pub struct StatisticsService {
    db: DatabaseAccess,
}

impl StatisticsService {
    pub fn new(db: DatabaseAccess) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn dashboard(&self) -> Result<DashboardStatistics, ServiceError> {
        let db = self.db.pool();

        let active_inventories = product::Entity::find_active()
            .filter(product::Column::Quantity.gt(Decimal::ZERO))
            .count(db)
            .await?;

        let location_count = location::Entity::find_active().count(db).await?;

        let most_stocked_products = product::Entity::find_active()
            .order_by_desc(product::Column::Quantity)
            .order_by_asc(product::Column::Name)
            .limit(MOST_STOCKED_LIMIT)
            .all(db)
            .await?
            .into_iter()
            .map(|p| p.name)
            .collect();

        let today = Utc::now().date_naive();
        let window_start = today - Duration::days(CREATION_WINDOW_DAYS - 1);
        let since = window_start
            .and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc())
            .ok_or_else(|| ServiceError::InternalError("invalid creation window".into()))?;

        let created: Vec<DateTime<Utc>> = product::Entity::find_active()
            .filter(product::Column::CreatedAt.gte(since))
            .all(db)
            .await?
            .into_iter()
            .map(|p| p.created_at)
            .collect();

        Ok(DashboardStatistics {
            active_inventories,
            location_count,
            most_stocked_products,
            products_created: daily_counts(&created, today, CREATION_WINDOW_DAYS),
        })
    }

    /// Live products ranked by `price * quantity`, highest first.
    #[instrument(skip(self))]
    pub async fn top_products_by_value(&self) -> Result<Vec<ProductValue>, ServiceError> {
        let products = product::Entity::find_active()
            .filter(product::Column::Quantity.gt(Decimal::ZERO))
            .all(self.db.pool())
            .await?;

        Ok(rank_by_value(products))
    }
}

fn rank_by_value(products: Vec<product::Model>) -> Vec<ProductValue> {
    let mut ranked: Vec<ProductValue> = products
        .into_iter()
        .map(|p| {
            let price = fixed(p.price);
            let total_quantity = fixed(p.quantity);
            ProductValue {
                product_id: p.id,
                name: p.name,
                price,
                total_quantity,
                total_value: fixed(price * total_quantity),
            }
        })
        .filter(|v| v.total_value > Decimal::ZERO)
        .collect();

    ranked.sort_by(|a, b| {
        b.total_value
            .cmp(&a.total_value)
            .then_with(|| a.name.cmp(&b.name))
    });
    ranked.truncate(TOP_VALUE_LIMIT);
    ranked
}

/// Bucket timestamps by UTC day over the `days` days ending at `today`,
/// oldest first. Days without entries are reported as zero.
pub fn daily_counts(timestamps: &[DateTime<Utc>], today: NaiveDate, days: i64) -> Vec<DailyCount> {
    let mut per_day: HashMap<NaiveDate, u64> = HashMap::new();
    for ts in timestamps {
        *per_day.entry(ts.date_naive()).or_default() += 1;
    }

    (0..days)
        .rev()
        .map(|offset| {
            let date = today - Duration::days(offset);
            DailyCount {
                label: date.format("%b %d").to_string(),
                date,
                count: per_day.get(&date).copied().unwrap_or(0),
            }
        })
        .collect()
}
