use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, Set, Value,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::{for_update, DatabaseAccess};
use crate::entities::{location, name_key, product, stock_entry, Lifecycle, SoftDelete};
use crate::errors::ServiceError;
use crate::services::ledger::recompute_aggregate;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct LocationForm {
    #[validate(length(max = 255))]
    pub name: String,
    #[validate(length(max = 500))]
    #[serde(default)]
    pub address: Option<String>,
}

impl LocationForm {
    fn normalized(self) -> Result<(String, Option<String>), ServiceError> {
        self.validate()?;
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(ServiceError::ValidationError(
                "Location name is required".into(),
            ));
        }
        let address = self
            .address
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());
        Ok((name, address))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LocationView {
    pub id: Uuid,
    pub name: String,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A location with the live products stocked there
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LocationSummary {
    pub id: Uuid,
    pub name: String,
    pub address: Option<String>,
    pub products: Vec<String>,
    pub product_count: usize,
    pub created_at: DateTime<Utc>,
}

impl From<location::Model> for LocationView {
    fn from(model: location::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            address: model.address,
            created_at: model.created_at,
        }
    }
}

pub struct LocationService {
    db: DatabaseAccess,
}

impl LocationService {
    pub fn new(db: DatabaseAccess) -> Self {
        Self { db }
    }

    #[instrument(skip_all)]
    pub async fn create(&self, form: LocationForm) -> Result<LocationView, ServiceError> {
        let (name, address) = form.normalized()?;
        let created = self
            .db
            .transaction("locations.create", move |txn| {
                Box::pin(async move {
                    ensure_name_free(txn, &name, None).await?;
                    Ok(location::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        name: Set(name),
                        address: Set(address),
                        status: Set(Lifecycle::Active),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await?)
                })
            })
            .await?;

        info!(location_id = %created.id, "location created");
        Ok(created.into())
    }

    /// Live locations by name, with the names of live products stocked at each.
    pub async fn list(&self) -> Result<Vec<LocationSummary>, ServiceError> {
        let db = self.db.pool();
        let locations = location::Entity::find_active()
            .order_by_asc(location::Column::Name)
            .all(db)
            .await?;

        let mut stocked: HashMap<Uuid, Vec<String>> = HashMap::new();
        let rows = stock_entry::Entity::find_active()
            .find_also_related(product::Entity)
            .filter(product::Entity::active())
            .order_by_asc(product::Column::Name)
            .all(db)
            .await?;
        for (entry, product) in rows {
            if let Some(product) = product {
                stocked.entry(entry.location_id).or_default().push(product.name);
            }
        }

        Ok(locations
            .into_iter()
            .map(|l| {
                let products = stocked.remove(&l.id).unwrap_or_default();
                LocationSummary {
                    id: l.id,
                    name: l.name,
                    address: l.address,
                    product_count: products.len(),
                    products,
                    created_at: l.created_at,
                }
            })
            .collect())
    }

    #[instrument(skip(self, form))]
    pub async fn update(&self, id: Uuid, form: LocationForm) -> Result<LocationView, ServiceError> {
        let (name, address) = form.normalized()?;
        let updated = self
            .db
            .transaction("locations.update", move |txn| {
                Box::pin(async move {
                    let current = lock_location(txn, id).await?;
                    ensure_name_free(txn, &name, Some(id)).await?;
                    let mut changed: location::ActiveModel = current.into();
                    changed.name = Set(name);
                    changed.address = Set(address);
                    Ok(changed.update(txn).await?)
                })
            })
            .await?;

        info!("location updated");
        Ok(updated.into())
    }

    /// Soft-delete a location. Its active stock entries are soft-deleted with it
    /// and the aggregates of the affected products are recomputed in the same
    /// transaction, so aggregates never count stock at a deleted location.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let affected = self
            .db
            .transaction("locations.delete", move |txn| {
                Box::pin(async move {
                    let current = lock_location(txn, id).await?;

                    let product_ids: BTreeSet<Uuid> = stock_entry::Entity::find_active()
                        .filter(stock_entry::Column::LocationId.eq(id))
                        .all(txn)
                        .await?
                        .into_iter()
                        .map(|entry| entry.product_id)
                        .collect();

                    // Ascending id order so concurrent deletes can't deadlock.
                    let mut products = Vec::with_capacity(product_ids.len());
                    for product_id in &product_ids {
                        let locked = for_update(
                            product::Entity::find_by_id(*product_id),
                            txn.get_database_backend(),
                        )
                        .one(txn)
                        .await?;
                        products.extend(locked);
                    }

                    stock_entry::Entity::update_many()
                        .col_expr(
                            stock_entry::Column::Status,
                            Expr::value(Lifecycle::Deleted.into_value()),
                        )
                        .col_expr(stock_entry::Column::UpdatedAt, Expr::value(Value::from(Utc::now())))
                        .filter(stock_entry::Column::LocationId.eq(id))
                        .filter(stock_entry::Entity::active())
                        .exec(txn)
                        .await?;

                    for product in products {
                        recompute_aggregate(txn, product).await?;
                    }

                    let mut deleted: location::ActiveModel = current.into();
                    deleted.status = Set(Lifecycle::Deleted);
                    deleted.update(txn).await?;
                    Ok(product_ids.len())
                })
            })
            .await?;

        info!(affected_products = affected, "location deleted");
        Ok(())
    }
}

/// Exclusive lock on a live location; waits for in-flight stock movements
/// holding the shared lock.
async fn lock_location<C: ConnectionTrait>(conn: &C, id: Uuid) -> Result<location::Model, ServiceError> {
    for_update(
        location::Entity::find_active_by_id(id),
        conn.get_database_backend(),
    )
    .one(conn)
    .await?
    .ok_or_else(|| ServiceError::NotFound("Location not found".into()))
}

/// Names are unique among live locations, ignoring case.
async fn ensure_name_free<C: ConnectionTrait>(
    conn: &C,
    name: &str,
    except: Option<Uuid>,
) -> Result<(), ServiceError> {
    let mut query =
        location::Entity::find_active().filter(location::Column::NameKey.eq(name_key(name)));
    if let Some(id) = except {
        query = query.filter(location::Column::Id.ne(id));
    }
    if query.one(conn).await?.is_some() {
        return Err(ServiceError::Conflict(
            "A location with this name already exists".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn form_trims_and_drops_blank_address() {
        let (name, address) = LocationForm {
            name: "  Main Warehouse ".into(),
            address: Some("   ".into()),
        }
        .normalized()
        .unwrap();
        assert_eq!(name, "Main Warehouse");
        assert_eq!(address, None);
    }

    #[test]
    fn form_requires_name() {
        assert_matches!(
            LocationForm {
                name: " ".into(),
                address: None
            }
            .normalized(),
            Err(ServiceError::ValidationError(_))
        );
    }
}
