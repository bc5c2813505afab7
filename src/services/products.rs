use std::collections::HashMap;

use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, Set, Value,
};
use serde::Deserialize;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::auth::CallerId;
use crate::db::DatabaseAccess;
use crate::entities::{location, name_key, product, stock_entry, Lifecycle, SoftDelete};
use crate::errors::ServiceError;
use crate::services::ledger::{
    active_location, find_entry, lock_product, place_entry, product_detail, recompute_aggregate,
    LocationBalance, ProductDetail,
};
use crate::services::quantity::{fixed, parse_price, Quantity};

/// Body of product create and update requests
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ProductForm {
    #[validate(length(max = 255), custom = "not_blank")]
    pub name: String,
    #[validate(url)]
    pub image_url: String,
    /// Rounded to two decimals; must be positive
    #[schema(value_type = String, example = "19.99")]
    pub price: Option<serde_json::Value>,
    /// Opening quantity at `location_id`; at most two decimals
    #[schema(value_type = String, example = "10.00")]
    pub quantity: Option<serde_json::Value>,
    pub location_id: Option<Uuid>,
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("must not be blank".into());
        return Err(err);
    }
    Ok(())
}

/// A validated product form
#[derive(Debug, Clone)]
pub struct ProductInput {
    pub name: String,
    pub image_url: String,
    pub price: Decimal,
    pub quantity: Quantity,
    pub location_id: Uuid,
}

impl ProductForm {
    pub fn parse(self) -> Result<ProductInput, ServiceError> {
        self.validate()?;
        let price = parse_price(self.price.as_ref())?;
        let quantity = Quantity::from_json(self.quantity.as_ref())?;
        let location_id = self
            .location_id
            .ok_or_else(|| ServiceError::ValidationError("location_id is required".into()))?;
        Ok(ProductInput {
            name: self.name.trim().to_string(),
            image_url: self.image_url.trim().to_string(),
            price,
            quantity,
            location_id,
        })
    }
}

pub struct ProductService {
    db: DatabaseAccess,
}

impl ProductService {
    pub fn new(db: DatabaseAccess) -> Self {
        Self { db }
    }

    /// Create a product together with its first stock entry.
    #[instrument(skip_all, fields(caller = %caller, name = %input.name))]
    pub async fn create(
        &self,
        caller: CallerId,
        input: ProductInput,
    ) -> Result<ProductDetail, ServiceError> {
        let detail = self
            .db
            .transaction("products.create", move |txn| {
                Box::pin(async move {
                    ensure_name_free(txn, &input.name, None).await?;
                    let location = active_location(txn, input.location_id, "Location not found").await?;

                    let created = product::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        name: Set(input.name),
                        image_url: Set(input.image_url),
                        price: Set(input.price),
                        quantity: Set(Decimal::ZERO),
                        status: Set(Lifecycle::Active),
                        created_by: Set(caller.as_uuid()),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await?;

                    place_entry(txn, created.id, location.id, input.quantity.value()).await?;
                    let created = recompute_aggregate(txn, created).await?;
                    product_detail(txn, created).await
                })
            })
            .await?;

        info!(product_id = %detail.id, "product created");
        Ok(detail)
    }

    /// Live products, newest first, each with its active stock entries.
    pub async fn list(&self) -> Result<Vec<ProductDetail>, ServiceError> {
        let db = self.db.pool();
        let products = product::Entity::find_active()
            .order_by_desc(product::Column::CreatedAt)
            .all(db)
            .await?;
        let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();

        let mut balances: HashMap<Uuid, Vec<LocationBalance>> = HashMap::new();
        let rows = stock_entry::Entity::find_active()
            .filter(stock_entry::Column::ProductId.is_in(ids))
            .find_also_related(location::Entity)
            .order_by_asc(location::Column::Name)
            .all(db)
            .await?;
        for (entry, location) in rows {
            if let Some(location) = location {
                balances
                    .entry(entry.product_id)
                    .or_default()
                    .push(LocationBalance {
                        stock_entry_id: entry.id,
                        location_id: location.id,
                        location_name: location.name,
                        quantity: fixed(entry.quantity),
                    });
            }
        }

        Ok(products
            .into_iter()
            .map(|p| ProductDetail {
                locations: balances.remove(&p.id).unwrap_or_default(),
                id: p.id,
                name: p.name,
                image_url: p.image_url,
                price: fixed(p.price),
                quantity: fixed(p.quantity),
                created_by: p.created_by,
                created_at: p.created_at,
                updated_at: p.updated_at,
            })
            .collect())
    }

    pub async fn get(&self, id: Uuid) -> Result<ProductDetail, ServiceError> {
        let db = self.db.pool();
        let product = product::Entity::find_active_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".into()))?;
        product_detail(db, product).await
    }

    /// Replace a product's fields and place its stock at `location_id`.
    ///
    /// If the product is already stocked there, only that entry's quantity
    /// changes. Otherwise all current entries are retired and the stock
    /// moves wholesale to the new location.
    #[instrument(skip_all, fields(product_id = %id))]
    pub async fn update(&self, id: Uuid, input: ProductInput) -> Result<ProductDetail, ServiceError> {
        let detail = self
            .db
            .transaction("products.update", move |txn| {
                Box::pin(async move {
                    let location = active_location(txn, input.location_id, "Location not found").await?;
                    let current = lock_product(txn, id).await?;
                    ensure_name_free(txn, &input.name, Some(id)).await?;
                    let quantity = input.quantity.value();

                    match find_entry(txn, id, location.id).await? {
                        Some(entry) if entry.status.is_active() => {
                            let mut entry: stock_entry::ActiveModel = entry.into();
                            entry.quantity = Set(quantity);
                            entry.update(txn).await?;
                        }
                        existing => {
                            retire_entries(txn, id).await?;
                            match existing {
                                Some(entry) => {
                                    let mut entry: stock_entry::ActiveModel = entry.into();
                                    entry.quantity = Set(quantity);
                                    entry.status = Set(Lifecycle::Active);
                                    entry.update(txn).await?;
                                }
                                None => {
                                    place_entry(txn, id, location.id, quantity).await?;
                                }
                            }
                        }
                    }

                    let mut changed: product::ActiveModel = current.into();
                    changed.name = Set(input.name);
                    changed.image_url = Set(input.image_url);
                    changed.price = Set(input.price);
                    let changed = changed.update(txn).await?;

                    let changed = recompute_aggregate(txn, changed).await?;
                    product_detail(txn, changed).await
                })
            })
            .await?;

        info!("product updated");
        Ok(detail)
    }

    /// Soft-delete a product and every active stock entry it owns.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        self.db
            .transaction("products.delete", move |txn| {
                Box::pin(async move {
                    let current = lock_product(txn, id).await?;
                    stock_entry::Entity::update_many()
                        .col_expr(
                            stock_entry::Column::Status,
                            Expr::value(Lifecycle::Deleted.into_value()),
                        )
                        .col_expr(
                            stock_entry::Column::UpdatedAt,
                            Expr::value(Value::from(chrono::Utc::now())),
                        )
                        .filter(stock_entry::Column::ProductId.eq(id))
                        .filter(stock_entry::Entity::active())
                        .exec(txn)
                        .await?;

                    let current = recompute_aggregate(txn, current).await?;
                    let mut deleted: product::ActiveModel = current.into();
                    deleted.status = Set(Lifecycle::Deleted);
                    deleted.update(txn).await?;
                    Ok(())
                })
            })
            .await?;

        info!("product deleted");
        Ok(())
    }
}

/// Zero and soft-delete every active entry of a live product, so a later
/// revival starts from nothing.
async fn retire_entries<C: ConnectionTrait>(conn: &C, product_id: Uuid) -> Result<(), ServiceError> {
    stock_entry::Entity::update_many()
        .col_expr(stock_entry::Column::Quantity, Expr::value(Value::from(Decimal::ZERO)))
        .col_expr(stock_entry::Column::Status, Expr::value(Lifecycle::Deleted.into_value()))
        .col_expr(stock_entry::Column::UpdatedAt, Expr::value(Value::from(chrono::Utc::now())))
        .filter(stock_entry::Column::ProductId.eq(product_id))
        .filter(stock_entry::Entity::active())
        .exec(conn)
        .await?;
    Ok(())
}

/// Names are unique among live products, ignoring case.
async fn ensure_name_free<C: ConnectionTrait>(
    conn: &C,
    name: &str,
    except: Option<Uuid>,
) -> Result<(), ServiceError> {
    let mut query =
        product::Entity::find_active().filter(product::Column::NameKey.eq(name_key(name)));
    if let Some(id) = except {
        query = query.filter(product::Column::Id.ne(id));
    }
    if query.one(conn).await?.is_some() {
        return Err(ServiceError::Conflict(
            "A product with this name already exists".into(),
        ));
    }
    Ok(())
}
