//! Inventory ledger.
//!
//! The only code paths that write `stock_entries.quantity` and
//! `products.quantity`. Every mutation runs in one transaction that:
//!
//! 1. locks the product row, serializing all mutations of that product;
//! 2. moves stock between entries, creating or reviving them as needed;
//! 3. recomputes the product's aggregate from its active entries.
//!
//! Business-rule failures return `Err` before commit, so the whole transaction
//! rolls back and no partial movement is ever visible.

use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::CallerId;
use crate::db::{for_share, for_update, DatabaseAccess};
use crate::entities::{location, product, stock_entry, Lifecycle, SoftDelete};
use crate::errors::{InsufficientContext, ServiceError};
use crate::services::idempotency::IdempotencyScope;
use crate::services::quantity::{ensure_storable, fixed, Quantity};

pub const OP_ADD: &str = "inventory.add";
pub const OP_SUBTRACT: &str = "inventory.subtract";
pub const OP_TRANSFER: &str = "inventory.transfer";

#[derive(Debug, Clone, Serialize)]
pub struct AddStock {
    pub product_id: Uuid,
    pub location_id: Uuid,
    pub amount: Quantity,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubtractStock {
    pub product_id: Uuid,
    pub location_id: Uuid,
    pub amount: Quantity,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferStock {
    pub product_id: Uuid,
    pub from_location_id: Uuid,
    pub to_location_id: Uuid,
    pub amount: Quantity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AddOutcome {
    pub product_id: Uuid,
    pub location_id: Uuid,
    pub location_name: String,
    #[schema(value_type = String, example = "5.00")]
    pub added_quantity: Decimal,
    #[schema(value_type = String, example = "15.00")]
    pub new_location_quantity: Decimal,
    #[schema(value_type = String, example = "15.00")]
    pub new_total_quantity: Decimal,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SubtractOutcome {
    pub product_id: Uuid,
    pub location_id: Uuid,
    pub location_name: String,
    #[schema(value_type = String, example = "3.00")]
    pub subtracted_quantity: Decimal,
    #[schema(value_type = String, example = "7.00")]
    pub new_location_quantity: Decimal,
    #[schema(value_type = String, example = "7.00")]
    pub new_total_quantity: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TransferSummary {
    pub product_id: Uuid,
    #[schema(value_type = String, example = "4.00")]
    pub quantity: Decimal,
    pub from_location_id: Uuid,
    pub from_location: String,
    pub to_location_id: Uuid,
    pub to_location: String,
    #[schema(value_type = String, example = "6.00")]
    pub new_from_quantity: Decimal,
    #[schema(value_type = String, example = "4.00")]
    pub new_to_quantity: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TransferOutcome {
    pub product: ProductDetail,
    pub transfer: TransferSummary,
}

/// One active stock entry as seen by callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LocationBalance {
    pub stock_entry_id: Uuid,
    pub location_id: Uuid,
    pub location_name: String,
    #[schema(value_type = String, example = "10.00")]
    pub quantity: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProductBalances {
    pub product_id: Uuid,
    pub name: String,
    #[schema(value_type = String, example = "10.00")]
    pub total_quantity: Decimal,
    pub locations: Vec<LocationBalance>,
}

/// A live product with its active stock entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProductDetail {
    pub id: Uuid,
    pub name: String,
    pub image_url: String,
    #[schema(value_type = String, example = "19.99")]
    pub price: Decimal,
    #[schema(value_type = String, example = "10.00")]
    pub quantity: Decimal,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub locations: Vec<LocationBalance>,
}

pub struct InventoryLedgerService {
    db: DatabaseAccess,
}

impl InventoryLedgerService {
    pub fn new(db: DatabaseAccess) -> Self {
        Self { db }
    }

    /// Put `amount` units of a product at a location, creating or reviving the entry.
    #[instrument(skip_all, fields(caller = %caller, product_id = %cmd.product_id, location_id = %cmd.location_id, amount = %cmd.amount))]
    pub async fn add(
        &self,
        caller: CallerId,
        cmd: AddStock,
        idempotency: Option<String>,
    ) -> Result<AddOutcome, ServiceError> {
        let scope = IdempotencyScope::new(caller, OP_ADD, &cmd, idempotency)?;

        let outcome = self
            .db
            .transaction(OP_ADD, move |txn| {
                Box::pin(async move {
                    if let Some(scope) = &scope {
                        if let Some(previous) = scope.replay::<AddOutcome, _>(txn).await? {
                            return Ok(previous);
                        }
                    }

                    let location = active_location(txn, cmd.location_id, "Location not found").await?;
                    let product = lock_product(txn, cmd.product_id).await?;

                    let entry = credit_entry(txn, product.id, location.id, cmd.amount).await?;
                    let product = recompute_aggregate(txn, product).await?;

                    let outcome = AddOutcome {
                        product_id: product.id,
                        location_id: location.id,
                        location_name: location.name.clone(),
                        added_quantity: cmd.amount.value(),
                        new_location_quantity: fixed(entry.quantity),
                        new_total_quantity: fixed(product.quantity),
                        message: format!(
                            "Successfully added {} units to {}",
                            cmd.amount, location.name
                        ),
                    };

                    if let Some(scope) = &scope {
                        scope.remember(txn, &outcome).await?;
                    }
                    Ok(outcome)
                })
            })
            .await?;

        counter!("stocktopus_ledger.add", 1);
        info!(
            new_location_quantity = %outcome.new_location_quantity,
            new_total_quantity = %outcome.new_total_quantity,
            "stock added"
        );
        Ok(outcome)
    }

    /// Take `amount` units out of an existing active entry. An entry brought to
    /// zero stays active.
    #[instrument(skip_all, fields(caller = %caller, product_id = %cmd.product_id, location_id = %cmd.location_id, amount = %cmd.amount))]
    pub async fn subtract(
        &self,
        caller: CallerId,
        cmd: SubtractStock,
        idempotency: Option<String>,
    ) -> Result<SubtractOutcome, ServiceError> {
        let scope = IdempotencyScope::new(caller, OP_SUBTRACT, &cmd, idempotency)?;

        let outcome = self
            .db
            .transaction(OP_SUBTRACT, move |txn| {
                Box::pin(async move {
                    if let Some(scope) = &scope {
                        if let Some(previous) = scope.replay::<SubtractOutcome, _>(txn).await? {
                            return Ok(previous);
                        }
                    }

                    let location = active_location(txn, cmd.location_id, "Location not found").await?;
                    let product = lock_product(txn, cmd.product_id).await?;

                    let entry = find_entry(txn, product.id, location.id)
                        .await?
                        .filter(|e| e.status.is_active())
                        .ok_or_else(|| {
                            ServiceError::NotFound("Product not found at this location".into())
                        })?;

                    let entry = debit_entry(txn, entry, cmd.amount, InsufficientContext::Subtract)
                        .await?;
                    let product = recompute_aggregate(txn, product).await?;

                    let outcome = SubtractOutcome {
                        product_id: product.id,
                        location_id: location.id,
                        location_name: location.name,
                        subtracted_quantity: cmd.amount.value(),
                        new_location_quantity: fixed(entry.quantity),
                        new_total_quantity: fixed(product.quantity),
                    };

                    if let Some(scope) = &scope {
                        scope.remember(txn, &outcome).await?;
                    }
                    Ok(outcome)
                })
            })
            .await?;

        counter!("stocktopus_ledger.subtract", 1);
        info!(
            new_location_quantity = %outcome.new_location_quantity,
            new_total_quantity = %outcome.new_total_quantity,
            "stock subtracted"
        );
        Ok(outcome)
    }

    /// Move `amount` units between two locations of the same product.
    #[instrument(skip_all, fields(caller = %caller, product_id = %cmd.product_id, from = %cmd.from_location_id, to = %cmd.to_location_id, amount = %cmd.amount))]
    pub async fn transfer(
        &self,
        caller: CallerId,
        cmd: TransferStock,
        idempotency: Option<String>,
    ) -> Result<TransferOutcome, ServiceError> {
        if cmd.from_location_id == cmd.to_location_id {
            return Err(ServiceError::InvalidTransfer);
        }
        let scope = IdempotencyScope::new(caller, OP_TRANSFER, &cmd, idempotency)?;

        let outcome = self
            .db
            .transaction(OP_TRANSFER, move |txn| {
                Box::pin(async move {
                    if let Some(scope) = &scope {
                        if let Some(previous) = scope.replay::<TransferOutcome, _>(txn).await? {
                            return Ok(previous);
                        }
                    }

                    let (from, to) =
                        transfer_locations(txn, cmd.from_location_id, cmd.to_location_id).await?;
                    let product = lock_product(txn, cmd.product_id).await?;

                    let source = match find_entry(txn, product.id, from.id)
                        .await?
                        .filter(|e| e.status.is_active())
                    {
                        Some(entry) => entry,
                        None => {
                            return Err(ServiceError::insufficient(
                                InsufficientContext::Transfer,
                                Decimal::ZERO,
                                cmd.amount.value(),
                            ))
                        }
                    };

                    let source =
                        debit_entry(txn, source, cmd.amount, InsufficientContext::Transfer).await?;
                    let destination = credit_entry(txn, product.id, to.id, cmd.amount).await?;
                    let product = recompute_aggregate(txn, product).await?;

                    let transfer = TransferSummary {
                        product_id: product.id,
                        quantity: cmd.amount.value(),
                        from_location_id: from.id,
                        from_location: from.name,
                        to_location_id: to.id,
                        to_location: to.name,
                        new_from_quantity: fixed(source.quantity),
                        new_to_quantity: fixed(destination.quantity),
                    };
                    let outcome = TransferOutcome {
                        product: product_detail(txn, product).await?,
                        transfer,
                    };

                    if let Some(scope) = &scope {
                        scope.remember(txn, &outcome).await?;
                    }
                    Ok(outcome)
                })
            })
            .await?;

        counter!("stocktopus_ledger.transfer", 1);
        info!(
            new_from_quantity = %outcome.transfer.new_from_quantity,
            new_to_quantity = %outcome.transfer.new_to_quantity,
            "stock transferred"
        );
        Ok(outcome)
    }

    /// Aggregate and per-location breakdown of a live product.
    #[instrument(skip(self))]
    pub async fn current_balances(&self, product_id: Uuid) -> Result<ProductBalances, ServiceError> {
        let db = self.db.pool();
        let product = product::Entity::find_active_by_id(product_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".into()))?;

        Ok(ProductBalances {
            product_id: product.id,
            name: product.name,
            total_quantity: fixed(product.quantity),
            locations: active_balances(db, product.id).await?,
        })
    }
}

/// Lock and return a live product. All ledger mutations for the product
/// queue behind this lock until the holder commits or rolls back.
pub(crate) async fn lock_product<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
) -> Result<product::Model, ServiceError> {
    for_update(
        product::Entity::find_active_by_id(product_id),
        conn.get_database_backend(),
    )
    .one(conn)
    .await?
    .ok_or_else(|| ServiceError::NotFound("Product not found".into()))
}

/// Return a live location under a shared lock, so it can't be deleted while
/// stock is moved onto it. Locations are always locked before products.
pub(crate) async fn active_location<C: ConnectionTrait>(
    conn: &C,
    location_id: Uuid,
    not_found: &str,
) -> Result<location::Model, ServiceError> {
    for_share(
        location::Entity::find_active_by_id(location_id),
        conn.get_database_backend(),
    )
    .one(conn)
    .await?
    .ok_or_else(|| ServiceError::NotFound(not_found.to_string()))
}

/// Both transfer endpoints, locked in ascending id order.
async fn transfer_locations<C: ConnectionTrait>(
    conn: &C,
    from_id: Uuid,
    to_id: Uuid,
) -> Result<(location::Model, location::Model), ServiceError> {
    const FROM_MISSING: &str = "Source location not found";
    const TO_MISSING: &str = "Destination location not found";

    if from_id < to_id {
        let from = active_location(conn, from_id, FROM_MISSING).await?;
        let to = active_location(conn, to_id, TO_MISSING).await?;
        Ok((from, to))
    } else {
        let to = active_location(conn, to_id, TO_MISSING).await?;
        let from = active_location(conn, from_id, FROM_MISSING).await?;
        Ok((from, to))
    }
}

/// The entry for a pair regardless of its lifecycle.
pub(crate) async fn find_entry<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    location_id: Uuid,
) -> Result<Option<stock_entry::Model>, ServiceError> {
    Ok(stock_entry::Entity::find()
        .filter(stock_entry::Column::ProductId.eq(product_id))
        .filter(stock_entry::Column::LocationId.eq(location_id))
        .one(conn)
        .await?)
}

/// Increase the pair's entry by `amount`, reviving a retired entry or
/// inserting a new one when the pair has never been stocked.
pub(crate) async fn credit_entry<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    location_id: Uuid,
    amount: Quantity,
) -> Result<stock_entry::Model, ServiceError> {
    match find_entry(conn, product_id, location_id).await? {
        Some(entry) => {
            let quantity = ensure_storable(
                fixed(entry.quantity + amount.value()),
                "Quantity at this location",
            )?;
            let mut active: stock_entry::ActiveModel = entry.into();
            active.quantity = Set(quantity);
            active.status = Set(Lifecycle::Active);
            Ok(active.update(conn).await?)
        }
        None => place_entry(conn, product_id, location_id, amount.value()).await,
    }
}

pub(crate) async fn place_entry<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    location_id: Uuid,
    quantity: Decimal,
) -> Result<stock_entry::Model, ServiceError> {
    let entry = stock_entry::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        location_id: Set(location_id),
        quantity: Set(fixed(quantity)),
        status: Set(Lifecycle::Active),
        ..Default::default()
    };
    Ok(entry.insert(conn).await?)
}

async fn debit_entry<C: ConnectionTrait>(
    conn: &C,
    entry: stock_entry::Model,
    amount: Quantity,
    context: InsufficientContext,
) -> Result<stock_entry::Model, ServiceError> {
    let available = fixed(entry.quantity);
    if available < amount.value() {
        return Err(ServiceError::insufficient(
            context,
            available,
            amount.value(),
        ));
    }
    let mut active: stock_entry::ActiveModel = entry.into();
    active.quantity = Set(fixed(available - amount.value()));
    Ok(active.update(conn).await?)
}

/// Recompute a product's aggregate as a fresh sum over its active entries and
/// persist it. Called at the end of every path that touches entries.
pub(crate) async fn recompute_aggregate<C: ConnectionTrait>(
    conn: &C,
    product: product::Model,
) -> Result<product::Model, ServiceError> {
    let total: Decimal = stock_entry::Entity::find_active()
        .filter(stock_entry::Column::ProductId.eq(product.id))
        .all(conn)
        .await?
        .iter()
        .map(|entry| fixed(entry.quantity))
        .sum();

    let total = ensure_storable(fixed(total), "Total quantity")?;

    let mut active: product::ActiveModel = product.into();
    active.quantity = Set(total);
    Ok(active.update(conn).await?)
}

/// Active entries of a product joined with their location names, ordered by name.
pub(crate) async fn active_balances<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
) -> Result<Vec<LocationBalance>, ServiceError> {
    let rows = stock_entry::Entity::find_active()
        .filter(stock_entry::Column::ProductId.eq(product_id))
        .find_also_related(location::Entity)
        .order_by_asc(location::Column::Name)
        .all(conn)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(entry, location)| {
            location.map(|location| LocationBalance {
                stock_entry_id: entry.id,
                location_id: location.id,
                location_name: location.name,
                quantity: fixed(entry.quantity),
            })
        })
        .collect())
}

pub(crate) async fn product_detail<C: ConnectionTrait>(
    conn: &C,
    product: product::Model,
) -> Result<ProductDetail, ServiceError> {
    let locations = active_balances(conn, product.id).await?;
    Ok(ProductDetail {
        id: product.id,
        name: product.name,
        image_url: product.image_url,
        price: fixed(product.price),
        quantity: fixed(product.quantity),
        created_by: product.created_by,
        created_at: product.created_at,
        updated_at: product.updated_at,
        locations,
    })
}
