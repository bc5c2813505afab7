pub mod common;
pub mod inventory;
pub mod locations;
pub mod products;
pub mod statistics;

use std::sync::Arc;

use crate::db::{DatabaseAccess, DbPool};
use crate::services::{InventoryLedgerService, LocationService, ProductService, StatisticsService};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub ledger: Arc<InventoryLedgerService>,
    pub products: Arc<ProductService>,
    pub locations: Arc<LocationService>,
    pub statistics: Arc<StatisticsService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        let db = DatabaseAccess::new(db_pool);
        Self {
            ledger: Arc::new(InventoryLedgerService::new(db.clone())),
            products: Arc::new(ProductService::new(db.clone())),
            locations: Arc::new(LocationService::new(db.clone())),
            statistics: Arc::new(StatisticsService::new(db)),
        }
    }
}
