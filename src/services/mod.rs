// Ledger core
pub mod idempotency;
pub mod ledger;
pub mod quantity;

// Catalog and reporting
pub mod locations;
pub mod products;
pub mod statistics;

pub use ledger::InventoryLedgerService;
pub use locations::LocationService;
pub use products::ProductService;
pub use statistics::StatisticsService;
