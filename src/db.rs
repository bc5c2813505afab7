use crate::config::AppConfig;
use crate::errors::ServiceError;
use futures::future::BoxFuture;
use metrics::{counter, gauge, histogram};
use sea_orm::{
    ConnectOptions, Database, DatabaseConnection, DatabaseTransaction, DbBackend,
    DbErr, EntityTrait, QuerySelect, Select, TransactionError, TransactionTrait,
};
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Configuration for database connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

/// Establishes a connection pool to the database with custom configuration
///
/// # Errors
/// Returns a `ServiceError` if the connection cannot be established
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    debug!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Configuring database connection"
    );

    let (max_connections, min_connections) = pool_bounds(config);
    if max_connections < config.max_connections {
        warn!(
            requested = config.max_connections,
            "SQLite pool capped to a single connection so write transactions queue"
        );
    }

    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(max_connections)
        .min_connections(min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    gauge!("stocktopus_db.max_connections", max_connections as f64);

    let db_pool = Database::connect(opt).await.map_err(|e| {
        error!("Database connection establishment failed: {}", e);
        ServiceError::db_error(e)
    })?;

    info!("Database connection pool established successfully");
    Ok(db_pool)
}

/// Pool size actually used for `config`.
///
/// SQLite transactions start deferred: two connections that both read and then
/// write fail with `SQLITE_BUSY` instead of waiting. One connection makes
/// writers queue on the pool.
fn pool_bounds(config: &DbConfig) -> (u32, u32) {
    let max = if config.url.starts_with("sqlite:") {
        1
    } else {
        config.max_connections
    };
    (max, config.min_connections.min(max))
}

/// Establish DB pool using AppConfig tuning
pub async fn establish_connection_from_app_config(
    cfg: &AppConfig,
) -> Result<DbPool, ServiceError> {
    let db_cfg: DbConfig = cfg.into();
    establish_connection_with_config(&db_cfg).await
}

/// Database access wrapper with built-in metrics around transactions
#[derive(Debug, Clone)]
pub struct DatabaseAccess {
    pool: Arc<DbPool>,
}

impl DatabaseAccess {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Runs `f` inside one transaction. Any `Err` rolls the whole unit back.
    pub async fn transaction<F, T>(&self, operation: &'static str, f: F) -> Result<T, ServiceError>
    where
        F: for<'a> FnOnce(&'a DatabaseTransaction) -> BoxFuture<'a, Result<T, ServiceError>>
            + Send,
        T: Send,
    {
        let transaction_id = Uuid::new_v4();
        let start = std::time::Instant::now();

        debug!(transaction_id = %transaction_id, operation, "Starting database transaction");
        counter!("stocktopus_db.transaction.started", 1, "operation" => operation);

        let result = self.pool.transaction::<_, T, ServiceError>(f).await;

        let elapsed = start.elapsed();
        histogram!("stocktopus_db.transaction.duration", elapsed, "operation" => operation);

        match &result {
            Ok(_) => {
                counter!("stocktopus_db.transaction.committed", 1, "operation" => operation);
                debug!(transaction_id = %transaction_id, operation, "Transaction committed in {:?}", elapsed);
            }
            Err(_) => {
                counter!("stocktopus_db.transaction.rolled_back", 1, "operation" => operation);
                warn!(transaction_id = %transaction_id, operation, "Transaction rolled back after {:?}", elapsed);
            }
        }

        result.map_err(|e| match e {
            TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
            TransactionError::Transaction(service_err) => service_err,
        })
    }
}

/// Adds a row lock to `select` on backends that support `SELECT ... FOR UPDATE`.
/// SQLite has no row locks and serializes write transactions instead.
pub fn for_update<E: EntityTrait>(select: Select<E>, backend: DbBackend) -> Select<E> {
    match backend {
        DbBackend::Postgres | DbBackend::MySql => select.lock_exclusive(),
        DbBackend::Sqlite => select,
    }
}

/// Shared row lock (`FOR SHARE`): blocks concurrent `for_update` on the same
/// row but not other readers taking the shared lock.
pub fn for_share<E: EntityTrait>(select: Select<E>, backend: DbBackend) -> Select<E> {
    match backend {
        DbBackend::Postgres | DbBackend::MySql => select.lock_shared(),
        DbBackend::Sqlite => select,
    }
}

/// True when `err` came from a unique index rejecting an insert or update.
pub fn is_unique_violation(err: &DbErr) -> bool {
    matches!(
        err.sql_err(),
        Some(sea_orm::SqlErr::UniqueConstraintViolation(_))
    )
}

/// Runs database migrations
pub async fn run_migrations(pool: &DbPool) -> Result<(), ServiceError> {
    info!("Running database migrations");
    let start = std::time::Instant::now();

    let result = crate::migrator::Migrator::up(pool, None)
        .await
        .map_err(ServiceError::db_error);

    let elapsed = start.elapsed();
    match &result {
        Ok(_) => info!("Database migrations completed successfully in {:?}", elapsed),
        Err(e) => error!("Database migrations failed after {:?}: {}", elapsed, e),
    }

    result
}

/// Checks if the database connection is active
pub async fn check_connection(pool: &DbPool) -> Result<(), ServiceError> {
    let start = std::time::Instant::now();
    let result = pool.ping().await.map_err(ServiceError::db_error);

    let elapsed = start.elapsed();
    match &result {
        Ok(_) => {
            debug!("Database connection check successful in {:?}", elapsed);
            gauge!("stocktopus_db.connection_latency", elapsed.as_millis() as f64);
        }
        Err(e) => {
            error!("Database connection check failed after {:?}: {}", elapsed, e);
            counter!("stocktopus_db.connection_failures", 1);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_pool() -> DbPool {
        let cfg = DbConfig {
            url: "sqlite::memory:".into(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };
        establish_connection_with_config(&cfg).await.unwrap()
    }

    #[test]
    fn sqlite_pools_use_one_connection() {
        let sqlite = DbConfig {
            url: "sqlite://stocktopus.db?mode=rwc".into(),
            max_connections: 16,
            min_connections: 2,
            ..Default::default()
        };
        assert_eq!(pool_bounds(&sqlite), (1, 1));

        let postgres = DbConfig {
            url: "postgres://localhost/stocktopus".into(),
            ..sqlite
        };
        assert_eq!(pool_bounds(&postgres), (16, 2));
    }

    #[tokio::test]
    async fn migrations_apply_and_connection_answers_ping() {
        let pool = memory_pool().await;
        run_migrations(&pool).await.unwrap();
        assert!(check_connection(&pool).await.is_ok());
    }

    #[tokio::test]
    async fn transaction_returns_closure_value() {
        let access = DatabaseAccess::new(Arc::new(memory_pool().await));
        let value = access
            .transaction("test", |_txn| Box::pin(async move { Ok(42) }))
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn transaction_propagates_service_error() {
        let access = DatabaseAccess::new(Arc::new(memory_pool().await));
        let result: Result<(), _> = access
            .transaction("test", |_txn| {
                Box::pin(async move { Err(ServiceError::InvalidTransfer) })
            })
            .await;
        assert!(matches!(result, Err(ServiceError::InvalidTransfer)));
    }
}
