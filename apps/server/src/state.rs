//! Shared application state

use crate::{
    config::{Config, StoreBackend},
    db::{HospitalStore, InMemoryStore, PostgresStore},
    services::{
        AdmissionService, DischargeService, DispensingService, FormularyService, JournalService,
        RegistryService, StockService, TransferService,
    },
    Result,
};
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct AppStateOptions {
    pub run_migrations: bool,
    /// Overrides `database.backend` when set.
    pub backend: Option<StoreBackend>,
}

impl Default for AppStateOptions {
    fn default() -> Self {
        Self {
            run_migrations: true,
            backend: None,
        }
    }
}

/// Shared application state passed to all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn HospitalStore>,
    pub registry_service: Arc<RegistryService>,
    pub admission_service: Arc<AdmissionService>,
    pub transfer_service: Arc<TransferService>,
    pub discharge_service: Arc<DischargeService>,
    pub formulary_service: Arc<FormularyService>,
    pub stock_service: Arc<StockService>,
    pub dispensing_service: Arc<DispensingService>,
    pub journal_service: Arc<JournalService>,
}

impl AppState {
    /// Initialize the application state
    pub async fn new(config: Config) -> Result<Self> {
        Self::new_with_options(config, AppStateOptions::default()).await
    }

    pub async fn new_with_options(config: Config, options: AppStateOptions) -> Result<Self> {
        tracing::info!("Initializing application state...");

        let backend = options.backend.unwrap_or(config.database.backend);
        let store: Arc<dyn HospitalStore> = match backend {
            StoreBackend::Postgres => {
                let db_pool = create_db_pool(&config).await?;

                if options.run_migrations && config.database.run_migrations {
                    tracing::info!("Running database migrations...");
                    sqlx::migrate!("./migrations")
                        .run(&db_pool)
                        .await
                        .map_err(|e| crate::Error::Internal(format!("Migration failed: {}", e)))?;
                }

                Arc::new(PostgresStore::new(db_pool))
            }
            StoreBackend::Memory => {
                tracing::warn!("Using the in-memory store; data is lost on restart");
                Arc::new(InMemoryStore::new())
            }
        };

        Ok(Self::with_store(config, store))
    }

    /// Wire every service against an already constructed store.
    pub fn with_store(config: Config, store: Arc<dyn HospitalStore>) -> Self {
        let pharmacy = config.pharmacy.clone();

        Self {
            config: Arc::new(config),
            registry_service: Arc::new(RegistryService::new(store.clone())),
            admission_service: Arc::new(AdmissionService::new(store.clone())),
            transfer_service: Arc::new(TransferService::new(store.clone())),
            discharge_service: Arc::new(DischargeService::new(store.clone())),
            formulary_service: Arc::new(FormularyService::new(store.clone())),
            stock_service: Arc::new(StockService::new(store.clone(), pharmacy.clone())),
            dispensing_service: Arc::new(DispensingService::new(store.clone(), pharmacy)),
            journal_service: Arc::new(JournalService::new(store.clone())),
            store,
        }
    }
}

async fn create_db_pool(config: &Config) -> Result<PgPool> {
    tracing::info!("Creating database connection pool...");

    let statement_timeout = config.database.statement_timeout_seconds;
    let lock_timeout = config.database.lock_timeout_seconds;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .min_connections(config.database.pool_min_size)
        .max_connections(config.database.pool_max_size)
        .acquire_timeout(std::time::Duration::from_secs(
            config.database.pool_timeout_seconds,
        ))
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                sqlx::query(&format!("SET statement_timeout = '{}s'", statement_timeout))
                    .execute(&mut *conn)
                    .await?;

                // Contended bed and batch rows fail fast instead of queueing.
                sqlx::query(&format!("SET lock_timeout = '{}s'", lock_timeout))
                    .execute(&mut *conn)
                    .await?;

                sqlx::query("SET TIME ZONE 'UTC'")
                    .execute(&mut *conn)
                    .await?;

                Ok(())
            })
        })
        .connect(&config.database.url)
        .await
        .map_err(crate::Error::Database)?;

    tracing::info!(
        min = config.database.pool_min_size,
        max = config.database.pool_max_size,
        "Database pool created"
    );

    Ok(pool)
}
