//! Driver lookup by configuration key.
//!
//! Each key maps to a factory that opens a connection from the database
//! configuration. The default registry knows `sqlite` and `mysql`;
//! applications can register their own drivers under new keys.

use super::mysql::MysqlConnection;
use super::sqlite::SqliteConnection;
use super::{DatabaseDriver, QuerySettings};
use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::info;

/// Future returned by a driver factory
pub type DriverFuture = Pin<Box<dyn Future<Output = Result<Arc<dyn DatabaseDriver>>> + Send>>;

/// Opens a driver from configuration
pub type DriverFactory = Arc<dyn Fn(DatabaseConfig) -> DriverFuture + Send + Sync>;

/// Configuration key to driver factory
#[derive(Clone)]
pub struct DriverRegistry {
    factories: HashMap<String, DriverFactory>,
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.names())
            .finish()
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("sqlite", |config: DatabaseConfig| async move {
            let settings = QuerySettings::from_config(&config);
            let driver =
                SqliteConnection::connect(&config.url, config.max_connections, settings).await?;
            Ok::<Arc<dyn DatabaseDriver>, Error>(Arc::new(driver))
        });
        registry.register("mysql", |config: DatabaseConfig| async move {
            let settings = QuerySettings::from_config(&config);
            let driver =
                MysqlConnection::connect(&config.url, config.max_connections, settings).await?;
            Ok::<Arc<dyn DatabaseDriver>, Error>(Arc::new(driver))
        });
        registry
    }
}

impl DriverRegistry {
    /// A registry with no drivers
    #[must_use]
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a factory under a key, replacing any previous one
    pub fn register<F, Fut>(&mut self, name: &str, factory: F)
    where
        F: Fn(DatabaseConfig) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn DatabaseDriver>>> + Send + 'static,
    {
        let factory: DriverFactory =
            Arc::new(move |config| -> DriverFuture { Box::pin(factory(config)) });
        self.factories.insert(name.to_ascii_lowercase(), factory);
    }

    /// Whether a key is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&name.to_ascii_lowercase())
    }

    /// Registered keys, sorted
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Open the driver named by `config.driver`
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownDriver` for unregistered keys, or whatever the
    /// factory reports when connecting fails.
    pub async fn connect(&self, config: &DatabaseConfig) -> Result<Arc<dyn DatabaseDriver>> {
        let factory = self
            .factories
            .get(&config.driver.to_ascii_lowercase())
            .ok_or_else(|| Error::UnknownDriver {
                name: config.driver.clone(),
            })?;

        let driver = factory(config.clone()).await?;
        info!(driver = driver.driver_name(), "Database driver ready");
        Ok(driver)
    }
}
