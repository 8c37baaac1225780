//! Store configuration.

use docstore_core::{Order, SchemaRegistry, SliceBounds};
use docstore_query::Provider;
use serde_json::{json, Value};

/// Everything needed to open one collection.
///
/// Built with the builder methods; unspecified settings keep defaults
/// (`database.sqlite` file, `store` table, newest-first ordering, no
/// default slice, empty schema registry).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Backing provider
    pub provider: Provider,
    /// SQLite database file; `:memory:` for an in-memory store
    pub filename: String,
    /// Server host (mysql/postgres)
    pub host: String,
    /// Server port (mysql/postgres)
    pub port: u16,
    /// Server user
    pub user: String,
    /// Server password
    pub password: String,
    /// Database name (mysql/postgres)
    pub database: String,
    /// Collection table name
    pub table: String,
    /// Default result ordering by update time
    pub order: Order,
    /// Default slice applied when a search does not set bounds
    pub slice: SliceBounds,
    /// Registered validation schemas, keyed by version
    pub schemas: SchemaRegistry,
    /// Metadata attached to records added without explicit meta
    pub default_meta: Value,
}

impl StoreConfig {
    pub fn new(provider: Provider) -> StoreConfig {
        StoreConfig {
            provider,
            filename: "database.sqlite".to_string(),
            host: "localhost".to_string(),
            port: match provider {
                Provider::Mysql => 3306,
                _ => 5432,
            },
            user: "test".to_string(),
            password: "test".to_string(),
            database: "test".to_string(),
            table: "store".to_string(),
            order: Order::default(),
            slice: SliceBounds::all(),
            schemas: SchemaRegistry::default(),
            default_meta: json!({}),
        }
    }

    /// SQLite store backed by a file
    pub fn sqlite(path: impl Into<String>) -> StoreConfig {
        StoreConfig::new(Provider::Sqlite).filename(path)
    }

    /// In-memory SQLite store
    pub fn in_memory() -> StoreConfig {
        StoreConfig::sqlite(":memory:")
    }

    pub fn filename(mut self, path: impl Into<String>) -> StoreConfig {
        self.filename = path.into();
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> StoreConfig {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> StoreConfig {
        self.port = port;
        self
    }

    pub fn credentials(
        mut self,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> StoreConfig {
        self.user = user.into();
        self.password = password.into();
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> StoreConfig {
        self.database = database.into();
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> StoreConfig {
        self.table = table.into();
        self
    }

    pub fn order(mut self, order: Order) -> StoreConfig {
        self.order = order;
        self
    }

    pub fn slice(mut self, slice: SliceBounds) -> StoreConfig {
        self.slice = slice;
        self
    }

    pub fn schemas(mut self, schemas: SchemaRegistry) -> StoreConfig {
        self.schemas = schemas;
        self
    }

    pub fn default_meta(mut self, meta: Value) -> StoreConfig {
        self.default_meta = meta;
        self
    }
}
