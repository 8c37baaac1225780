//! Backend abstraction: one transactional connection per provider.
//!
//! Every statement the engine runs goes through the object-safe [`Tx`]
//! trait inside a transaction opened by [`AnyBackend::with_txn`]. Each
//! backend maps its driver's contention errors (busy, deadlock,
//! serialization failure) to [`Error::Conflict`] so the store's retry
//! wrapper can re-run the closure.

pub(crate) mod sqlite;

#[cfg(feature = "mysql")]
pub(crate) mod mysql;
#[cfg(feature = "postgres")]
pub(crate) mod postgres;

use crate::config::StoreConfig;
use docstore_core::{parse_timestamp, Error, Order, Record, Result};
use docstore_query::{Provider, SqlParam};
use serde_json::Value;

/// One row of the records table as the driver returned it
#[derive(Debug, Clone)]
pub struct RawRow {
    pub id: i64,
    pub key: String,
    pub data: String,
    pub meta: String,
    pub create: String,
    pub update: String,
}

impl RawRow {
    /// Decode the JSON columns and timestamps into a [`Record`]
    pub fn into_record(self) -> Result<Record> {
        Ok(Record {
            id: self.id,
            key: self.key,
            data: serde_json::from_str::<Value>(&self.data)?,
            meta: serde_json::from_str::<Value>(&self.meta)?,
            create: parse_timestamp(&self.create)?,
            update: parse_timestamp(&self.update)?,
        })
    }
}

/// Statement execution inside one open transaction
pub trait Tx {
    /// Run a statement, returning the number of affected rows
    fn execute(&mut self, sql: &str, params: &[SqlParam]) -> Result<usize>;

    /// Run a record-shaped query
    fn query(&mut self, sql: &str, params: &[SqlParam]) -> Result<Vec<RawRow>>;

    /// Run a single-value count query
    fn query_count(&mut self, sql: &str, params: &[SqlParam]) -> Result<u64>;
}

/// A configured backend connection
pub enum AnyBackend {
    Sqlite(sqlite::SqliteBackend),
    #[cfg(feature = "postgres")]
    Postgres(postgres::PostgresBackend),
    #[cfg(feature = "mysql")]
    Mysql(mysql::MysqlBackend),
}

impl AnyBackend {
    /// Connect per the configured provider
    pub fn open(config: &StoreConfig) -> Result<AnyBackend> {
        match config.provider {
            Provider::Sqlite => Ok(AnyBackend::Sqlite(sqlite::SqliteBackend::open(
                &config.filename,
            )?)),
            #[cfg(feature = "postgres")]
            Provider::Postgres => Ok(AnyBackend::Postgres(postgres::PostgresBackend::open(
                config,
            )?)),
            #[cfg(feature = "mysql")]
            Provider::Mysql => Ok(AnyBackend::Mysql(mysql::MysqlBackend::open(config)?)),
            #[allow(unreachable_patterns)]
            other => Err(Error::UnsupportedProvider(format!(
                "{other} support is not compiled in"
            ))),
        }
    }

    pub fn provider(&self) -> Provider {
        match self {
            AnyBackend::Sqlite(_) => Provider::Sqlite,
            #[cfg(feature = "postgres")]
            AnyBackend::Postgres(_) => Provider::Postgres,
            #[cfg(feature = "mysql")]
            AnyBackend::Mysql(_) => Provider::Mysql,
        }
    }

    /// Run `f` inside a fresh transaction, committing on `Ok`
    pub fn with_txn<T>(&self, f: impl FnOnce(&mut dyn Tx) -> Result<T>) -> Result<T> {
        match self {
            AnyBackend::Sqlite(b) => b.with_txn(f),
            #[cfg(feature = "postgres")]
            AnyBackend::Postgres(b) => b.with_txn(f),
            #[cfg(feature = "mysql")]
            AnyBackend::Mysql(b) => b.with_txn(f),
        }
    }
}

/// Statement text builders for one collection table.
///
/// All identifiers are quoted through the provider ("create" and "update"
/// are reserved words on every backend); every value position is a
/// placeholder.
pub(crate) struct Statements {
    provider: Provider,
    table: String,
}

impl Statements {
    pub fn new(provider: Provider, table: &str) -> Statements {
        Statements {
            provider,
            table: table.to_string(),
        }
    }

    fn t(&self) -> String {
        self.provider.quote_ident(&self.table)
    }

    fn q(&self, ident: &str) -> String {
        self.provider.quote_ident(ident)
    }

    fn ph(&self, n: usize) -> String {
        self.provider.placeholder(n)
    }

    pub fn create_table(&self) -> String {
        let (id_col, json_ty) = match self.provider {
            Provider::Sqlite => ("id INTEGER PRIMARY KEY AUTOINCREMENT", "TEXT"),
            Provider::Mysql => ("id BIGINT AUTO_INCREMENT PRIMARY KEY", "JSON"),
            Provider::Postgres => ("id BIGSERIAL PRIMARY KEY", "JSONB"),
        };
        // mysql cannot put a UNIQUE index on unbounded TEXT; the timestamp
        // wire format is fixed-width anyway
        let (key_ty, ts_ty) = match self.provider {
            Provider::Mysql => ("VARCHAR(255)", "VARCHAR(32)"),
            _ => ("TEXT", "TEXT"),
        };
        format!(
            "CREATE TABLE IF NOT EXISTS {t} ({id_col}, \
             {key} {key_ty} NOT NULL UNIQUE, \
             data {json_ty} NOT NULL, \
             meta {json_ty} NOT NULL, \
             {create} {ts_ty} NOT NULL, \
             {update} {ts_ty} NOT NULL)",
            t = self.t(),
            key = self.q("key"),
            create = self.q("create"),
            update = self.q("update"),
        )
    }

    /// Column list of record-shaped SELECTs; JSONB columns come back as text
    fn select_columns(&self) -> String {
        let json_cols = match self.provider {
            Provider::Postgres => "data::text, meta::text",
            _ => "data, meta",
        };
        format!(
            "id, {key}, {json_cols}, {create}, {update}",
            key = self.q("key"),
            create = self.q("create"),
            update = self.q("update"),
        )
    }

    /// `SELECT <cols> FROM <table>` with optional filter, ordering,
    /// pagination, and row locking. `order` names the driving column;
    /// ties always break by id in the same direction.
    pub fn select(
        &self,
        filter: Option<&str>,
        order: Option<(&str, Order)>,
        offset: u64,
        limit: Option<u64>,
        for_update: bool,
    ) -> String {
        let mut sql = format!("SELECT {} FROM {}", self.select_columns(), self.t());
        if let Some(filter) = filter {
            sql.push_str(" WHERE ");
            sql.push_str(filter);
        }
        if let Some((column, order)) = order {
            let kw = order.keyword();
            sql.push_str(&format!(
                " ORDER BY {col} {kw}, id {kw}",
                col = self.q(column)
            ));
        }
        sql.push_str(&self.limit_offset(offset, limit));
        if for_update {
            sql.push_str(self.provider.for_update_clause());
        }
        sql
    }

    fn limit_offset(&self, offset: u64, limit: Option<u64>) -> String {
        match (offset, limit) {
            (0, None) => String::new(),
            (off, Some(lim)) => format!(" LIMIT {lim} OFFSET {off}"),
            (off, None) => match self.provider {
                // mysql has no offset without limit
                Provider::Mysql => format!(" LIMIT 18446744073709551615 OFFSET {off}"),
                Provider::Sqlite => format!(" LIMIT -1 OFFSET {off}"),
                Provider::Postgres => format!(" OFFSET {off}"),
            },
        }
    }

    pub fn count(&self, filter: Option<&str>) -> String {
        let mut sql = format!("SELECT COUNT(*) FROM {}", self.t());
        if let Some(filter) = filter {
            sql.push_str(" WHERE ");
            sql.push_str(filter);
        }
        sql
    }

    fn jsonb(&self, n: usize) -> String {
        match self.provider {
            Provider::Postgres => format!("{}::jsonb", self.ph(n)),
            _ => self.ph(n),
        }
    }

    /// Insert a full row; binds `(key, data, meta, create, update)`
    pub fn insert(&self) -> String {
        format!(
            "INSERT INTO {t} ({key}, data, meta, {create}, {update}) \
             VALUES ({p1}, {p2}, {p3}, {p4}, {p5})",
            t = self.t(),
            key = self.q("key"),
            create = self.q("create"),
            update = self.q("update"),
            p1 = self.ph(1),
            p2 = self.jsonb(2),
            p3 = self.jsonb(3),
            p4 = self.ph(4),
            p5 = self.ph(5),
        )
    }

    /// Rewrite one row's payload; binds `(data, meta, update, id)`
    pub fn update_row(&self) -> String {
        format!(
            "UPDATE {t} SET data = {p1}, meta = {p2}, {update} = {p3} WHERE id = {p4}",
            t = self.t(),
            update = self.q("update"),
            p1 = self.jsonb(1),
            p2 = self.jsonb(2),
            p3 = self.ph(3),
            p4 = self.ph(4),
        )
    }

    /// Select one row by id; binds `(id,)`
    pub fn select_by_id(&self, for_update: bool) -> String {
        let mut sql = format!(
            "SELECT {} FROM {} WHERE id = {}",
            self.select_columns(),
            self.t(),
            self.ph(1)
        );
        if for_update {
            sql.push_str(self.provider.for_update_clause());
        }
        sql
    }

    /// Delete rows by id list
    pub fn delete_by_ids(&self, n: usize) -> String {
        let placeholders: Vec<String> = (1..=n).map(|i| self.ph(i)).collect();
        format!(
            "DELETE FROM {} WHERE id IN ({})",
            self.t(),
            placeholders.join(", ")
        )
    }
}
