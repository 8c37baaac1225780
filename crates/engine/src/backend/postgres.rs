//! PostgreSQL backend over the synchronous `postgres` client.

use super::{RawRow, Tx};
use crate::config::StoreConfig;
use docstore_core::{Error, Result};
use docstore_query::SqlParam;
use parking_lot::Mutex;
use postgres::error::SqlState;
use postgres::types::ToSql;
use postgres::{Client, NoTls};

pub struct PostgresBackend {
    client: Mutex<Client>,
}

impl PostgresBackend {
    pub fn open(config: &StoreConfig) -> Result<PostgresBackend> {
        let client = postgres::Config::new()
            .host(&config.host)
            .port(config.port)
            .user(&config.user)
            .password(&config.password)
            .dbname(&config.database)
            .connect(NoTls)
            .map_err(map_err)?;
        Ok(PostgresBackend {
            client: Mutex::new(client),
        })
    }

    pub fn with_txn<T>(&self, f: impl FnOnce(&mut dyn Tx) -> Result<T>) -> Result<T> {
        let mut client = self.client.lock();
        let tx = client.transaction().map_err(map_err)?;
        let mut ptx = PgTx { tx };
        let out = f(&mut ptx)?;
        ptx.tx.commit().map_err(map_err)?;
        Ok(out)
    }
}

struct PgTx<'a> {
    tx: postgres::Transaction<'a>,
}

fn bind(params: &[SqlParam]) -> Vec<Box<dyn ToSql + Sync>> {
    params
        .iter()
        .map(|p| -> Box<dyn ToSql + Sync> {
            match p {
                SqlParam::Null => Box::new(Option::<String>::None),
                SqlParam::Bool(b) => Box::new(*b),
                SqlParam::Int(i) => Box::new(*i),
                SqlParam::Float(f) => Box::new(*f),
                SqlParam::Text(s) => Box::new(s.clone()),
            }
        })
        .collect()
}

impl Tx for PgTx<'_> {
    fn execute(&mut self, sql: &str, params: &[SqlParam]) -> Result<usize> {
        let boxed = bind(params);
        let refs: Vec<&(dyn ToSql + Sync)> = boxed.iter().map(AsRef::as_ref).collect();
        let n = self.tx.execute(sql, &refs).map_err(map_err)?;
        Ok(n as usize)
    }

    fn query(&mut self, sql: &str, params: &[SqlParam]) -> Result<Vec<RawRow>> {
        let boxed = bind(params);
        let refs: Vec<&(dyn ToSql + Sync)> = boxed.iter().map(AsRef::as_ref).collect();
        let rows = self.tx.query(sql, &refs).map_err(map_err)?;
        Ok(rows
            .into_iter()
            .map(|row| RawRow {
                id: row.get(0),
                key: row.get(1),
                data: row.get(2),
                meta: row.get(3),
                create: row.get(4),
                update: row.get(5),
            })
            .collect())
    }

    fn query_count(&mut self, sql: &str, params: &[SqlParam]) -> Result<u64> {
        let boxed = bind(params);
        let refs: Vec<&(dyn ToSql + Sync)> = boxed.iter().map(AsRef::as_ref).collect();
        let row = self.tx.query_one(sql, &refs).map_err(map_err)?;
        let n: i64 = row.get(0);
        Ok(n.max(0) as u64)
    }
}

fn map_err(e: postgres::Error) -> Error {
    match e.code() {
        Some(code)
            if *code == SqlState::T_R_SERIALIZATION_FAILURE
                || *code == SqlState::T_R_DEADLOCK_DETECTED
                || *code == SqlState::LOCK_NOT_AVAILABLE =>
        {
            Error::Conflict(e.to_string())
        }
        _ => Error::Backend(e.to_string()),
    }
}
