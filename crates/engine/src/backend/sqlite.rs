//! SQLite backend over rusqlite.
//!
//! One connection guarded by a mutex; transactions open with
//! `BEGIN IMMEDIATE` so writers take the write lock up front and busy
//! errors surface as [`Error::Conflict`] instead of deadlocking late.

use super::{RawRow, Tx};
use docstore_core::{Error, Result};
use docstore_query::SqlParam;
use parking_lot::Mutex;
use rusqlite::{Connection, ErrorCode, TransactionBehavior};
use std::time::Duration;

pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    pub fn open(path: &str) -> Result<SqliteBackend> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(map_err)?;
        conn.busy_timeout(Duration::from_secs(5)).map_err(map_err)?;
        Ok(SqliteBackend {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_txn<T>(&self, f: impl FnOnce(&mut dyn Tx) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(map_err)?;
        let out = {
            let mut stx = SqliteTx { tx: &tx };
            f(&mut stx)?
        };
        tx.commit().map_err(map_err)?;
        Ok(out)
    }
}

struct SqliteTx<'a> {
    tx: &'a rusqlite::Transaction<'a>,
}

fn bind(params: &[SqlParam]) -> Vec<rusqlite::types::Value> {
    use rusqlite::types::Value;
    params
        .iter()
        .map(|p| match p {
            SqlParam::Null => Value::Null,
            SqlParam::Bool(b) => Value::Integer(i64::from(*b)),
            SqlParam::Int(i) => Value::Integer(*i),
            SqlParam::Float(f) => Value::Real(*f),
            SqlParam::Text(s) => Value::Text(s.clone()),
        })
        .collect()
}

impl Tx for SqliteTx<'_> {
    fn execute(&mut self, sql: &str, params: &[SqlParam]) -> Result<usize> {
        self.tx
            .execute(sql, rusqlite::params_from_iter(bind(params)))
            .map_err(map_err)
    }

    fn query(&mut self, sql: &str, params: &[SqlParam]) -> Result<Vec<RawRow>> {
        let mut stmt = self.tx.prepare(sql).map_err(map_err)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(bind(params)), |row| {
                Ok(RawRow {
                    id: row.get(0)?,
                    key: row.get(1)?,
                    data: row.get(2)?,
                    meta: row.get(3)?,
                    create: row.get(4)?,
                    update: row.get(5)?,
                })
            })
            .map_err(map_err)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(map_err)?);
        }
        Ok(out)
    }

    fn query_count(&mut self, sql: &str, params: &[SqlParam]) -> Result<u64> {
        let n: i64 = self
            .tx
            .query_row(sql, rusqlite::params_from_iter(bind(params)), |row| {
                row.get(0)
            })
            .map_err(map_err)?;
        Ok(n.max(0) as u64)
    }
}

fn map_err(e: rusqlite::Error) -> Error {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
        {
            Error::Conflict(e.to_string())
        }
        _ => Error::Backend(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_create_insert_query() {
        let backend = SqliteBackend::open(":memory:").unwrap();
        backend
            .with_txn(|tx| {
                tx.execute(
                    "CREATE TABLE \"store\" (id INTEGER PRIMARY KEY AUTOINCREMENT, \
                     \"key\" TEXT NOT NULL UNIQUE, data TEXT NOT NULL, meta TEXT NOT NULL, \
                     \"create\" TEXT NOT NULL, \"update\" TEXT NOT NULL)",
                    &[],
                )?;
                tx.execute(
                    "INSERT INTO \"store\" (\"key\", data, meta, \"create\", \"update\") \
                     VALUES (?, ?, ?, ?, ?)",
                    &[
                        SqlParam::Text("k1".into()),
                        SqlParam::Text("{\"n\":1}".into()),
                        SqlParam::Text("{}".into()),
                        SqlParam::Text("2024-05-01T12:00:00".into()),
                        SqlParam::Text("2024-05-01T12:00:00".into()),
                    ],
                )?;
                Ok(())
            })
            .unwrap();

        let rows = backend
            .with_txn(|tx| {
                tx.query(
                    "SELECT id, \"key\", data, meta, \"create\", \"update\" FROM \"store\"",
                    &[],
                )
            })
            .unwrap();
        assert_eq!(rows.len(), 1);
        let record = rows[0].clone().into_record().unwrap();
        assert_eq!(record.key, "k1");
        assert_eq!(record.data["n"], 1);
    }

    #[test]
    fn failed_closure_rolls_back() {
        let backend = SqliteBackend::open(":memory:").unwrap();
        backend
            .with_txn(|tx| {
                tx.execute("CREATE TABLE t (n INTEGER)", &[])?;
                Ok(())
            })
            .unwrap();
        let result: Result<()> = backend.with_txn(|tx| {
            tx.execute("INSERT INTO t (n) VALUES (?)", &[SqlParam::Int(1)])?;
            Err(Error::Backend("boom".into()))
        });
        assert!(result.is_err());
        let n = backend
            .with_txn(|tx| tx.query_count("SELECT COUNT(*) FROM t", &[]))
            .unwrap();
        assert_eq!(n, 0);
    }
}
