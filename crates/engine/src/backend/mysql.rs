//! MySQL backend over the synchronous `mysql` client.

use super::{RawRow, Tx};
use crate::config::StoreConfig;
use docstore_core::{Error, Result};
use docstore_query::SqlParam;
use mysql::prelude::Queryable;
use mysql::{Conn, Opts, OptsBuilder, Params, TxOpts};
use parking_lot::Mutex;

pub struct MysqlBackend {
    conn: Mutex<Conn>,
}

impl MysqlBackend {
    pub fn open(config: &StoreConfig) -> Result<MysqlBackend> {
        let opts: Opts = OptsBuilder::new()
            .ip_or_hostname(Some(config.host.clone()))
            .tcp_port(config.port)
            .user(Some(config.user.clone()))
            .pass(Some(config.password.clone()))
            .db_name(Some(config.database.clone()))
            .into();
        let conn = Conn::new(opts).map_err(map_err)?;
        Ok(MysqlBackend {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_txn<T>(&self, f: impl FnOnce(&mut dyn Tx) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock();
        let tx = conn.start_transaction(TxOpts::default()).map_err(map_err)?;
        let mut mtx = MyTx { tx };
        let out = f(&mut mtx)?;
        mtx.tx.commit().map_err(map_err)?;
        Ok(out)
    }
}

struct MyTx<'a> {
    tx: mysql::Transaction<'a>,
}

fn bind(params: &[SqlParam]) -> Params {
    if params.is_empty() {
        return Params::Empty;
    }
    Params::Positional(
        params
            .iter()
            .map(|p| match p {
                SqlParam::Null => mysql::Value::NULL,
                SqlParam::Bool(b) => mysql::Value::Int(i64::from(*b)),
                SqlParam::Int(i) => mysql::Value::Int(*i),
                SqlParam::Float(f) => mysql::Value::Double(*f),
                SqlParam::Text(s) => mysql::Value::Bytes(s.clone().into_bytes()),
            })
            .collect(),
    )
}

impl Tx for MyTx<'_> {
    fn execute(&mut self, sql: &str, params: &[SqlParam]) -> Result<usize> {
        self.tx.exec_drop(sql, bind(params)).map_err(map_err)?;
        Ok(self.tx.affected_rows() as usize)
    }

    fn query(&mut self, sql: &str, params: &[SqlParam]) -> Result<Vec<RawRow>> {
        let rows: Vec<(i64, String, String, String, String, String)> =
            self.tx.exec(sql, bind(params)).map_err(map_err)?;
        Ok(rows
            .into_iter()
            .map(|(id, key, data, meta, create, update)| RawRow {
                id,
                key,
                data,
                meta,
                create,
                update,
            })
            .collect())
    }

    fn query_count(&mut self, sql: &str, params: &[SqlParam]) -> Result<u64> {
        let n: Option<i64> = self.tx.exec_first(sql, bind(params)).map_err(map_err)?;
        Ok(n.unwrap_or(0).max(0) as u64)
    }
}

fn map_err(e: mysql::Error) -> Error {
    match &e {
        // 1213: deadlock found, 1205: lock wait timeout
        mysql::Error::MySqlError(server) if server.code == 1213 || server.code == 1205 => {
            Error::Conflict(e.to_string())
        }
        _ => Error::Backend(e.to_string()),
    }
}
