//! The collection-level store: keyed CRUD, searches, bulk mutation.
//!
//! A [`Store`] wraps one backend connection for one collection table.
//! Every operation runs inside a transaction; operations that mutate
//! under contention re-run up to [`RETRY_ATTEMPTS`] times when the
//! backend reports a conflict.

use crate::backend::{AnyBackend, Statements, Tx};
use crate::config::StoreConfig;
use crate::proxy::{RecordSet, RecordView};
use docstore_core::{
    format_timestamp, validate_document, Error, Order, Patch, Record, Result, SliceBounds,
};
use docstore_query::{
    parse_condition, render_condition, render_multi, render_search_filter, Column, ConditionExpr,
    EqMap, Provider, SearchFilter, SqlFilter, SqlParam,
};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Conflict retries per mutating operation
pub const RETRY_ATTEMPTS: usize = 3;

/// Record selector accepted by search/update/delete
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Exact key
    Key(String),
    /// Any of the listed keys
    Keys(Vec<String>),
    /// A condition-language expression, parsed per call
    Expr(String),
    /// A map-shaped filter
    Filter(SearchFilter),
}

impl Matcher {
    pub fn key(key: impl Into<String>) -> Matcher {
        Matcher::Key(key.into())
    }

    pub fn keys<I, S>(keys: I) -> Matcher
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Matcher::Keys(keys.into_iter().map(Into::into).collect())
    }

    pub fn expr(expr: impl Into<String>) -> Matcher {
        Matcher::Expr(expr.into())
    }
}

impl From<SearchFilter> for Matcher {
    fn from(filter: SearchFilter) -> Matcher {
        Matcher::Filter(filter)
    }
}

/// What a search returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    /// Ordered, sliced, validated records plus the filtered total
    #[default]
    Normal,
    /// Every matching record, unsliced and unvalidated
    Raw,
    /// Only the filtered total
    Count,
}

/// Column driving result order; ties always break by row id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderBy {
    /// Last-mutation time (the default)
    #[default]
    Update,
    /// Creation time
    Create,
    /// Record key
    Key,
}

impl OrderBy {
    fn column(self) -> &'static str {
        match self {
            OrderBy::Update => "update",
            OrderBy::Create => "create",
            OrderBy::Key => "key",
        }
    }
}

/// Per-call search/update/delete options
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// JSON column conditions apply to
    pub on: Column,
    /// Treat string equality as substring match (on by default)
    pub fuzzy: bool,
    pub mode: SearchMode,
    /// Column results order by
    pub order_by: OrderBy,
    /// Ordering override; the store default applies when unset
    pub order: Option<Order>,
    /// Slice override; unset bounds fall back to the store default
    pub slice: SliceBounds,
    /// Skip schema validation
    pub force: bool,
    /// Lock matched rows for the rest of the transaction
    pub for_update: bool,
}

impl Default for SearchOptions {
    fn default() -> SearchOptions {
        SearchOptions {
            on: Column::Data,
            fuzzy: true,
            mode: SearchMode::Normal,
            order_by: OrderBy::Update,
            order: None,
            slice: SliceBounds::all(),
            force: false,
            for_update: false,
        }
    }
}

impl SearchOptions {
    pub fn new() -> SearchOptions {
        SearchOptions::default()
    }

    pub fn on(mut self, column: Column) -> SearchOptions {
        self.on = column;
        self
    }

    /// Exact string equality instead of substring matching
    pub fn exact(mut self) -> SearchOptions {
        self.fuzzy = false;
        self
    }

    pub fn mode(mut self, mode: SearchMode) -> SearchOptions {
        self.mode = mode;
        self
    }

    pub fn order(mut self, order: Order) -> SearchOptions {
        self.order = Some(order);
        self
    }

    pub fn order_by(mut self, order_by: OrderBy) -> SearchOptions {
        self.order_by = order_by;
        self
    }

    pub fn slice(mut self, begin: i64, end: i64) -> SearchOptions {
        self.slice = SliceBounds::new(begin, end);
        self
    }

    pub fn force(mut self) -> SearchOptions {
        self.force = true;
        self
    }

    pub fn for_update(mut self) -> SearchOptions {
        self.for_update = true;
        self
    }
}

/// Result of a search: the page of records plus the filtered total
#[derive(Debug)]
pub struct SearchResult {
    pub records: RecordSet,
    /// Rows matching the filter before slicing
    pub total: u64,
}

struct StoreInner {
    config: StoreConfig,
    backend: AnyBackend,
    stmts: Statements,
}

/// Handle to one collection; cheap to clone and share across threads
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

/// Re-run `f` on backend conflicts, up to `attempts` tries total.
pub fn with_retry<T>(attempts: usize, mut f: impl FnMut() -> Result<T>) -> Result<T> {
    let mut tried = 0;
    loop {
        match f() {
            Err(e) if e.is_conflict() && tried + 1 < attempts => {
                tried += 1;
                tracing::warn!(
                    target: "docstore::store",
                    attempt = tried,
                    error = %e,
                    "conflict, retrying"
                );
            }
            other => return other,
        }
    }
}

fn trace_sql(sql: &str) {
    tracing::debug!(target: "docstore::sql", %sql);
}

fn generate_key() -> String {
    format!("STORE_{}", Uuid::new_v4().simple())
}

impl Store {
    /// Connect and ensure the collection table exists
    pub fn open(config: StoreConfig) -> Result<Store> {
        let backend = AnyBackend::open(&config)?;
        let stmts = Statements::new(config.provider, &config.table);
        backend.with_txn(|tx| {
            let ddl = stmts.create_table();
            trace_sql(&ddl);
            tx.execute(&ddl, &[])?;
            Ok(())
        })?;
        tracing::info!(
            target: "docstore::store",
            provider = %config.provider,
            table = %config.table,
            "opened collection"
        );
        Ok(Store {
            inner: Arc::new(StoreInner {
                config,
                backend,
                stmts,
            }),
        })
    }

    pub fn provider(&self) -> Provider {
        self.inner.backend.provider()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    fn matcher_filter(
        &self,
        matcher: &Matcher,
        on: Column,
        fuzzy: bool,
    ) -> Result<Option<SqlFilter>> {
        let provider = self.provider();
        match matcher {
            Matcher::Key(key) => {
                render_condition(&ConditionExpr::KeyEq(key.clone()), on, provider, 0)
            }
            Matcher::Keys(keys) if keys.is_empty() => Ok(Some(SqlFilter {
                sql: "1=0".to_string(),
                params: Vec::new(),
            })),
            Matcher::Keys(keys) => {
                render_condition(&ConditionExpr::KeyIn(keys.clone()), on, provider, 0)
            }
            Matcher::Expr(expr) => {
                render_condition(&parse_condition(expr)?, on, provider, 0)
            }
            Matcher::Filter(filter) => render_search_filter(filter, on, fuzzy, provider, 0),
        }
    }

    fn count_where(&self, tx: &mut dyn Tx, filter: Option<&SqlFilter>) -> Result<u64> {
        let sql = self.inner.stmts.count(filter.map(|f| f.sql.as_str()));
        trace_sql(&sql);
        tx.query_count(&sql, filter.map_or(&[], |f| f.params.as_slice()))
    }

    fn select_records(
        &self,
        tx: &mut dyn Tx,
        filter: Option<&SqlFilter>,
        order: Option<(OrderBy, Order)>,
        offset: u64,
        limit: Option<u64>,
        for_update: bool,
    ) -> Result<Vec<Record>> {
        let order = order.map(|(by, dir)| (by.column(), dir));
        let sql = self
            .inner
            .stmts
            .select(filter.map(|f| f.sql.as_str()), order, offset, limit, for_update);
        trace_sql(&sql);
        let rows = tx.query(&sql, filter.map_or(&[], |f| f.params.as_slice()))?;
        rows.into_iter().map(|row| row.into_record()).collect()
    }

    fn validate(&self, data: &Value, meta: &Value, key: &str) -> Result<()> {
        validate_document(data, meta, &self.inner.config.schemas, Some(key))
    }

    // ------------------------------------------------------------------
    // keyed access
    // ------------------------------------------------------------------

    /// Fetch one validated record by key
    pub fn get(&self, key: &str) -> Result<Option<Record>> {
        let filter = self.matcher_filter(&Matcher::key(key), Column::Data, false)?;
        let record = self.inner.backend.with_txn(|tx| {
            let mut records =
                self.select_records(tx, filter.as_ref(), None, 0, Some(1), false)?;
            Ok(records.pop())
        })?;
        if let Some(record) = &record {
            self.validate(&record.data, &record.meta, &record.key)?;
        }
        Ok(record)
    }

    /// The record's `data`, or `None` when the key is absent
    pub fn find(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.get(key)?.map(|r| r.data))
    }

    /// The record's `meta`, or `None` when the key is absent
    pub fn find_meta(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.get(key)?.map(|r| r.meta))
    }

    /// Insert a new record under a generated key
    ///
    /// Key generation retries once on the (astronomically unlikely)
    /// collision, then fails with [`Error::KeyCollision`].
    pub fn add(&self, data: Value) -> Result<RecordView> {
        self.add_inner(data, None)
    }

    /// [`add`](Store::add) with explicit meta instead of the configured
    /// default
    pub fn add_with_meta(&self, data: Value, meta: Value) -> Result<RecordView> {
        self.add_inner(data, Some(meta))
    }

    fn add_inner(&self, data: Value, meta: Option<Value>) -> Result<RecordView> {
        let meta = meta.unwrap_or_else(|| self.inner.config.default_meta.clone());
        let record = with_retry(RETRY_ATTEMPTS, || {
            self.inner.backend.with_txn(|tx| {
                let mut key = generate_key();
                if self.key_exists(tx, &key)? {
                    key = generate_key();
                    if self.key_exists(tx, &key)? {
                        return Err(Error::KeyCollision);
                    }
                }
                self.validate(&data, &meta, &key)?;
                self.insert_row(tx, &key, &data, &meta)?;
                self.fetch_by_key(tx, &key)
            })
        })?;
        Ok(RecordView::new(self.clone(), record))
    }

    /// Insert (or, with `update`, upsert) a record under an explicit key.
    ///
    /// With `update` false an existing key fails with
    /// [`Error::KeyExists`] and nothing is written. An existing
    /// record keeps its `create` timestamp.
    pub fn create(
        &self,
        key: &str,
        data: Value,
        meta: Option<Value>,
        update: bool,
    ) -> Result<RecordView> {
        let meta = meta.unwrap_or_else(|| self.inner.config.default_meta.clone());
        let record = with_retry(RETRY_ATTEMPTS, || {
            self.inner.backend.with_txn(|tx| {
                let existing = self.try_fetch_by_key(tx, key, true)?;
                if existing.is_some() && !update {
                    return Err(Error::KeyExists(key.to_string()));
                }
                self.validate(&data, &meta, key)?;
                match existing {
                    Some(old) => self.rewrite_row(tx, old.id, &data, &meta)?,
                    None => self.insert_row(tx, key, &data, &meta)?,
                }
                self.fetch_by_key(tx, key)
            })
        })?;
        Ok(RecordView::new(self.clone(), record))
    }

    /// Upsert `data` under `key`.
    ///
    /// An existing record keeps its stored meta (and with it any schema
    /// routing); only a fresh insert receives the configured default.
    pub fn set(&self, key: &str, data: Value) -> Result<RecordView> {
        let record = with_retry(RETRY_ATTEMPTS, || {
            self.inner.backend.with_txn(|tx| {
                match self.try_fetch_by_key(tx, key, true)? {
                    Some(old) => {
                        self.validate(&data, &old.meta, key)?;
                        self.rewrite_row(tx, old.id, &data, &old.meta)?;
                    }
                    None => {
                        let meta = self.inner.config.default_meta.clone();
                        self.validate(&data, &meta, key)?;
                        self.insert_row(tx, key, &data, &meta)?;
                    }
                }
                self.fetch_by_key(tx, key)
            })
        })?;
        Ok(RecordView::new(self.clone(), record))
    }

    /// Delete one record by key; `Ok(true)` when a row was removed
    pub fn delete_key(&self, key: &str) -> Result<bool> {
        let (_, n) = self.delete(&Matcher::key(key), &SearchOptions::new().force())?;
        Ok(n > 0)
    }

    // ------------------------------------------------------------------
    // search
    // ------------------------------------------------------------------

    /// Run a search per `opts`; see [`SearchMode`] for the three shapes
    pub fn search(&self, matcher: &Matcher, opts: &SearchOptions) -> Result<SearchResult> {
        let filter = self.matcher_filter(matcher, opts.on, opts.fuzzy)?;
        self.run_search(filter, opts)
    }

    /// Search with a disjunction of equality maps
    pub fn search_multi(&self, conditions: &[EqMap], opts: &SearchOptions) -> Result<SearchResult> {
        let filter = render_multi(conditions, opts.on, opts.fuzzy, self.provider(), 0)?;
        self.run_search(filter, opts)
    }

    fn run_search(&self, filter: Option<SqlFilter>, opts: &SearchOptions) -> Result<SearchResult> {
        let (records, total) = self.inner.backend.with_txn(|tx| {
            let total = self.count_where(tx, filter.as_ref())?;
            if opts.mode == SearchMode::Count {
                return Ok((Vec::new(), total));
            }
            let order = Some((opts.order_by, opts.order.unwrap_or(self.inner.config.order)));
            let records = match opts.mode {
                SearchMode::Raw => {
                    self.select_records(tx, filter.as_ref(), order, 0, None, opts.for_update)?
                }
                _ => {
                    let table_len = self.count_where(tx, None)?;
                    let (offset, limit) = opts
                        .slice
                        .or(self.inner.config.slice)
                        .normalize(table_len);
                    self.select_records(
                        tx,
                        filter.as_ref(),
                        order,
                        offset,
                        limit,
                        opts.for_update,
                    )?
                }
            };
            Ok((records, total))
        })?;
        if opts.mode == SearchMode::Normal && !opts.force {
            for record in &records {
                self.validate(&record.data, &record.meta, &record.key)?;
            }
        }
        Ok(SearchResult {
            records: RecordSet::new(self.clone(), records),
            total,
        })
    }

    /// Rows matching a condition expression
    pub fn count(&self, expr: &str) -> Result<u64> {
        let filter = self.matcher_filter(&Matcher::expr(expr), Column::Data, true)?;
        self.inner
            .backend
            .with_txn(|tx| self.count_where(tx, filter.as_ref()))
    }

    /// Total rows in the collection
    pub fn len(&self) -> Result<u64> {
        self.inner.backend.with_txn(|tx| self.count_where(tx, None))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    // ------------------------------------------------------------------
    // bulk mutation
    // ------------------------------------------------------------------

    /// Patch every matched record's `data` and/or `meta` in one
    /// transaction; returns the touched keys and their count.
    ///
    /// Matched rows are locked, patched, re-validated (unless `force`),
    /// and rewritten with a bumped `update` timestamp. Any failure rolls
    /// the whole batch back.
    pub fn update(
        &self,
        matcher: &Matcher,
        data: Option<&Patch>,
        meta: Option<&Patch>,
        opts: &SearchOptions,
    ) -> Result<(Vec<String>, usize)> {
        let filter = self.matcher_filter(matcher, opts.on, opts.fuzzy)?;
        with_retry(RETRY_ATTEMPTS, || {
            self.inner.backend.with_txn(|tx| {
                let records = self.select_for_mutation(tx, filter.as_ref(), opts)?;
                let now = format_timestamp(&Record::now());
                let mut keys = Vec::with_capacity(records.len());
                for record in records {
                    let new_data = match data {
                        Some(patch) => patch.apply(&record.data)?,
                        None => record.data,
                    };
                    let new_meta = match meta {
                        Some(patch) => patch.apply(&record.meta)?,
                        None => record.meta,
                    };
                    if !opts.force {
                        self.validate(&new_data, &new_meta, &record.key)?;
                    }
                    let sql = self.inner.stmts.update_row();
                    trace_sql(&sql);
                    tx.execute(
                        &sql,
                        &[
                            SqlParam::Text(serde_json::to_string(&new_data)?),
                            SqlParam::Text(serde_json::to_string(&new_meta)?),
                            SqlParam::Text(now.clone()),
                            SqlParam::Int(record.id),
                        ],
                    )?;
                    keys.push(record.key);
                }
                let n = keys.len();
                Ok((keys, n))
            })
        })
    }

    /// Delete every matched record in one transaction; returns the
    /// removed keys and their count.
    pub fn delete(
        &self,
        matcher: &Matcher,
        opts: &SearchOptions,
    ) -> Result<(Vec<String>, usize)> {
        let filter = self.matcher_filter(matcher, opts.on, opts.fuzzy)?;
        with_retry(RETRY_ATTEMPTS, || {
            self.inner.backend.with_txn(|tx| {
                let records = self.select_for_mutation(tx, filter.as_ref(), opts)?;
                if records.is_empty() {
                    return Ok((Vec::new(), 0));
                }
                let sql = self.inner.stmts.delete_by_ids(records.len());
                trace_sql(&sql);
                let ids: Vec<SqlParam> =
                    records.iter().map(|r| SqlParam::Int(r.id)).collect();
                tx.execute(&sql, &ids)?;
                let keys: Vec<String> = records.into_iter().map(|r| r.key).collect();
                let n = keys.len();
                Ok((keys, n))
            })
        })
    }

    /// Ordered, sliced, locked selection shared by update and delete
    fn select_for_mutation(
        &self,
        tx: &mut dyn Tx,
        filter: Option<&SqlFilter>,
        opts: &SearchOptions,
    ) -> Result<Vec<Record>> {
        let order = Some((opts.order_by, opts.order.unwrap_or(self.inner.config.order)));
        let (offset, limit) = if opts.slice.is_unbounded() && self.inner.config.slice.is_unbounded()
        {
            (0, None)
        } else {
            let table_len = self.count_where(tx, None)?;
            opts.slice.or(self.inner.config.slice).normalize(table_len)
        };
        self.select_records(tx, filter, order, offset, limit, true)
    }

    /// Condition-addressed assignment.
    ///
    /// A plain key upserts `data` under it; any other condition replaces
    /// the `data` of every match. Returns the affected keys.
    pub fn assign(&self, target: &str, data: Value) -> Result<Vec<String>> {
        if let ConditionExpr::KeyEq(key) = parse_condition(target)? {
            let view = self.set(&key, data)?;
            return Ok(vec![view.key().to_string()]);
        }
        let (keys, _) = self.update(
            &Matcher::expr(target),
            Some(&Patch::Replace(data)),
            None,
            &SearchOptions::new(),
        )?;
        Ok(keys)
    }

    /// Delete by condition expression; returns the removed row count
    pub fn remove(&self, target: &str) -> Result<usize> {
        let (_, n) = self.delete(&Matcher::expr(target), &SearchOptions::new().force())?;
        Ok(n)
    }

    // ------------------------------------------------------------------
    // row-level plumbing (shared with proxies)
    // ------------------------------------------------------------------

    fn key_exists(&self, tx: &mut dyn Tx, key: &str) -> Result<bool> {
        let filter = self.matcher_filter(&Matcher::key(key), Column::Data, false)?;
        Ok(self.count_where(tx, filter.as_ref())? > 0)
    }

    fn insert_row(&self, tx: &mut dyn Tx, key: &str, data: &Value, meta: &Value) -> Result<()> {
        let now = format_timestamp(&Record::now());
        let sql = self.inner.stmts.insert();
        trace_sql(&sql);
        tx.execute(
            &sql,
            &[
                SqlParam::Text(key.to_string()),
                SqlParam::Text(serde_json::to_string(data)?),
                SqlParam::Text(serde_json::to_string(meta)?),
                SqlParam::Text(now.clone()),
                SqlParam::Text(now),
            ],
        )?;
        Ok(())
    }

    fn rewrite_row(&self, tx: &mut dyn Tx, id: i64, data: &Value, meta: &Value) -> Result<()> {
        self.rewrite_row_at(tx, id, data, meta, &format_timestamp(&Record::now()))
    }

    fn rewrite_row_at(
        &self,
        tx: &mut dyn Tx,
        id: i64,
        data: &Value,
        meta: &Value,
        update: &str,
    ) -> Result<()> {
        let sql = self.inner.stmts.update_row();
        trace_sql(&sql);
        tx.execute(
            &sql,
            &[
                SqlParam::Text(serde_json::to_string(data)?),
                SqlParam::Text(serde_json::to_string(meta)?),
                SqlParam::Text(update.to_string()),
                SqlParam::Int(id),
            ],
        )?;
        Ok(())
    }

    fn try_fetch_by_key(
        &self,
        tx: &mut dyn Tx,
        key: &str,
        for_update: bool,
    ) -> Result<Option<Record>> {
        let filter = self.matcher_filter(&Matcher::key(key), Column::Data, false)?;
        let mut records =
            self.select_records(tx, filter.as_ref(), None, 0, Some(1), for_update)?;
        Ok(records.pop())
    }

    fn fetch_by_key(&self, tx: &mut dyn Tx, key: &str) -> Result<Record> {
        self.try_fetch_by_key(tx, key, false)?
            .ok_or_else(|| Error::RecordNotFound(key.to_string()))
    }

    /// Current state of one row, by id
    pub(crate) fn fetch_by_id(&self, id: i64) -> Result<Record> {
        self.inner.backend.with_txn(|tx| {
            let sql = self.inner.stmts.select_by_id(false);
            trace_sql(&sql);
            let mut rows = tx.query(&sql, &[SqlParam::Int(id)])?;
            match rows.pop() {
                Some(row) => row.into_record(),
                None => Err(Error::RecordNotFound(format!("record id {id}"))),
            }
        })
    }

    /// Lock one row, apply `f` to its decoded record, validate, rewrite.
    pub(crate) fn mutate_record(
        &self,
        id: i64,
        validate: bool,
        f: &dyn Fn(&mut Record) -> Result<()>,
    ) -> Result<Record> {
        with_retry(RETRY_ATTEMPTS, || {
            self.inner.backend.with_txn(|tx| {
                let sql = self.inner.stmts.select_by_id(true);
                trace_sql(&sql);
                let mut rows = tx.query(&sql, &[SqlParam::Int(id)])?;
                let row = rows
                    .pop()
                    .ok_or_else(|| Error::RecordNotFound(format!("record id {id}")))?;
                let mut record = row.into_record()?;
                f(&mut record)?;
                if validate {
                    self.validate(&record.data, &record.meta, &record.key)?;
                }
                record.update = Record::now();
                self.rewrite_row_at(
                    tx,
                    record.id,
                    &record.data,
                    &record.meta,
                    &format_timestamp(&record.update),
                )?;
                Ok(record)
            })
        })
    }

    /// Remove one row by id
    pub(crate) fn delete_by_id(&self, id: i64) -> Result<()> {
        with_retry(RETRY_ATTEMPTS, || {
            self.inner.backend.with_txn(|tx| {
                let sql = self.inner.stmts.delete_by_ids(1);
                trace_sql(&sql);
                let n = tx.execute(&sql, &[SqlParam::Int(id)])?;
                if n == 0 {
                    return Err(Error::RecordNotFound(format!("record id {id}")));
                }
                Ok(())
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> Store {
        Store::open(StoreConfig::in_memory()).unwrap()
    }

    #[test]
    fn add_then_get_round_trip() {
        let store = store();
        let view = store.add(json!({"n": 1})).unwrap();
        assert!(view.key().starts_with("STORE_"));

        let record = store.get(view.key()).unwrap().unwrap();
        assert_eq!(record.data, json!({"n": 1}));
        assert_eq!(record.meta, json!({}));
        assert!(record.update >= record.create);
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn create_without_update_flag_fails_on_existing_key() {
        let store = store();
        store.create("k1", json!({"n": 1}), None, false).unwrap();
        let err = store.create("k1", json!({"n": 2}), None, false).unwrap_err();
        assert!(matches!(err, Error::KeyExists(key) if key == "k1"));
        // nothing was mutated
        assert_eq!(store.find("k1").unwrap().unwrap(), json!({"n": 1}));
    }

    #[test]
    fn create_upserts_and_keeps_create_timestamp() {
        let store = store();
        let first = store.create("k1", json!({"n": 1}), None, false).unwrap();
        let created = *first.created_at();
        let second = store.create("k1", json!({"n": 2}), None, true).unwrap();
        assert_eq!(*second.created_at(), created);
        assert_eq!(store.find("k1").unwrap().unwrap(), json!({"n": 2}));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn set_keeps_stored_meta_on_existing_records() {
        let store = store();
        store
            .create("k1", json!({"n": 1}), Some(json!({"tag": "important"})), false)
            .unwrap();
        store.set("k1", json!({"n": 2})).unwrap();
        assert_eq!(store.find("k1").unwrap().unwrap(), json!({"n": 2}));
        assert_eq!(
            store.find_meta("k1").unwrap().unwrap(),
            json!({"tag": "important"})
        );

        // fresh inserts still pick up the configured default
        let store = Store::open(
            StoreConfig::in_memory().default_meta(json!({"source": "ingest"})),
        )
        .unwrap();
        store.set("k2", json!({"n": 1})).unwrap();
        assert_eq!(
            store.find_meta("k2").unwrap().unwrap(),
            json!({"source": "ingest"})
        );
        store.set("k2", json!({"n": 2})).unwrap();
        assert_eq!(
            store.find_meta("k2").unwrap().unwrap(),
            json!({"source": "ingest"})
        );
    }

    #[test]
    fn search_by_condition_expression() {
        let store = store();
        for n in 1..=5 {
            store
                .create(&format!("r{n}"), json!({"n": n}), None, false)
                .unwrap();
        }
        let result = store
            .search(&Matcher::expr("n>2"), &SearchOptions::new())
            .unwrap();
        assert_eq!(result.total, 3);
        let mut keys: Vec<_> = result.records.keys();
        keys.sort();
        assert_eq!(keys, ["r3", "r4", "r5"]);

        let result = store
            .search(&Matcher::expr("n:[1,2]"), &SearchOptions::new())
            .unwrap();
        assert_eq!(result.total, 2);
    }

    #[test]
    fn count_mode_returns_no_records() {
        let store = store();
        store.create("a", json!({"n": 1}), None, false).unwrap();
        store.create("b", json!({"n": 2}), None, false).unwrap();
        let result = store
            .search(
                &Matcher::expr("*"),
                &SearchOptions::new().mode(SearchMode::Count),
            )
            .unwrap();
        assert_eq!(result.total, 2);
        assert!(result.records.is_empty());
    }

    #[test]
    fn fuzzy_and_exact_filter_search() {
        let store = store();
        store
            .create("a", json!({"name": "alice"}), None, false)
            .unwrap();
        store
            .create("b", json!({"name": "ali"}), None, false)
            .unwrap();

        let filter = SearchFilter::new().eq("name", "ali");
        let result = store
            .search(&Matcher::Filter(filter.clone()), &SearchOptions::new())
            .unwrap();
        assert_eq!(result.total, 2);

        let result = store
            .search(&Matcher::Filter(filter), &SearchOptions::new().exact())
            .unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.records[0].key(), "b");
    }

    #[test]
    fn search_multi_is_a_disjunction() {
        let store = store();
        for n in 1..=4 {
            store
                .create(&format!("r{n}"), json!({"n": n}), None, false)
                .unwrap();
        }
        let conditions = vec![
            vec![("n".to_string(), json!(1))],
            vec![("n".to_string(), json!(4))],
        ];
        let result = store
            .search_multi(&conditions, &SearchOptions::new())
            .unwrap();
        assert_eq!(result.total, 2);
    }

    #[test]
    fn bulk_update_patches_matches_only() {
        let store = store();
        for n in 1..=5 {
            store
                .create(&format!("r{n}"), json!({"n": n}), None, false)
                .unwrap();
        }
        let patch = Patch::jsonpath([(
            "n",
            docstore_core::PatchValue::transform(|old| {
                json!(old.and_then(Value::as_i64).unwrap_or(0) + 10)
            }),
        )]);
        let (keys, n) = store
            .update(&Matcher::expr("n>2"), Some(&patch), None, &SearchOptions::new())
            .unwrap();
        assert_eq!(n, 3);
        assert_eq!(keys.len(), 3);

        assert_eq!(store.find("r1").unwrap().unwrap(), json!({"n": 1}));
        assert_eq!(store.find("r3").unwrap().unwrap(), json!({"n": 13}));
        assert_eq!(store.find("r5").unwrap().unwrap(), json!({"n": 15}));
        // the patched values no longer match the original condition
        assert_eq!(store.count("n>2 && n<10").unwrap(), 0);
    }

    #[test]
    fn keys_matcher_selects_listed_records() {
        let store = store();
        for n in 1..=3 {
            store
                .create(&format!("r{n}"), json!({"n": n}), None, false)
                .unwrap();
        }
        let result = store
            .search(&Matcher::keys(["r1", "r3"]), &SearchOptions::new())
            .unwrap();
        assert_eq!(result.total, 2);

        let result = store
            .search(&Matcher::keys(Vec::<String>::new()), &SearchOptions::new())
            .unwrap();
        assert_eq!(result.total, 0);
    }

    #[test]
    fn bulk_delete_returns_keys() {
        let store = store();
        for n in 1..=4 {
            store
                .create(&format!("r{n}"), json!({"n": n}), None, false)
                .unwrap();
        }
        let (keys, n) = store
            .delete(&Matcher::expr("n<3"), &SearchOptions::new())
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(keys.len(), 2);
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn assign_upserts_plain_keys_and_replaces_matches() {
        let store = store();
        let keys = store.assign("k1", json!({"n": 1})).unwrap();
        assert_eq!(keys, ["k1"]);

        store.create("k2", json!({"n": 5}), None, false).unwrap();
        let keys = store.assign("n>0", json!({"n": 0})).unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(store.find("k2").unwrap().unwrap(), json!({"n": 0}));
    }

    #[test]
    fn ordering_defaults_to_newest_update_first() {
        let store = store();
        store.create("old", json!({"n": 1}), None, false).unwrap();
        store.create("new", json!({"n": 2}), None, false).unwrap();
        // same second: ties break by id, still newest first
        let result = store
            .search(&Matcher::expr("*"), &SearchOptions::new())
            .unwrap();
        assert_eq!(result.records[0].key(), "new");

        let result = store
            .search(&Matcher::expr("*"), &SearchOptions::new().order(Order::Asc))
            .unwrap();
        assert_eq!(result.records[0].key(), "old");
    }

    #[test]
    fn slices_normalize_against_table_length() {
        let store = store();
        for n in 1..=5 {
            store
                .create(&format!("r{n}"), json!({"n": n}), None, false)
                .unwrap();
        }
        let result = store
            .search(
                &Matcher::expr("*"),
                &SearchOptions::new().order(Order::Asc).slice(-2, -1),
            )
            .unwrap();
        assert_eq!(result.total, 5);
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].key(), "r4");
    }

    #[test]
    fn retry_wrapper_retries_conflicts_only() {
        let mut calls = 0;
        let result: Result<u32> = with_retry(3, || {
            calls += 1;
            if calls < 3 {
                Err(Error::Conflict("locked".into()))
            } else {
                Ok(7)
            }
        });
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls, 3);

        let mut calls = 0;
        let result: Result<u32> = with_retry(3, || {
            calls += 1;
            Err(Error::Conflict("locked".into()))
        });
        assert!(result.unwrap_err().is_conflict());
        assert_eq!(calls, 3);

        let mut calls = 0;
        let result: Result<u32> = with_retry(3, || {
            calls += 1;
            Err(Error::Backend("hard failure".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
