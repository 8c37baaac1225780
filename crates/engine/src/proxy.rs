//! Live record handles.
//!
//! A [`RecordView`] pairs one record's last-seen state with its store so
//! path reads hit the database and path writes persist immediately
//! (locked, validated, timestamp-bumped). A [`RecordSet`] is an ordered
//! page of views that can broadcast path operations.

use crate::store::Store;
use chrono::NaiveDateTime;
use docstore_core::{
    delete_at_path, format_timestamp, get_at_path, set_at_path, DocPath, Record, Result,
};
use serde_json::Value;
use std::fmt;
use std::ops::Index;

/// One stored record plus the store it came from
#[derive(Clone)]
pub struct RecordView {
    store: Store,
    id: i64,
    key: String,
    data: Value,
    meta: Value,
    create: NaiveDateTime,
    update: NaiveDateTime,
}

impl RecordView {
    pub(crate) fn new(store: Store, record: Record) -> RecordView {
        RecordView {
            store,
            id: record.id,
            key: record.key,
            data: record.data,
            meta: record.meta,
            create: record.create,
            update: record.update,
        }
    }

    fn sync(&mut self, record: Record) {
        self.data = record.data;
        self.meta = record.meta;
        self.update = record.update;
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Last-seen document body; [`get_path`](Self::get_path) for live reads
    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn meta(&self) -> &Value {
        &self.meta
    }

    pub fn created_at(&self) -> &NaiveDateTime {
        &self.create
    }

    pub fn updated_at(&self) -> &NaiveDateTime {
        &self.update
    }

    /// Re-read the record from the store
    pub fn refresh(&mut self) -> Result<()> {
        let record = self.store.fetch_by_id(self.id)?;
        self.sync(record);
        Ok(())
    }

    /// Read a data path from the current stored state
    pub fn get_path(&self, path: &str) -> Result<Option<Value>> {
        let path = DocPath::parse(path)?;
        let record = self.store.fetch_by_id(self.id)?;
        Ok(get_at_path(&record.data, &path).cloned())
    }

    /// Read a meta path from the current stored state
    pub fn get_meta_path(&self, path: &str) -> Result<Option<Value>> {
        let path = DocPath::parse(path)?;
        let record = self.store.fetch_by_id(self.id)?;
        Ok(get_at_path(&record.meta, &path).cloned())
    }

    /// Write one data path and persist
    pub fn set_path(&mut self, path: &str, value: Value) -> Result<()> {
        self.set_path_many(&[(path.to_string(), value)])
    }

    /// Write several data paths in one locked write
    pub fn set_path_many(&mut self, pairs: &[(String, Value)]) -> Result<()> {
        let parsed: Vec<(DocPath, Value)> = pairs
            .iter()
            .map(|(p, v)| Ok((DocPath::parse(p)?, v.clone())))
            .collect::<Result<_>>()?;
        let record = self.store.mutate_record(self.id, true, &move |record| {
            for (path, value) in &parsed {
                set_at_path(&mut record.data, path, value.clone())?;
            }
            Ok(())
        })?;
        self.sync(record);
        Ok(())
    }

    /// Replace the whole document body
    pub fn replace_data(&mut self, data: Value) -> Result<()> {
        let record = self.store.mutate_record(self.id, true, &move |record| {
            record.data = data.clone();
            Ok(())
        })?;
        self.sync(record);
        Ok(())
    }

    /// Replace the whole metadata document
    pub fn replace_meta(&mut self, meta: Value) -> Result<()> {
        let record = self.store.mutate_record(self.id, true, &move |record| {
            record.meta = meta.clone();
            Ok(())
        })?;
        self.sync(record);
        Ok(())
    }

    /// Replace body and metadata together
    pub fn replace_all(&mut self, data: Value, meta: Value) -> Result<()> {
        let record = self.store.mutate_record(self.id, true, &move |record| {
            record.data = data.clone();
            record.meta = meta.clone();
            Ok(())
        })?;
        self.sync(record);
        Ok(())
    }

    /// Write one meta path and persist
    pub fn update_meta_path(&mut self, path: &str, value: Value) -> Result<()> {
        let path = DocPath::parse(path)?;
        let record = self.store.mutate_record(self.id, true, &move |record| {
            set_at_path(&mut record.meta, &path, value.clone())
        })?;
        self.sync(record);
        Ok(())
    }

    /// Remove one meta path and persist
    pub fn delete_meta_path(&mut self, path: &str) -> Result<()> {
        let path = DocPath::parse(path)?;
        let record = self.store.mutate_record(self.id, true, &move |record| {
            delete_at_path(&mut record.meta, &path)
        })?;
        self.sync(record);
        Ok(())
    }

    /// Delete a data path.
    ///
    /// Deleting any data path discards the WHOLE record, not just the
    /// addressed field; meta fields come off individually through
    /// [`delete_meta_path`](Self::delete_meta_path). Use
    /// [`replace_data`](Self::replace_data) to drop a single data field.
    pub fn delete_path(self, path: &str) -> Result<()> {
        DocPath::parse(path)?;
        self.store.delete_by_id(self.id)
    }

    /// Delete the record
    pub fn delete(self) -> Result<()> {
        self.store.delete_by_id(self.id)
    }
}

impl fmt::Display for RecordView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id: {}, key: {}, data: {}, create: {}, update: {}",
            self.id,
            self.key,
            self.data,
            format_timestamp(&self.create),
            format_timestamp(&self.update),
        )
    }
}

impl fmt::Debug for RecordView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordView")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("data", &self.data)
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

/// An ordered page of record views
#[derive(Clone)]
pub struct RecordSet {
    views: Vec<RecordView>,
}

impl RecordSet {
    pub(crate) fn new(store: Store, records: Vec<Record>) -> RecordSet {
        RecordSet {
            views: records
                .into_iter()
                .map(|r| RecordView::new(store.clone(), r))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&RecordView> {
        self.views.get(index)
    }

    pub fn first(&self) -> Option<&RecordView> {
        self.views.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RecordView> {
        self.views.iter()
    }

    /// Keys in result order
    pub fn keys(&self) -> Vec<String> {
        self.views.iter().map(|v| v.key.clone()).collect()
    }

    /// Read one path from every record, in result order
    pub fn get_path(&self, path: &str) -> Result<Vec<Option<Value>>> {
        self.views.iter().map(|v| v.get_path(path)).collect()
    }

    /// Write one path on every record
    pub fn set_path(&mut self, path: &str, value: Value) -> Result<()> {
        for view in &mut self.views {
            view.set_path(path, value.clone())?;
        }
        Ok(())
    }
}

impl Index<usize> for RecordSet {
    type Output = RecordView;

    fn index(&self, index: usize) -> &RecordView {
        &self.views[index]
    }
}

impl IntoIterator for RecordSet {
    type Item = RecordView;
    type IntoIter = std::vec::IntoIter<RecordView>;

    fn into_iter(self) -> Self::IntoIter {
        self.views.into_iter()
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a RecordView;
    type IntoIter = std::slice::Iter<'a, RecordView>;

    fn into_iter(self) -> Self::IntoIter {
        self.views.iter()
    }
}

impl fmt::Display for RecordSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for view in &self.views {
            writeln!(f, "{view}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for RecordSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.views).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::store::{Matcher, SearchOptions};
    use serde_json::json;

    fn store() -> Store {
        Store::open(StoreConfig::in_memory()).unwrap()
    }

    #[test]
    fn path_reads_see_concurrent_writes() {
        let store = store();
        let view = store
            .create("k1", json!({"a": {"b": 1}}), None, false)
            .unwrap();
        // mutate behind the view's back
        store.create("k1", json!({"a": {"b": 2}}), None, true).unwrap();
        assert_eq!(view.get_path("a.b").unwrap(), Some(json!(2)));
        // the cached copy is stale until refreshed
        assert_eq!(view.data()["a"]["b"], json!(1));
    }

    #[test]
    fn set_path_persists_and_bumps_update() {
        let store = store();
        let mut view = store
            .create("k1", json!({"a": {"b": 1}}), None, false)
            .unwrap();
        let before = *view.updated_at();
        view.set_path("a.b", json!(5)).unwrap();
        assert_eq!(view.data()["a"]["b"], json!(5));
        assert!(*view.updated_at() >= before);
        assert_eq!(
            store.find("k1").unwrap().unwrap(),
            json!({"a": {"b": 5}})
        );
    }

    #[test]
    fn set_path_many_is_one_write() {
        let store = store();
        let mut view = store
            .create("k1", json!({"a": 1, "b": 2}), None, false)
            .unwrap();
        view.set_path_many(&[
            ("a".to_string(), json!(10)),
            ("b".to_string(), json!(20)),
        ])
        .unwrap();
        assert_eq!(
            store.find("k1").unwrap().unwrap(),
            json!({"a": 10, "b": 20})
        );
    }

    #[test]
    fn meta_paths_edit_fields_individually() {
        let store = store();
        let mut view = store
            .create("k1", json!({}), Some(json!({"tag": "x", "keep": 1})), false)
            .unwrap();
        view.update_meta_path("tag", json!("y")).unwrap();
        view.delete_meta_path("keep").unwrap();
        assert_eq!(
            store.find_meta("k1").unwrap().unwrap(),
            json!({"tag": "y"})
        );
    }

    #[test]
    fn data_path_deletion_discards_the_record() {
        let store = store();
        let view = store
            .create("k1", json!({"a": 1, "b": 2}), None, false)
            .unwrap();
        view.delete_path("a").unwrap();
        assert!(store.get("k1").unwrap().is_none());
    }

    #[test]
    fn record_set_broadcasts() {
        let store = store();
        for n in 1..=3 {
            store
                .create(&format!("r{n}"), json!({"n": n}), None, false)
                .unwrap();
        }
        let result = store
            .search(&Matcher::expr("*"), &SearchOptions::new())
            .unwrap();
        let mut records = result.records;
        assert_eq!(records.len(), 3);

        records.set_path("n", json!(0)).unwrap();
        let values = records.get_path("n").unwrap();
        assert!(values.iter().all(|v| *v == Some(json!(0))));
        assert_eq!(store.count("n=0").unwrap(), 3);
    }

    #[test]
    fn stale_view_mutation_fails_after_delete() {
        let store = store();
        let mut view = store.create("k1", json!({"n": 1}), None, false).unwrap();
        store.delete_key("k1").unwrap();
        assert!(view.set_path("n", json!(2)).is_err());
    }
}
