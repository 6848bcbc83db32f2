//! Dataset store: the registry plus one in-memory [`Table`] per dataset.
//!
//! Tables are immutable and shared as `Arc<Table>`, so queries only hold the map's read
//! lock long enough to clone a pointer. Loading builds a complete table first and then
//! swaps it in under the write lock; in-flight queries keep whichever table they started
//! with. Loads of the same dataset are serialized by a per-dataset mutex; loads of
//! different datasets run independently.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tracing::{debug, info, warn};

use crate::descriptor::FilterDescriptor;
use crate::error::{Error, NotFoundError, Result};
use crate::query::{self, ColumnRange, ResultPage};
use crate::registry::{DatasetInfo, DatasetRegistry, DatasetStatus, NewDataset};
use crate::table::Table;
use crate::LoadOptions;

pub struct DatasetStore {
    registry: Mutex<DatasetRegistry>,
    tables: RwLock<HashMap<String, Arc<Table>>>,
    load_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    options: LoadOptions,
}

/// Outcome of rebuilding one dataset during [`DatasetStore::reload`].
#[derive(Debug)]
pub struct ReloadOutcome {
    pub id: String,
    pub result: Result<usize>,
}

// Tables are never mutated in place, so a panic while a lock was held cannot leave
// shared state half-written.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DatasetStore {
    pub fn new(registry: DatasetRegistry, options: LoadOptions) -> Self {
        Self {
            registry: Mutex::new(registry),
            tables: RwLock::new(HashMap::new()),
            load_locks: Mutex::new(HashMap::new()),
            options,
        }
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    pub fn list(&self) -> Vec<DatasetInfo> {
        lock(&self.registry).list().to_vec()
    }

    pub fn get(&self, id: &str) -> Result<DatasetInfo> {
        lock(&self.registry)
            .get(id)
            .cloned()
            .ok_or_else(|| NotFoundError::new(id).into())
    }

    /// True if a table for `id` is currently published.
    pub fn is_loaded(&self, id: &str) -> bool {
        self.read_tables().contains_key(id)
    }

    /// Register a dataset and build its table.
    ///
    /// The record is persisted as `processing` before loading and updated to `ready` or
    /// `failed` afterwards. A failed load publishes no table and returns the load error.
    pub fn create_dataset(&self, new: NewDataset) -> Result<DatasetInfo> {
        let info = {
            let mut registry = lock(&self.registry);
            let info = registry.insert(new);
            registry.save()?;
            info
        };
        info!(id = %info.id, name = %info.name, "registered dataset");

        self.load(&info.id)?;
        self.get(&info.id)
    }

    /// Remove a dataset from the registry and discard its table.
    pub fn delete(&self, id: &str) -> Result<DatasetInfo> {
        let guard = self.load_lock(id);
        let _loading = lock(&*guard);

        let removed = {
            let mut registry = lock(&self.registry);
            let removed = registry.remove(id).ok_or_else(|| NotFoundError::new(id))?;
            registry.save()?;
            removed
        };
        self.write_tables().remove(id);
        lock(&self.load_locks).remove(id);
        info!(id, "deleted dataset");
        Ok(removed)
    }

    /// (Re)build the table for `id` from its source directory and publish it.
    ///
    /// On failure the previously published table, if any, stays in place.
    pub fn load(&self, id: &str) -> Result<Arc<Table>> {
        let guard = self.load_lock(id);
        let _loading = lock(&*guard);

        let dir = self.get(id)?.csv_meta_dir;
        self.set_status(id, DatasetStatus::Processing)?;

        match Table::from_dir(&dir, &self.options) {
            Ok(table) => {
                let table = Arc::new(table);
                self.write_tables()
                    .insert(id.to_string(), Arc::clone(&table));
                self.set_status(id, DatasetStatus::Ready)?;
                info!(id, rows = table.height(), "dataset ready");
                Ok(table)
            }
            Err(e) => {
                warn!(id, error = %e, "failed to load dataset");
                self.set_status(id, DatasetStatus::Failed)?;
                Err(e.into())
            }
        }
    }

    /// Re-read the registry file and rebuild every dataset's table.
    ///
    /// Tables of datasets no longer registered are dropped. One dataset failing to load
    /// does not stop the others.
    pub fn reload(&self) -> Result<Vec<ReloadOutcome>> {
        let ids: Vec<String> = {
            let mut registry = lock(&self.registry);
            registry.reload()?;
            registry.list().iter().map(|d| d.id.clone()).collect()
        };
        self.write_tables().retain(|id, _| ids.contains(id));
        info!(datasets = ids.len(), "reloading registry");

        let outcomes = ids
            .into_iter()
            .map(|id| {
                let result = self.load(&id).map(|table| table.height());
                ReloadOutcome { id, result }
            })
            .collect();
        Ok(outcomes)
    }

    /// The published table for `id`, loading it first if the dataset is registered but
    /// has not been loaded in this process.
    pub fn table(&self, id: &str) -> Result<Arc<Table>> {
        if let Some(table) = self.read_tables().get(id) {
            return Ok(Arc::clone(table));
        }
        // Not registered is a client error, not a load failure
        self.get(id)?;
        debug!(id, "loading dataset on first use");
        self.load(id)
    }

    pub fn query(&self, id: &str, desc: &FilterDescriptor) -> Result<ResultPage> {
        let table = self.table(id)?;
        Ok(query::query(&table, desc)?)
    }

    pub fn ranges(&self, id: &str) -> Result<BTreeMap<String, ColumnRange>> {
        let table = self.table(id)?;
        Ok(query::column_ranges(&table)?)
    }

    fn set_status(&self, id: &str, status: DatasetStatus) -> Result<()> {
        let mut registry = lock(&self.registry);
        if !registry.set_status(id, status) {
            return Err(Error::NotFound(NotFoundError::new(id)));
        }
        registry.save()?;
        Ok(())
    }

    fn load_lock(&self, id: &str) -> Arc<Mutex<()>> {
        Arc::clone(lock(&self.load_locks).entry(id.to_string()).or_default())
    }

    fn read_tables(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<Table>>> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_tables(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<Table>>> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_csv(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).unwrap();
    }

    fn store_with_dir() -> (TempDir, DatasetStore, NewDataset) {
        let root = TempDir::new().unwrap();
        let meta = root.path().join("meta");
        fs::create_dir_all(&meta).unwrap();
        write_csv(
            &meta,
            "meta.csv",
            "path,num_frames,text\n/v/a.mp4,10,A dog\n/v/b.mp4,20,No movement\n",
        );
        let registry = DatasetRegistry::empty(root.path().join("datasets.json"));
        let store = DatasetStore::new(registry, LoadOptions::default());
        let new = NewDataset {
            name: "demo".to_string(),
            author: "tester".to_string(),
            description: String::new(),
            csv_meta_dir: meta,
            video_clip_dir: root.path().join("clips"),
        };
        (root, store, new)
    }

    #[test]
    fn test_create_query_delete() {
        let (_root, store, new) = store_with_dir();
        let info = store.create_dataset(new).unwrap();
        assert_eq!(info.status, DatasetStatus::Ready);
        assert!(store.is_loaded(&info.id));

        let page = store.query(&info.id, &FilterDescriptor::new(10)).unwrap();
        assert_eq!(page.total, 2);

        let ranges = store.ranges(&info.id).unwrap();
        assert_eq!(ranges["num_frames"].max, 20.0);

        store.delete(&info.id).unwrap();
        assert!(!store.is_loaded(&info.id));
        assert!(matches!(
            store.query(&info.id, &FilterDescriptor::new(10)),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_unknown_dataset() {
        let (_root, store, _new) = store_with_dir();
        assert!(matches!(store.get("00000000"), Err(Error::NotFound(_))));
        assert!(matches!(store.delete("00000000"), Err(Error::NotFound(_))));
        assert!(matches!(store.load("00000000"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_failed_load_is_recorded() {
        let (root, store, mut new) = store_with_dir();
        new.csv_meta_dir = root.path().join("missing");
        let err = store.create_dataset(new).unwrap_err();
        assert!(matches!(err, Error::Load(_)));

        let datasets = store.list();
        assert_eq!(datasets.len(), 1);
        assert_eq!(datasets[0].status, DatasetStatus::Failed);
        assert!(!store.is_loaded(&datasets[0].id));
    }

    #[test]
    fn test_failed_reload_keeps_published_table() {
        let (_root, store, new) = store_with_dir();
        let meta = new.csv_meta_dir.clone();
        let info = store.create_dataset(new).unwrap();
        let before = store.table(&info.id).unwrap();

        fs::remove_dir_all(&meta).unwrap();
        assert!(store.load(&info.id).is_err());
        let after = store.table(&info.id).unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_reload_picks_up_new_files() {
        let (_root, store, new) = store_with_dir();
        let meta = new.csv_meta_dir.clone();
        let info = store.create_dataset(new).unwrap();

        write_csv(&meta, "more.csv", "path,num_frames\n/v/c.mp4,30\n");
        let outcomes = store.reload().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].result.as_ref().ok(), Some(&3));
        assert_eq!(
            store.query(&info.id, &FilterDescriptor::new(10)).unwrap().total,
            3
        );
    }

    #[test]
    fn test_queries_during_reload_see_whole_tables() {
        let (_root, store, new) = store_with_dir();
        let info = store.create_dataset(new).unwrap();
        let store = Arc::new(store);

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                let id = info.id.clone();
                std::thread::spawn(move || {
                    for _ in 0..20 {
                        let page = store.query(&id, &FilterDescriptor::new(10)).unwrap();
                        assert_eq!(page.total, 2);
                    }
                })
            })
            .collect();
        for _ in 0..3 {
            store.load(&info.id).unwrap();
        }
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
