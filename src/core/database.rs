//! The database facade: a concurrent registry of named collections that
//! share one `Options` value and one directory on disk.
//!
//! `get_or_create` is race-free without serializing unrelated collections:
//! each name has its own creation mutex, taken only while that collection
//! is being opened.

use std::any::Any;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::config::Options;
use crate::core::collection::Collection;
use crate::error::{CombError, Result};

/// Type-erased view of a collection, enough for lifecycle management.
trait CollectionHandle: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn close_handle(&self) -> Result<()>;
    fn destroy_handle(&self) -> Result<()>;
}

impl<K, V> CollectionHandle for Collection<K, V>
where
    K: Serialize + DeserializeOwned + Ord + std::hash::Hash + Eq + Clone + Send + Sync + 'static,
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn close_handle(&self) -> Result<()> {
        self.close()
    }

    fn destroy_handle(&self) -> Result<()> {
        self.destroy()
    }
}

struct Registered {
    typed: Arc<dyn Any + Send + Sync>,
    handle: Arc<dyn CollectionHandle>,
}

pub struct Database {
    options: Options,
    collections: DashMap<String, Registered>,
    name_locks: DashMap<String, Arc<Mutex<()>>>,
    closed: AtomicBool,
}

impl Database {
    /// Open a database rooted at `<base_directory>/<database_name>/`.
    pub fn open(options: Options) -> Result<Self> {
        validate_name(&options.database_name)?;
        if options.encryption_enabled
            && options
                .encryption_password
                .as_deref()
                .map_or(true, str::is_empty)
        {
            return Err(CombError::EncryptionConfigMissing);
        }

        if !options.memory_only && !options.read_only {
            fs::create_dir_all(options.base_directory.join(&options.database_name))?;
        }

        Ok(Self {
            options,
            collections: DashMap::new(),
            name_locks: DashMap::new(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Get or create the collection with the given name, loading it on
    /// first access.
    pub fn collection<K, V>(&self, name: &str) -> Result<Arc<Collection<K, V>>>
    where
        K: Serialize
            + DeserializeOwned
            + Ord
            + std::hash::Hash
            + Eq
            + Clone
            + Send
            + Sync
            + 'static,
        V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        self.ensure_open()?;

        let name_lock = self
            .name_locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _creating = name_lock.lock();

        if let Some(existing) = self.collections.get(name) {
            return existing
                .typed
                .clone()
                .downcast::<Collection<K, V>>()
                .map_err(|_| CombError::CollectionTypeMismatch(name.to_string()));
        }

        let collection = Arc::new(Collection::<K, V>::new(name, self.options.clone()));
        collection.load()?;

        self.collections.insert(
            name.to_string(),
            Registered {
                typed: collection.clone(),
                handle: collection.clone(),
            },
        );
        Ok(collection)
    }

    /// Get or create the collection named after the value type, through the
    /// configured file-name function.
    pub fn collection_of<K, V>(&self) -> Result<Arc<Collection<K, V>>>
    where
        K: Serialize
            + DeserializeOwned
            + Ord
            + std::hash::Hash
            + Eq
            + Clone
            + Send
            + Sync
            + 'static,
        V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let name = self.options.generated_name(std::any::type_name::<V>());
        self.collection::<K, V>(&name)
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.collections
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Close one collection and delete its backing file.
    pub fn drop_collection(&self, name: &str) -> Result<bool> {
        self.ensure_open()?;
        if self.options.read_only {
            return Err(CombError::DatabaseReadOnly);
        }

        let name_lock = self
            .name_locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _creating = name_lock.lock();

        match self.collections.remove(name) {
            Some((_, registered)) => {
                registered.handle.destroy_handle()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Close every collection and the database itself.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(CombError::DatabaseClosed);
        }

        let mut result = Ok(());
        for entry in self.collections.iter() {
            if let Err(e) = entry.value().handle.close_handle() {
                warn!(collection = %entry.key(), error = %e, "close failed");
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        self.collections.clear();
        self.name_locks.clear();
        result
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CombError::DatabaseClosed);
        }
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::Acquire) {
            let _ = self.close();
        }
    }
}

/// A database name must be non-empty and `[A-Za-z0-9_ ]` only.
fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ' ');
    if valid {
        Ok(())
    } else {
        Err(CombError::InvalidDatabaseName(name.to_string()))
    }
}
