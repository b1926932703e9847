use std::fmt;

use ahash::AHashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::record::ResultSet;

/// Opaque per-request key partitioning every table's result cache.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(String);

impl RequestId {
    pub fn new<T: Into<String>>(id: T) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Last resolved result set per request. Entries live until [`ResultCache::remove`]
/// is called for the request; there is no eviction.
#[derive(Default)]
pub struct ResultCache {
    inner: RwLock<AHashMap<RequestId, ResultSet>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(AHashMap::new()),
        }
    }

    pub fn get(&self, key: &RequestId) -> Option<ResultSet> {
        self.inner.read().get(key).cloned()
    }

    pub fn insert(&self, key: RequestId, value: ResultSet) {
        self.inner.write().insert(key, value);
    }

    pub fn remove(&self, key: &RequestId) -> Option<ResultSet> {
        self.inner.write().remove(key)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }
}
