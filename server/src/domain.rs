use std::fmt::{Debug, Display};

use chrono::{DateTime, Utc};
use kernel::{DeleteResult, StoredObject};

/// Key/value object store holding image payloads.
pub trait ObjectStore {
    type Err: Debug + Display;

    fn new_database(&self) -> Result<(), Self::Err>;

    /// Writes `data` under `key`, replacing any previous object with that key.
    fn put(&mut self, key: &str, data: Vec<u8>, content_type: &str)
        -> Result<StoredObject, Self::Err>;

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Self::Err>;

    fn head(&self, key: &str) -> Result<Option<StoredObject>, Self::Err>;

    /// Removes the object. Absent keys are not an error.
    fn delete(&mut self, key: &str) -> Result<DeleteResult, Self::Err>;

    /// Lists at most `limit` objects whose key starts with `prefix`, ordered by key.
    fn list(&self, prefix: &str, limit: usize) -> Result<Vec<StoredObject>, Self::Err>;

    /// Removes every object uploaded strictly before `cutoff`.
    fn delete_older_than(&mut self, cutoff: DateTime<Utc>) -> Result<DeleteResult, Self::Err>;
}
