use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::error;

use smsdesk_db::RecordStore;

use crate::error::CoreError;

/// Loads a collection for a read-modify-write. A missing key is an empty
/// collection; unreadable data is an error so that the following write does
/// not replace it.
pub(crate) fn load_for_update<T: DeserializeOwned>(
    store: &RecordStore,
    key: &str,
) -> Result<Vec<T>, CoreError> {
    store
        .try_get(key)
        .map(Option::unwrap_or_default)
        .map_err(|e| {
            error!("Collection '{}' unreadable, refusing to overwrite: {:#}", key, e);
            CoreError::Persistence(format!("{} is unreadable", key))
        })
}

pub(crate) fn save<T: Serialize>(store: &RecordStore, key: &str, items: &[T]) -> Result<(), CoreError> {
    if store.set(key, items) {
        Ok(())
    } else {
        Err(CoreError::Persistence(format!("failed to save {}", key)))
    }
}
