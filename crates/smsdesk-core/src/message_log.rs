use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use smsdesk_db::{RecordStore, keys};
use smsdesk_types::models::{NewSmsRecord, SmsRecord};

use crate::collections;
use crate::error::CoreError;

/// Append-only log of SMS records for all users, stored as one collection.
///
/// Every mutation reads the whole collection, changes it and writes it back.
/// Two writers interleaving between read and write lose one of the updates
/// (last writer wins); nothing here detects that.
pub struct MessageLog {
    store: Arc<RecordStore>,
}

impl MessageLog {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }

    /// Every record of every user, in log order. Unreadable data reads as
    /// empty here, but mutations refuse to run over it.
    pub fn all(&self) -> Vec<SmsRecord> {
        self.store.get_or_default(keys::SMS_HISTORY)
    }

    fn load_for_update(&self) -> Result<Vec<SmsRecord>, CoreError> {
        collections::load_for_update(&self.store, keys::SMS_HISTORY)
    }

    fn save(&self, history: &[SmsRecord]) -> Result<(), CoreError> {
        collections::save(&self.store, keys::SMS_HISTORY, history)
    }

    /// Assigns a fresh id and appends the record.
    pub fn append(&self, record: NewSmsRecord) -> Result<SmsRecord, CoreError> {
        let mut appended = self.append_all(vec![record])?;
        appended
            .pop()
            .ok_or_else(|| CoreError::Persistence("record was not appended".into()))
    }

    /// Appends several records with a single write.
    pub fn append_all(&self, records: Vec<NewSmsRecord>) -> Result<Vec<SmsRecord>, CoreError> {
        let mut history = self.load_for_update()?;
        let mut taken: HashSet<String> = history.iter().map(|r| r.id.clone()).collect();

        let appended: Vec<SmsRecord> = records
            .into_iter()
            .map(|record| record.into_record(unique_id(&mut taken)))
            .collect();
        history.extend(appended.iter().cloned());

        self.save(&history)?;
        debug!("Appended {} record(s) to message log", appended.len());
        Ok(appended)
    }

    pub fn get(&self, id: &str) -> Option<SmsRecord> {
        self.all().into_iter().find(|r| r.id == id)
    }

    /// The user's records, newest first. Records sent at the same instant
    /// keep their log order.
    pub fn query(&self, user_id: &str) -> Vec<SmsRecord> {
        let mut records: Vec<SmsRecord> = self
            .all()
            .into_iter()
            .filter(|r| r.user_id == user_id)
            .collect();
        records.sort_by(|a, b| b.send_time.cmp(&a.send_time));
        records
    }

    /// Removes the record with `id`. False if there was none (or the write
    /// failed); the log is left untouched in that case.
    pub fn delete_by_id(&self, id: &str) -> bool {
        self.remove_where(|r| r.id == id)
    }

    /// Removes every record `user_id` has exchanged with `recipient`.
    pub fn delete_by_recipient(&self, user_id: &str, recipient: &str) -> bool {
        self.remove_where(|r| r.user_id == user_id && r.recipient == recipient)
    }

    fn remove_where<F>(&self, predicate: F) -> bool
    where
        F: Fn(&SmsRecord) -> bool,
    {
        let mut history = match self.load_for_update() {
            Ok(history) => history,
            Err(_) => return false,
        };

        let before = history.len();
        history.retain(|r| !predicate(r));
        let removed = before - history.len();
        if removed == 0 {
            return false;
        }

        match self.save(&history) {
            Ok(()) => {
                debug!("Removed {} record(s) from message log", removed);
                true
            }
            Err(e) => {
                warn!("Delete not applied: {}", e);
                false
            }
        }
    }
}

/// UUID v4 not yet in `taken`, re-drawn in the (theoretical) case it is.
/// The new id is added to `taken`.
fn unique_id(taken: &mut HashSet<String>) -> String {
    loop {
        let id = Uuid::new_v4().to_string();
        if taken.insert(id.clone()) {
            return id;
        }
    }
}
