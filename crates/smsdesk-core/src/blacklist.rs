use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;

use smsdesk_db::{RecordStore, keys};

/// Answers whether a phone number may not be messaged. Consulted by the send
/// path before any record is created.
pub trait BlacklistGate: Send + Sync {
    fn is_blacklisted(&self, phone: &str) -> bool;
}

impl BlacklistGate for HashSet<String> {
    fn is_blacklisted(&self, phone: &str) -> bool {
        self.contains(phone)
    }
}

/// Blacklist read from the `blacklist` collection on every check, so edits
/// made by the blacklist manager apply to the next send.
pub struct StoredBlacklist {
    store: Arc<RecordStore>,
}

/// Entries are either bare numbers or objects with a `phone` field.
#[derive(Deserialize)]
#[serde(untagged)]
enum BlacklistEntry {
    Phone(String),
    Entry { phone: String },
}

impl BlacklistEntry {
    fn phone(&self) -> &str {
        match self {
            Self::Phone(phone) | Self::Entry { phone } => phone,
        }
    }
}

impl StoredBlacklist {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }
}

impl BlacklistGate for StoredBlacklist {
    fn is_blacklisted(&self, phone: &str) -> bool {
        let entries: Vec<BlacklistEntry> = self.store.get_or_default(keys::BLACKLIST);
        entries.iter().any(|e| e.phone() == phone)
    }
}

/// Returns the blocked numbers among `recipients`, in request order.
pub fn blocked_recipients<'a>(gate: &dyn BlacklistGate, recipients: &'a [String]) -> Vec<&'a str> {
    recipients
        .iter()
        .map(String::as_str)
        .filter(|phone| gate.is_blacklisted(phone))
        .collect()
}
