//! SMS portal core: message log, conversation threads, user ledger and the
//! send path. Every component takes its store and event bus explicitly, so a
//! process builds one [`Portal`] and tests build as many isolated ones as
//! they like.

pub mod blacklist;
mod collections;
pub mod error;
pub mod ledger;
pub mod message_log;
pub mod session;
pub mod sms;
pub mod threads;

use std::sync::Arc;
use std::time::Duration;

use smsdesk_db::RecordStore;
use smsdesk_gateway::EventBus;

pub use blacklist::{BlacklistGate, StoredBlacklist};
pub use error::CoreError;
pub use ledger::UserLedger;
pub use message_log::MessageLog;
pub use session::{AuthUser, Session};
pub use sms::SmsService;
pub use threads::{aggregate_threads, filter_threads};

/// The wired-up set of core services sharing one store and one bus.
#[derive(Clone)]
pub struct Portal {
    pub store: Arc<RecordStore>,
    pub bus: EventBus,
    pub ledger: Arc<UserLedger>,
    pub sms: Arc<SmsService>,
}

impl Portal {
    pub fn new(
        store: Arc<RecordStore>,
        bus: EventBus,
        blacklist: Arc<dyn BlacklistGate>,
        send_delay: Duration,
    ) -> Self {
        let ledger = Arc::new(UserLedger::new(store.clone(), bus.clone()));
        let log = MessageLog::new(store.clone());
        let sms = Arc::new(SmsService::new(log, bus.clone(), blacklist, send_delay));
        Self {
            store,
            bus,
            ledger,
            sms,
        }
    }
}
