use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use smsdesk_gateway::EventBus;
use smsdesk_types::api::{SendRequest, SmsResponse};
use smsdesk_types::events::PortalEvent;
use smsdesk_types::models::{ChatThread, NewSmsRecord, SmsRecord, SmsStatus};

use crate::blacklist::{BlacklistGate, blocked_recipients};
use crate::error::CoreError;
use crate::message_log::MessageLog;
use crate::session::{Session, require_user};
use crate::threads::{aggregate_threads, filter_threads};

/// Send path and history API for the signed-in user.
///
/// Every method answers with an [`SmsResponse`]; expected failures
/// (not signed in, blocked numbers, storage faults) come back as
/// `success: false` with a readable message.
pub struct SmsService {
    log: MessageLog,
    bus: EventBus,
    blacklist: Arc<dyn BlacklistGate>,
    send_delay: Duration,
}

impl SmsService {
    pub fn new(
        log: MessageLog,
        bus: EventBus,
        blacklist: Arc<dyn BlacklistGate>,
        send_delay: Duration,
    ) -> Self {
        Self {
            log,
            bus,
            blacklist,
            send_delay,
        }
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    /// Simulates sending `message` to every distinct recipient.
    ///
    /// If any recipient is blacklisted the whole request is refused and
    /// nothing is written. Otherwise the caller waits out the send delay, one
    /// `sent` record per recipient is appended in a single write and one
    /// history change is published.
    pub async fn send(&self, session: &dyn Session, request: SendRequest) -> SmsResponse<Vec<SmsRecord>> {
        into_response(self.try_send(session, request).await, "Message sent")
    }

    /// [`Self::send`] with the failure kept as a [`CoreError`].
    pub async fn try_send(&self, session: &dyn Session, request: SendRequest) -> Result<Vec<SmsRecord>, CoreError> {
        let user = require_user(session)?;

        let mut recipients: Vec<String> = Vec::new();
        for recipient in &request.recipients {
            let recipient = recipient.trim();
            if !recipient.is_empty() && !recipients.iter().any(|r| r == recipient) {
                recipients.push(recipient.to_string());
            }
        }
        if recipients.is_empty() {
            return Err(CoreError::Validation("At least one recipient is required".into()));
        }
        if request.message.trim().is_empty() {
            return Err(CoreError::Validation("Message cannot be empty".into()));
        }

        let blocked = blocked_recipients(self.blacklist.as_ref(), &recipients);
        if !blocked.is_empty() {
            warn!("Send by {} refused, blacklisted: {:?}", user.id, blocked);
            return Err(CoreError::Validation(format!(
                "The following numbers are blacklisted: {}",
                blocked.join(", ")
            )));
        }

        if let Some(at) = request.schedule_time {
            debug!("Ignoring schedule time {} for send by {}", at, user.id);
        }

        tokio::time::sleep(self.send_delay).await;

        let now = Utc::now();
        let records = recipients
            .into_iter()
            .map(|recipient| NewSmsRecord {
                user_id: user.id.clone(),
                recipient,
                message: request.message.clone(),
                status: SmsStatus::Sent,
                send_time: now,
            })
            .collect();
        let sent = self.log.append_all(records)?;

        info!("User {} sent a message to {} recipient(s)", user.id, sent.len());
        self.publish_history_changed(&user.id);
        Ok(sent)
    }

    /// The user's records, newest first.
    pub fn history(&self, session: &dyn Session) -> SmsResponse<Vec<SmsRecord>> {
        match require_user(session) {
            Ok(user) => SmsResponse::ok(self.log.query(&user.id)),
            Err(e) => SmsResponse::failure(e.to_string()),
        }
    }

    /// The user's conversations, most recently active first, optionally
    /// narrowed by a search term.
    pub fn threads(&self, session: &dyn Session, search: Option<&str>) -> SmsResponse<Vec<ChatThread>> {
        let user = match require_user(session) {
            Ok(user) => user,
            Err(e) => return SmsResponse::failure(e.to_string()),
        };

        let threads = aggregate_threads(&self.log.query(&user.id));
        match search {
            Some(term) => SmsResponse::ok(filter_threads(&threads, term)),
            None => SmsResponse::ok(threads),
        }
    }

    /// Deletes one of the user's records. Deleting a record that does not
    /// exist (or belongs to someone else) succeeds with `false`.
    pub fn delete_message(&self, session: &dyn Session, id: &str) -> SmsResponse<bool> {
        let user = match require_user(session) {
            Ok(user) => user,
            Err(e) => return SmsResponse::failure(e.to_string()),
        };

        let owned = self.log.get(id).is_some_and(|r| r.user_id == user.id);
        if !owned {
            debug!("Delete of unknown message {} by {}", id, user.id);
            return SmsResponse::ok(false);
        }

        let removed = self.log.delete_by_id(id);
        if removed {
            self.publish_history_changed(&user.id);
        }
        SmsResponse::ok(removed)
    }

    /// Deletes the whole conversation with `recipient`.
    pub fn delete_thread(&self, session: &dyn Session, recipient: &str) -> SmsResponse<bool> {
        let user = match require_user(session) {
            Ok(user) => user,
            Err(e) => return SmsResponse::failure(e.to_string()),
        };

        let removed = self.log.delete_by_recipient(&user.id, recipient);
        if removed {
            self.publish_history_changed(&user.id);
        }
        SmsResponse::ok(removed)
    }

    fn publish_history_changed(&self, user_id: &str) {
        self.bus.publish(&PortalEvent::HistoryChanged {
            user_id: user_id.to_string(),
        });
    }
}

fn into_response<T>(result: Result<T, CoreError>, success_message: &str) -> SmsResponse<T> {
    match result {
        Ok(data) => SmsResponse::ok_with_message(data, success_message),
        Err(e) => SmsResponse::failure(e.to_string()),
    }
}
