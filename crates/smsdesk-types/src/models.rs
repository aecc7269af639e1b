//! Persisted shapes use camelCase field names so that collections written by
//! the browser portal load unchanged.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmsStatus {
    Sent,
    Received,
}

/// One SMS send/receive event. Immutable once appended to the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsRecord {
    pub id: String,
    pub user_id: String,
    pub recipient: String,
    pub message: String,
    pub status: SmsStatus,
    pub send_time: DateTime<Utc>,
}

/// A record before the log has assigned it an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSmsRecord {
    pub user_id: String,
    pub recipient: String,
    pub message: String,
    pub status: SmsStatus,
    pub send_time: DateTime<Utc>,
}

impl NewSmsRecord {
    pub fn into_record(self, id: String) -> SmsRecord {
        SmsRecord {
            id,
            user_id: self.user_id,
            recipient: self.recipient,
            message: self.message,
            status: self.status,
            send_time: self.send_time,
        }
    }
}

/// All records exchanged with one recipient, newest first.
/// Derived on every query, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatThread {
    pub recipient: String,
    pub messages: Vec<SmsRecord>,
}

impl ChatThread {
    /// Most recent message in the thread.
    pub fn latest(&self) -> Option<&SmsRecord> {
        self.messages.first()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Banned,
}

impl UserStatus {
    pub fn toggled(self) -> Self {
        match self {
            Self::Active => Self::Banned,
            Self::Banned => Self::Active,
        }
    }
}

/// Account state and ledger counters.
///
/// `total_recharge - total_spent` accumulates every balance delta, while
/// `balance` can be overwritten by an administrator. The two drift apart and
/// are never reconciled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub status: UserStatus,
    pub balance: Decimal,
    pub total_recharge: Decimal,
    pub total_spent: Decimal,
    #[serde(deserialize_with = "crate::timestamp::deserialize")]
    pub last_login: DateTime<Utc>,
    #[serde(deserialize_with = "crate::timestamp::deserialize")]
    pub register_date: DateTime<Utc>,
    #[serde(deserialize_with = "crate::timestamp::deserialize")]
    pub last_modified: DateTime<Utc>,
}

/// Secret material for a user, one-to-one with [`User`] by `id`.
/// `password` holds an Argon2id PHC string. Plaintext passwords left by the
/// browser portal load but never verify.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub id: String,
    pub email: String,
    pub username: String,
    pub password: String,
    #[serde(deserialize_with = "crate::timestamp::deserialize")]
    pub last_password_change: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_reads_portal_export() {
        let raw = r#"[{"id":"1","email":"user1@example.com","status":"active","balance":20,"lastLogin":"2024/10/24 13:54:05","registerDate":"2024-01-01","totalOrders":25,"totalRecharge":500,"totalSpent":399.5,"lastModified":"2024-10-24T05:54:05.000Z"}]"#;
        let users: Vec<User> = serde_json::from_str(raw).unwrap();

        let user = &users[0];
        assert_eq!(user.balance, Decimal::new(20, 0));
        assert_eq!(user.total_recharge, Decimal::new(500, 0));
        assert_eq!(user.last_login.to_rfc3339(), "2024-10-24T13:54:05+00:00");
        assert_eq!(user.register_date.to_rfc3339(), "2024-01-01T00:00:00+00:00");
        assert_eq!(user.status.toggled(), UserStatus::Banned);
    }

    #[test]
    fn credentials_read_portal_export() {
        let raw = r#"[{"id":"1","email":"user1@example.com","username":"user1","password":"password123","lastPasswordChange":"2024-03-15 14:30:00"}]"#;
        let credentials: Vec<Credentials> = serde_json::from_str(raw).unwrap();

        assert_eq!(credentials[0].username, "user1");
        assert_eq!(credentials[0].last_password_change.to_rfc3339(), "2024-03-15T14:30:00+00:00");
    }

    #[test]
    fn timestamps_written_back_as_rfc3339() {
        let raw = r#"{"id":"1","email":"a@b.c","username":"a","password":"x","lastPasswordChange":"2024-03-15 14:30:00"}"#;
        let credentials: Credentials = serde_json::from_str(raw).unwrap();

        let json = serde_json::to_value(&credentials).unwrap();
        assert_eq!(json["lastPasswordChange"], "2024-03-15T14:30:00Z");
    }

    #[test]
    fn record_persists_camel_case() {
        let record = NewSmsRecord {
            user_id: "1".into(),
            recipient: "+1000".into(),
            message: "hi".into(),
            status: SmsStatus::Sent,
            send_time: "2024-01-01T08:00:00Z".parse().unwrap(),
        }
        .into_record("abc".into());

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["userId"], "1");
        assert_eq!(json["status"], "sent");
        assert!(json["sendTime"].as_str().unwrap().starts_with("2024-01-01T08:00:00"));
    }
}
