use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Names of the events carried by the portal event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    HistoryChanged,
    BalanceChanged,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HistoryChanged => "smsHistoryUpdate",
            Self::BalanceChanged => "balanceUpdate",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a balance change, published after the ledger has been persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceChange {
    pub user_id: String,
    pub balance: Decimal,
    pub old_balance: Decimal,
    pub change: Decimal,
}

/// Events published on the bus and relayed over the WebSocket gateway. The
/// wire tag is the event name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PortalEvent {
    /// The message log changed for this user; views re-query.
    #[serde(rename = "smsHistoryUpdate", rename_all = "camelCase")]
    HistoryChanged { user_id: String },

    /// A user's balance was set.
    #[serde(rename = "balanceUpdate")]
    BalanceChanged(BalanceChange),
}

impl PortalEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::HistoryChanged { .. } => EventKind::HistoryChanged,
            Self::BalanceChanged(_) => EventKind::BalanceChanged,
        }
    }

    /// The user this event concerns.
    pub fn user_id(&self) -> &str {
        match self {
            Self::HistoryChanged { user_id } => user_id,
            Self::BalanceChanged(change) => &change.user_id,
        }
    }
}

/// Frames sent from the server to a gateway client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayFrame {
    /// Server confirms successful identification
    #[serde(rename_all = "camelCase")]
    Ready { user_id: String, username: String },

    /// A bus event for the connected user
    Event(PortalEvent),
}

/// Commands sent from a gateway client to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },
}
