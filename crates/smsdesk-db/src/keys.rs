//! Storage keys of the persisted collections. The names match the ones the
//! browser portal used so that exported data can be imported as-is.

pub const SMS_HISTORY: &str = "sms_history";
pub const USERS: &str = "users";
pub const CREDENTIALS: &str = "userCredentials";
pub const BLACKLIST: &str = "blacklist";
