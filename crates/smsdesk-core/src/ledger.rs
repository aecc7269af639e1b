use std::sync::Arc;

use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use smsdesk_db::{RecordStore, keys};
use smsdesk_gateway::EventBus;
use smsdesk_types::events::{BalanceChange, PortalEvent};
use smsdesk_types::models::{Credentials, User, UserStatus};

use crate::collections::{load_for_update, save};
use crate::error::CoreError;
use crate::session::AuthUser;

const MIN_PASSWORD_LEN: usize = 6;

/// Per-user balances and lifetime counters, plus the credentials kept
/// alongside them.
///
/// `users` and `userCredentials` are separate collections. Operations that
/// touch both (registration) write them one after the other with no
/// transaction around the pair.
pub struct UserLedger {
    store: Arc<RecordStore>,
    bus: EventBus,
}

impl UserLedger {
    pub fn new(store: Arc<RecordStore>, bus: EventBus) -> Self {
        Self { store, bus }
    }

    pub fn users(&self) -> Vec<User> {
        self.store.get_or_default(keys::USERS)
    }

    pub fn user(&self, id: &str) -> Option<User> {
        self.users().into_iter().find(|u| u.id == id)
    }

    fn credentials(&self) -> Vec<Credentials> {
        self.store.get_or_default(keys::CREDENTIALS)
    }

    /// Sets a user's balance and folds the difference into the lifetime
    /// counters: a rise adds to `total_recharge`, a drop adds to
    /// `total_spent`. Publishes a balance change once persisted.
    ///
    /// Returns false, without publishing, if the user does not exist or the
    /// collection could not be written.
    pub fn update_balance(&self, user_id: &str, new_balance: Decimal) -> bool {
        let Ok(mut users) = load_for_update::<User>(&self.store, keys::USERS) else {
            return false;
        };
        let Some(user) = users.iter_mut().find(|u| u.id == user_id) else {
            warn!("Balance update for unknown user {}", user_id);
            return false;
        };

        let old_balance = user.balance;
        let change = new_balance - old_balance;
        if change > Decimal::ZERO {
            user.total_recharge += change;
        } else if change < Decimal::ZERO {
            user.total_spent += change.abs();
        }
        user.balance = new_balance;
        user.last_modified = Utc::now();

        if save(&self.store, keys::USERS, &users).is_err() {
            return false;
        }

        info!("Balance of {} set to {} (change {})", user_id, new_balance, change);
        self.bus.publish(&PortalEvent::BalanceChanged(BalanceChange {
            user_id: user_id.to_string(),
            balance: new_balance,
            old_balance,
            change,
        }));
        true
    }

    /// Sets a user's status. Same failure contract as [`Self::update_balance`];
    /// publishes nothing.
    pub fn update_status(&self, user_id: &str, status: UserStatus) -> bool {
        let Ok(mut users) = load_for_update::<User>(&self.store, keys::USERS) else {
            return false;
        };
        let Some(user) = users.iter_mut().find(|u| u.id == user_id) else {
            warn!("Status update for unknown user {}", user_id);
            return false;
        };

        user.status = status;
        user.last_modified = Utc::now();

        let saved = save(&self.store, keys::USERS, &users).is_ok();
        if saved {
            info!("Status of {} set to {:?}", user_id, status);
        }
        saved
    }

    /// Creates an active account with zero balance. Username and email are
    /// unique, compared case-insensitively.
    pub fn register(&self, username: &str, email: &str, password: &str) -> Result<User, CoreError> {
        let username = username.trim();
        let email = email.trim();
        if username.len() < 3 || username.len() > 32 {
            return Err(CoreError::Validation("Username must be 3 to 32 characters".into()));
        }
        if !email.contains('@') {
            return Err(CoreError::Validation("Email address is invalid".into()));
        }
        validate_password(password)?;

        let mut credentials = load_for_update::<Credentials>(&self.store, keys::CREDENTIALS)?;
        let taken = credentials.iter().any(|c| {
            c.username.eq_ignore_ascii_case(username) || c.email.eq_ignore_ascii_case(email)
        });
        if taken {
            return Err(CoreError::Validation("Username or email already registered".into()));
        }
        let mut users = load_for_update::<User>(&self.store, keys::USERS)?;

        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let user = User {
            id: id.clone(),
            email: email.to_string(),
            status: UserStatus::Active,
            balance: Decimal::ZERO,
            total_recharge: Decimal::ZERO,
            total_spent: Decimal::ZERO,
            last_login: now,
            register_date: now,
            last_modified: now,
        };
        credentials.push(Credentials {
            id,
            email: email.to_string(),
            username: username.to_string(),
            password: hash_password(password)?,
            last_password_change: now,
        });
        users.push(user.clone());

        save(&self.store, keys::USERS, &users)?;
        save(&self.store, keys::CREDENTIALS, &credentials)?;

        info!("Registered user {} ({})", username, user.id);
        Ok(user)
    }

    /// Checks a username-or-email and password pair. Banned accounts are
    /// refused. On success the user's `last_login` is refreshed.
    pub fn authenticate(&self, login: &str, password: &str) -> Result<AuthUser, CoreError> {
        let login = login.trim();
        let invalid = || CoreError::Validation("Invalid username or password".into());

        let credentials = self
            .credentials()
            .into_iter()
            .find(|c| c.username.eq_ignore_ascii_case(login) || c.email.eq_ignore_ascii_case(login))
            .ok_or_else(invalid)?;

        let parsed = PasswordHash::new(&credentials.password).map_err(|e| {
            warn!("Stored password hash for {} is malformed: {}", credentials.id, e);
            invalid()
        })?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| invalid())?;

        let mut users = load_for_update::<User>(&self.store, keys::USERS)?;
        let user = users
            .iter_mut()
            .find(|u| u.id == credentials.id)
            .ok_or_else(|| CoreError::NotFound(format!("Account {}", credentials.id)))?;
        if user.status == UserStatus::Banned {
            return Err(CoreError::Validation("This account has been banned".into()));
        }

        user.last_login = Utc::now();
        if save(&self.store, keys::USERS, &users).is_err() {
            warn!("Could not record login time for {}", credentials.id);
        }

        Ok(AuthUser {
            id: credentials.id,
            username: credentials.username,
            email: credentials.email,
        })
    }

    /// Creates the demo account (`user1` / `password123`) when no users exist.
    /// Returns true if it was created.
    pub fn seed_demo_user(&self) -> bool {
        if !self.users().is_empty() {
            return false;
        }

        let user = match self.register("user1", "user1@example.com", "password123") {
            Ok(user) => user,
            Err(e) => {
                warn!("Demo user not seeded: {}", e);
                return false;
            }
        };

        let Ok(mut users) = load_for_update::<User>(&self.store, keys::USERS) else {
            return false;
        };
        if let Some(demo) = users.iter_mut().find(|u| u.id == user.id) {
            demo.balance = Decimal::new(2000, 2);
            demo.total_recharge = Decimal::new(50000, 2);
            demo.total_spent = Decimal::new(39950, 2);
        }
        save(&self.store, keys::USERS, &users).is_ok()
    }
}

pub fn validate_password(password: &str) -> Result<(), CoreError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(CoreError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Parses an administrator-entered balance such as `"12.50"`.
pub fn parse_balance(input: &str) -> Result<Decimal, CoreError> {
    let balance: Decimal = input
        .trim()
        .parse()
        .map_err(|_| CoreError::Validation(format!("'{}' is not a valid amount", input.trim())))?;
    if balance.is_sign_negative() && !balance.is_zero() {
        return Err(CoreError::Validation("Balance cannot be negative".into()));
    }
    Ok(balance)
}

fn hash_password(password: &str) -> Result<String, CoreError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CoreError::Persistence(format!("password hashing failed: {}", e)))
}
