//! # Stores
//!
//! Seams between the request handlers and persistence. Handlers and the
//! entitlement evaluator only ever see these traits, the Redis backed
//! implementation lives in [`crate::database`].
//!
//! - [`SubscriptionStore`]: subscription flag and grant timestamp per subject
//! - [`UserStore`]: accounts and profiles
//! - [`ShowStore`]: the show catalog
//! - [`PaymentStore`]: which subject owns an order, which payments were redeemed
use std::fmt::{self, Display};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    show::{NewShow, Show, ShowPatch},
    user::{ProfilePatch, User},
};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(#[from] redis::RedisError),

    #[error("Corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Email already registered")]
    DuplicateEmail,
}

impl StoreError {
    pub fn corrupt(key: impl Into<String>, reason: impl Display) -> Self {
        Self::Corrupt {
            key: key.into(),
            reason: reason.to_string(),
        }
    }
}

/// Opaque identifier of a user, the `sub` of every issued token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    pub is_subscribed: bool,
    pub granted_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// `None` when the subject has no record, e.g. deleted after its token was issued.
    async fn read(&self, subject: &SubjectId) -> Result<Option<Subscription>, StoreError>;

    /// Clears `is_subscribed`. Idempotent, and a no-op for unknown subjects.
    async fn expire(&self, subject: &SubjectId) -> Result<(), StoreError>;

    /// Marks the subject subscribed as of `at`. Returns false for unknown subjects.
    async fn grant(&self, subject: &SubjectId, at: DateTime<Utc>) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with [`StoreError::DuplicateEmail`] when the email is taken.
    async fn create(&self, email: &str, password_hash: &str) -> Result<User, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, id: &SubjectId) -> Result<Option<User>, StoreError>;

    async fn update_profile(
        &self,
        id: &SubjectId,
        patch: &ProfilePatch,
    ) -> Result<Option<User>, StoreError>;
}

#[async_trait]
pub trait ShowStore: Send + Sync {
    /// All shows, ordered by name.
    async fn list(&self) -> Result<Vec<Show>, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Show>, StoreError>;

    async fn create(&self, show: NewShow) -> Result<Show, StoreError>;

    async fn update(&self, id: &str, patch: ShowPatch) -> Result<Option<Show>, StoreError>;

    /// Returns false when nothing was deleted.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Binds a gateway order to the subject that created it.
    async fn record_order(&self, order_id: &str, subject: &SubjectId) -> Result<(), StoreError>;

    async fn order_owner(&self, order_id: &str) -> Result<Option<SubjectId>, StoreError>;

    /// Marks a payment as redeemed. Returns false when it already was.
    async fn consume_payment(&self, payment_id: &str) -> Result<bool, StoreError>;
}
