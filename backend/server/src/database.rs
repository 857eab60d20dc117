//! # Redis
//!
//! Document store for users and the show catalog.
//!
//! ## Layout
//!
//! - `user:{id}` hash per user, one field per attribute
//!   (`email`, `password_hash`, `first_name`, `last_name`, `is_subscribed` as `0`/`1`,
//!   `subscription_granted_at` as RFC 3339, absent until the first verified payment)
//! - `user_emails` hash, email to user id. `HSETNX` on it is what makes emails unique
//! - `shows` hash, show id to the show as JSON
//! - `orders` hash, gateway order id to the user id that created it
//! - `payments` set of redeemed gateway payment ids. `SADD` on it is what makes a
//!   payment single use
//!
//! ## Notes
//!
//! - Subscription expiry and grants are plain `HSET`s on the user hash, so they
//!   only ever touch the subscription fields and never race a profile update
//! - Expiry is idempotent, writing `0` twice is the same as writing it once
//! - Signup writes `user:{id}` and claims the email in one `MULTI`, hash first.
//!   The index never points at a hash that was not written
//! - Every call clones the [`ConnectionManager`], a clone is a handle onto the
//!   same multiplexed connection
use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{
    AsyncCommands, Client, Pipeline, RedisError,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use tracing::warn;
use uuid::Uuid;

use crate::{
    show::{NewShow, Show, ShowPatch},
    store::{
        PaymentStore, ShowStore, StoreError, SubjectId, Subscription, SubscriptionStore,
        UserStore,
    },
    user::{ProfilePatch, User},
};

pub const USER_PREFIX: &str = "user:";
pub const USER_EMAILS: &str = "user_emails";
pub const SHOWS: &str = "shows";
pub const ORDERS: &str = "orders";
pub const PAYMENTS: &str = "payments";

const EMAIL: &str = "email";
const PASSWORD_HASH: &str = "password_hash";
const FIRST_NAME: &str = "first_name";
const LAST_NAME: &str = "last_name";
const IS_SUBSCRIBED: &str = "is_subscribed";
const SUBSCRIPTION_GRANTED_AT: &str = "subscription_granted_at";

pub async fn init_redis(redis_url: &str) -> Result<ConnectionManager, RedisError> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(100));

    let client = Client::open(redis_url)?;
    client.get_connection_manager_with_config(config).await
}

#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    async fn user_fields(&self, id: &SubjectId) -> Result<HashMap<String, String>, StoreError> {
        let mut connection = self.connection.clone();
        Ok(connection.hgetall(user_key(id)).await?)
    }

    async fn user_exists(&self, id: &SubjectId) -> Result<bool, StoreError> {
        let mut connection = self.connection.clone();
        Ok(connection.exists(user_key(id)).await?)
    }
}

fn user_key(id: &SubjectId) -> String {
    format!("{USER_PREFIX}{id}")
}

/// Writes the user hash, then claims the email. The reply is the claim result.
fn signup_pipeline(user: &User) -> Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic()
        .hset_multiple(
            user_key(&user.id),
            &[
                (EMAIL, user.email.as_str()),
                (PASSWORD_HASH, user.password_hash.as_str()),
                (FIRST_NAME, ""),
                (LAST_NAME, ""),
                (IS_SUBSCRIBED, "0"),
            ],
        )
        .ignore()
        .hset_nx(USER_EMAILS, &user.email, user.id.as_str());

    pipe
}

fn user_from_fields(
    id: &SubjectId,
    mut fields: HashMap<String, String>,
) -> Result<Option<User>, StoreError> {
    if fields.is_empty() {
        return Ok(None);
    }

    let key = user_key(id);
    let mut take = |field: &str| fields.remove(field).unwrap_or_default();

    let email = take(EMAIL);
    let password_hash = take(PASSWORD_HASH);
    let first_name = take(FIRST_NAME);
    let last_name = take(LAST_NAME);
    let is_subscribed = take(IS_SUBSCRIBED) == "1";
    let granted_at = take(SUBSCRIPTION_GRANTED_AT);

    let subscription_granted_at = match granted_at.as_str() {
        "" => None,
        raw => Some(
            DateTime::parse_from_rfc3339(raw)
                .map_err(|e| StoreError::corrupt(&key, e))?
                .with_timezone(&Utc),
        ),
    };

    if email.is_empty() {
        return Err(StoreError::corrupt(key, "missing email"));
    }

    Ok(Some(User {
        id: id.clone(),
        email,
        password_hash,
        first_name,
        last_name,
        is_subscribed,
        subscription_granted_at,
    }))
}

fn show_from_json(id: &str, raw: &str) -> Result<Show, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::corrupt(format!("{SHOWS}/{id}"), e))
}

fn show_to_json(show: &Show) -> Result<String, StoreError> {
    serde_json::to_string(show).map_err(|e| StoreError::corrupt(format!("{SHOWS}/{}", show.id), e))
}

#[async_trait]
impl SubscriptionStore for RedisStore {
    async fn read(&self, subject: &SubjectId) -> Result<Option<Subscription>, StoreError> {
        let fields = self.user_fields(subject).await?;
        Ok(user_from_fields(subject, fields)?.map(|user| user.subscription()))
    }

    async fn expire(&self, subject: &SubjectId) -> Result<(), StoreError> {
        if !self.user_exists(subject).await? {
            return Ok(());
        }

        let mut connection = self.connection.clone();
        let () = connection
            .hset(user_key(subject), IS_SUBSCRIBED, "0")
            .await?;

        Ok(())
    }

    async fn grant(&self, subject: &SubjectId, at: DateTime<Utc>) -> Result<bool, StoreError> {
        if !self.user_exists(subject).await? {
            return Ok(false);
        }

        let granted_at = at.to_rfc3339();
        let mut connection = self.connection.clone();
        let () = connection
            .hset_multiple(
                user_key(subject),
                &[
                    (IS_SUBSCRIBED, "1"),
                    (SUBSCRIPTION_GRANTED_AT, granted_at.as_str()),
                ],
            )
            .await?;

        Ok(true)
    }
}

#[async_trait]
impl UserStore for RedisStore {
    async fn create(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
        let user = User::new(
            SubjectId::new(Uuid::new_v4().to_string()),
            email,
            password_hash,
        );

        let mut connection = self.connection.clone();
        let (claimed,): (bool,) = signup_pipeline(&user)
            .query_async(&mut connection)
            .await?;
        if !claimed {
            let () = connection.del(user_key(&user.id)).await?;
            return Err(StoreError::DuplicateEmail);
        }

        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let mut connection = self.connection.clone();
        let id: Option<String> = connection.hget(USER_EMAILS, email).await?;
        let Some(id) = id else {
            return Ok(None);
        };

        let id = SubjectId::new(id);
        let user = self.find_by_id(&id).await?;
        if user.is_none() {
            warn!(user = %id, "Email index points at a missing user, releasing it");
            let () = connection.hdel(USER_EMAILS, email).await?;
        }

        Ok(user)
    }

    async fn find_by_id(&self, id: &SubjectId) -> Result<Option<User>, StoreError> {
        let fields = self.user_fields(id).await?;
        user_from_fields(id, fields)
    }

    async fn update_profile(
        &self,
        id: &SubjectId,
        patch: &ProfilePatch,
    ) -> Result<Option<User>, StoreError> {
        if !self.user_exists(id).await? {
            return Ok(None);
        }

        let updates: Vec<(&str, &str)> = [
            (FIRST_NAME, patch.first_name()),
            (LAST_NAME, patch.last_name()),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.map(|value| (field, value)))
        .collect();

        if !updates.is_empty() {
            let mut connection = self.connection.clone();
            let () = connection.hset_multiple(user_key(id), updates.as_slice()).await?;
        }

        self.find_by_id(id).await
    }
}

#[async_trait]
impl ShowStore for RedisStore {
    async fn list(&self) -> Result<Vec<Show>, StoreError> {
        let mut connection = self.connection.clone();
        let raw: HashMap<String, String> = connection.hgetall(SHOWS).await?;

        let mut shows = raw
            .iter()
            .map(|(id, json)| show_from_json(id, json))
            .collect::<Result<Vec<_>, _>>()?;
        shows.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(shows)
    }

    async fn get(&self, id: &str) -> Result<Option<Show>, StoreError> {
        let mut connection = self.connection.clone();
        let raw: Option<String> = connection.hget(SHOWS, id).await?;

        raw.map(|json| show_from_json(id, &json)).transpose()
    }

    async fn create(&self, show: NewShow) -> Result<Show, StoreError> {
        let show = show.into_show(Uuid::new_v4().to_string());

        let mut connection = self.connection.clone();
        let () = connection
            .hset(SHOWS, &show.id, show_to_json(&show)?)
            .await?;

        Ok(show)
    }

    async fn update(&self, id: &str, patch: ShowPatch) -> Result<Option<Show>, StoreError> {
        let Some(mut show) = self.get(id).await? else {
            return Ok(None);
        };
        patch.apply(&mut show);

        let mut connection = self.connection.clone();
        let () = connection.hset(SHOWS, id, show_to_json(&show)?).await?;

        Ok(Some(show))
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut connection = self.connection.clone();
        let deleted: usize = connection.hdel(SHOWS, id).await?;

        Ok(deleted > 0)
    }
}

#[async_trait]
impl PaymentStore for RedisStore {
    async fn record_order(&self, order_id: &str, subject: &SubjectId) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        let () = connection.hset(ORDERS, order_id, subject.as_str()).await?;

        Ok(())
    }

    async fn order_owner(&self, order_id: &str) -> Result<Option<SubjectId>, StoreError> {
        let mut connection = self.connection.clone();
        let owner: Option<String> = connection.hget(ORDERS, order_id).await?;

        Ok(owner.map(SubjectId::new))
    }

    async fn consume_payment(&self, payment_id: &str) -> Result<bool, StoreError> {
        let mut connection = self.connection.clone();
        let added: usize = connection.sadd(PAYMENTS, payment_id).await?;

        Ok(added == 1)
    }
}
