use std::sync::Arc;

use redis::RedisError;

use super::{
    config::Config,
    database::{RedisStore, init_redis},
    entitlement::Entitlements,
    identity::IdentityResolver,
    payment::PaymentGateway,
    store::{PaymentStore, ShowStore, SubscriptionStore, UserStore},
};

pub struct AppState {
    pub bcrypt_cost: u32,
    pub users: Arc<dyn UserStore>,
    pub shows: Arc<dyn ShowStore>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub payment_records: Arc<dyn PaymentStore>,
    pub entitlements: Entitlements,
    pub identity: IdentityResolver,
    pub payments: PaymentGateway,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Arc<Self>, RedisError> {
        let connection = init_redis(&config.redis_url).await?;

        Ok(Self::with_store(config, Arc::new(RedisStore::new(connection))))
    }

    /// Wires every service onto one backing store.
    pub fn with_store<S>(config: Config, store: Arc<S>) -> Arc<Self>
    where
        S: UserStore + ShowStore + SubscriptionStore + PaymentStore + 'static,
    {
        let identity = IdentityResolver::new(&config.jwt_secret, config.token_ttl_secs);
        let entitlements = Entitlements::new(
            config.admin_key,
            config.subscription_days,
            config.legacy_grant_policy,
            store.clone(),
        );

        Arc::new(Self {
            bcrypt_cost: config.bcrypt_cost,
            users: store.clone(),
            shows: store.clone(),
            subscriptions: store.clone(),
            payment_records: store,
            entitlements,
            identity,
            payments: PaymentGateway::new(config.payment),
        })
    }
}
