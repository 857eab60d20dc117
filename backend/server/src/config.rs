use std::{env, fmt::Display, fs::read_to_string, ops::RangeInclusive, str::FromStr};

use secrecy::SecretString;
use tracing::{info, warn};

use crate::{
    entitlement::{DEFAULT_SUBSCRIPTION_DAYS, LegacyGrantPolicy},
    identity::DEFAULT_TOKEN_TTL_SECS,
};

pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

pub const SUBSCRIPTION_DAYS_RANGE: RangeInclusive<i64> = 1..=3650;
pub const TOKEN_TTL_SECS_RANGE: RangeInclusive<i64> = 60..=30 * 24 * 60 * 60;
pub const BCRYPT_COST_RANGE: RangeInclusive<u32> = 4..=31;

pub struct Config {
    pub port: u16,
    pub redis_url: String,
    pub jwt_secret: SecretString,
    pub admin_key: SecretString,
    pub token_ttl_secs: i64,
    pub subscription_days: i64,
    pub legacy_grant_policy: LegacyGrantPolicy,
    pub bcrypt_cost: u32,
    pub payment: PaymentConfig,
}

pub struct PaymentConfig {
    pub gateway_url: String,
    pub key_id: String,
    pub key_secret: SecretString,
    /// Minor currency units, 9900 paise is ₹99.
    pub amount: u64,
    pub currency: String,
}

impl Config {
    pub fn load() -> Self {
        Self {
            port: try_load("RUST_PORT", "1111"),
            redis_url: try_load("REDIS_URL", "redis://redis:6379"),
            jwt_secret: read_secret("JWT_SECRET"),
            admin_key: read_secret("ADMIN_KEY"),
            token_ttl_secs: try_load_in_range(
                "TOKEN_TTL_SECS",
                &DEFAULT_TOKEN_TTL_SECS.to_string(),
                TOKEN_TTL_SECS_RANGE,
            ),
            subscription_days: try_load_in_range(
                "SUBSCRIPTION_DAYS",
                &DEFAULT_SUBSCRIPTION_DAYS.to_string(),
                SUBSCRIPTION_DAYS_RANGE,
            ),
            legacy_grant_policy: try_load(
                "LEGACY_GRANT_POLICY",
                &LegacyGrantPolicy::default().to_string(),
            ),
            bcrypt_cost: try_load_in_range("BCRYPT_COST", "10", BCRYPT_COST_RANGE),
            payment: PaymentConfig {
                gateway_url: try_load("PAYMENT_GATEWAY_URL", "https://api.razorpay.com"),
                key_id: try_load("PAYMENT_KEY_ID", ""),
                key_secret: read_secret("PAYMENT_KEY_SECRET"),
                amount: try_load("ORDER_AMOUNT", "9900"),
                currency: try_load("ORDER_CURRENCY", "INR"),
            },
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}

fn try_load_in_range<T>(key: &str, default: &str, range: RangeInclusive<T>) -> T
where
    T: FromStr + PartialOrd + Display,
    T::Err: Display,
{
    check_range(key, try_load(key, default), &range)
        .map_err(|e| {
            warn!("{e}");
        })
        .expect("Environment misconfigured!")
}

fn check_range<T>(key: &str, value: T, range: &RangeInclusive<T>) -> Result<T, String>
where
    T: PartialOrd + Display,
{
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(format!(
            "{key}={value} is outside {}..={}",
            range.start(),
            range.end()
        ))
    }
}

/// Docker secret first, then an environment variable of the same name.
fn read_secret(secret_name: &str) -> SecretString {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .or_else(|e| {
            info!("Failed to read {secret_name} from file: {e}, trying environment");
            env::var(secret_name)
        })
        .map(SecretString::from)
        .map_err(|_| {
            warn!("Secret {secret_name} not found");
        })
        .expect("Secrets misconfigured!")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_days_range() {
        assert_eq!(check_range("SUBSCRIPTION_DAYS", 30, &SUBSCRIPTION_DAYS_RANGE), Ok(30));
        assert!(check_range("SUBSCRIPTION_DAYS", 0, &SUBSCRIPTION_DAYS_RANGE).is_err());
        assert!(check_range("SUBSCRIPTION_DAYS", -5, &SUBSCRIPTION_DAYS_RANGE).is_err());
    }

    #[test]
    fn test_token_ttl_range() {
        assert_eq!(
            check_range("TOKEN_TTL_SECS", DEFAULT_TOKEN_TTL_SECS, &TOKEN_TTL_SECS_RANGE),
            Ok(DEFAULT_TOKEN_TTL_SECS)
        );
        assert!(check_range("TOKEN_TTL_SECS", 0, &TOKEN_TTL_SECS_RANGE).is_err());

        let error = check_range("TOKEN_TTL_SECS", i64::MAX, &TOKEN_TTL_SECS_RANGE).unwrap_err();
        assert!(error.starts_with("TOKEN_TTL_SECS="));
    }

    #[test]
    fn test_defaults_are_in_range() {
        assert!(SUBSCRIPTION_DAYS_RANGE.contains(&DEFAULT_SUBSCRIPTION_DAYS));
        assert!(TOKEN_TTL_SECS_RANGE.contains(&DEFAULT_TOKEN_TTL_SECS));
        assert!(BCRYPT_COST_RANGE.contains(&10));
    }
}
