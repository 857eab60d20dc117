//! # Identity
//!
//! Stateless bearer token verification. Tokens are HS256 JWTs signed with the
//! shared `JWT_SECRET`, carrying the subject in `sub` plus `iat`/`exp`.
//!
//! Tokens minted before `sub` became canonical carry the user id as `userId`,
//! `id` or `userID`. Those names are accepted here and nowhere else, in that
//! order after `sub`.
//!
//! Resolution never fails loudly: a missing, malformed, tampered or expired
//! token resolves to no subject, which the rest of the backend treats exactly
//! like an anonymous request.
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::Error,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::store::SubjectId;

pub const DEFAULT_TOKEN_TTL_SECS: i64 = 60 * 60;

#[derive(Serialize)]
struct IssuedClaims<'a> {
    sub: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct PresentedClaims {
    sub: Option<String>,
    #[serde(rename = "userId")]
    user_id: Option<String>,
    id: Option<String>,
    #[serde(rename = "userID")]
    user_id_upper: Option<String>,
}

impl PresentedClaims {
    fn into_subject(self) -> Option<SubjectId> {
        [self.sub, self.user_id, self.id, self.user_id_upper]
            .into_iter()
            .flatten()
            .find(|id| !id.trim().is_empty())
            .map(SubjectId::new)
    }
}

pub struct IdentityResolver {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl IdentityResolver {
    pub fn new(secret: &SecretString, ttl_secs: i64) -> Self {
        let secret = secret.expose_secret().as_bytes();

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
            ttl: Duration::seconds(ttl_secs),
        }
    }

    pub fn issue(&self, subject: &SubjectId, now: DateTime<Utc>) -> Result<String, Error> {
        let claims = IssuedClaims {
            sub: subject.as_str(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    pub fn resolve(&self, token: &str) -> Option<SubjectId> {
        match decode::<PresentedClaims>(token, &self.decoding, &self.validation) {
            Ok(data) => {
                let subject = data.claims.into_subject();
                if subject.is_none() {
                    debug!("Bearer token carries no subject");
                }
                subject
            }
            Err(error) => {
                debug!(%error, "Rejected bearer token");
                None
            }
        }
    }
}
