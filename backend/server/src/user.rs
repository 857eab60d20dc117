//! # Users
//!
//! Accounts are keyed by an opaque [`SubjectId`] and carry the subscription
//! state the entitlement evaluator reads. The password hash never leaves the
//! backend, clients only ever see a [`Profile`].
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{SubjectId, Subscription};

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: SubjectId,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
    pub subscription_granted_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(id: SubjectId, email: &str, password_hash: &str) -> Self {
        Self {
            id,
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            first_name: String::new(),
            last_name: String::new(),
            is_subscribed: false,
            subscription_granted_at: None,
        }
    }

    pub fn subscription(&self) -> Subscription {
        Subscription {
            is_subscribed: self.is_subscribed,
            granted_at: self.subscription_granted_at,
        }
    }

    pub fn profile(&self) -> Profile {
        Profile {
            id: self.id.clone(),
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            is_paid: self.is_subscribed,
            subscription_granted_at: self.subscription_granted_at,
        }
    }
}

/// Client facing view of a [`User`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: SubjectId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_paid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_granted_at: Option<DateTime<Utc>>,
}

/// Partial profile update. Empty strings count as "leave unchanged".
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl ProfilePatch {
    pub fn first_name(&self) -> Option<&str> {
        non_empty(self.first_name.as_deref())
    }

    pub fn last_name(&self) -> Option<&str> {
        non_empty(self.last_name.as_deref())
    }

    pub fn apply(&self, user: &mut User) {
        if let Some(first_name) = self.first_name() {
            user.first_name = first_name.to_string();
        }
        if let Some(last_name) = self.last_name() {
            user.last_name = last_name.to_string();
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User::new(SubjectId::new("u-1"), "viewer@example.com", "$2b$04$hash")
    }

    #[test]
    fn test_new_user_is_unsubscribed() {
        let user = user();

        assert_eq!(
            user.subscription(),
            Subscription {
                is_subscribed: false,
                granted_at: None
            }
        );
    }

    #[test]
    fn test_profile_never_contains_password_hash() {
        let json = serde_json::to_string(&user().profile()).unwrap();

        assert!(!json.contains("hash"));
        assert!(json.contains(r#""isPaid":false"#));
        assert!(!json.contains("subscriptionGrantedAt"));
    }

    #[test]
    fn test_patch_ignores_empty_names() {
        let mut user = user();
        user.first_name = "Ada".to_string();

        let patch = ProfilePatch {
            first_name: Some("  ".to_string()),
            last_name: Some("Lovelace".to_string()),
        };
        patch.apply(&mut user);

        assert_eq!(user.first_name, "Ada");
        assert_eq!(user.last_name, "Lovelace");
    }
}
