//! # Entitlements
//!
//! Decides, per request, whether a caller may see a show's playback URL.
//!
//! ## Precedence
//! First match wins.
//! 1. Admin key equal to the configured one: full access, no subscription lookup
//! 2. No resolved subject (no token, or a token that failed verification): redacted
//! 3. Subject resolved, subscription state read from the store
//!    - no record or not subscribed: redacted
//!    - subscribed without a grant timestamp (legacy grant): [`LegacyGrantPolicy`]
//!    - subscribed with a grant timestamp: full access until the period runs out
//!
//! ## Expiry
//! Elapsed days are whole days of wall-clock duration, `floor(ms / 86_400_000)`,
//! no calendar arithmetic. Once the period is reached the subject is written back
//! as unsubscribed before the decision is returned. The write is idempotent, so
//! two concurrent requests racing on the same expired subject are harmless and no
//! lock is taken. A failed write is logged and the caller still gets the redacted
//! decision, the read-time check is what counts for the current response.
//!
//! Decisions are never cached. Every evaluation re-reads the store, which is what
//! lets an expiry take effect on the next read without a background sweep.
//!
//! ## Observability
//! Every evaluation emits exactly one `tracing` event under the `entitlement`
//! target carrying the decision, a reason code and the elapsed days when they
//! were computed, plus `expiry_persisted` when an expiry was written back. The
//! event is a `warn` when that write failed or the read failed, `info` otherwise.
//! The decision fields are returned as an [`Evaluation`].
use std::{
    fmt::{self, Display},
    str::FromStr,
    sync::Arc,
};

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::store::{StoreError, SubjectId, SubscriptionStore};

pub const MILLIS_PER_DAY: i64 = 86_400_000;
pub const DEFAULT_SUBSCRIPTION_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    FullAccess,
    RedactedAccess,
}

impl Decision {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FullAccess => "full_access",
            Self::RedactedAccess => "redacted_access",
        }
    }
}

/// Why an [`Evaluation`] ended the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    AdminOverride,
    Anonymous,
    SubjectNotFound,
    NotSubscribed,
    LegacyGrant,
    Active,
    Expired,
}

impl Reason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AdminOverride => "admin_override",
            Self::Anonymous => "anonymous",
            Self::SubjectNotFound => "subject_not_found",
            Self::NotSubscribed => "not_subscribed",
            Self::LegacyGrant => "legacy_grant",
            Self::Active => "active",
            Self::Expired => "expired",
        }
    }
}

/// What to do with a subscriber that has no grant timestamp. Such records
/// predate expiry tracking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LegacyGrantPolicy {
    #[default]
    Allow,
    Deny,
}

impl FromStr for LegacyGrantPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(Self::Allow),
            "deny" => Ok(Self::Deny),
            other => Err(format!("expected `allow` or `deny`, got `{other}`")),
        }
    }
}

impl Display for LegacyGrantPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => f.write_str("allow"),
            Self::Deny => f.write_str("deny"),
        }
    }
}

/// Credentials presented with a request, after the bearer token went through
/// the identity resolver.
#[derive(Debug, Clone, Default)]
pub struct AccessRequest {
    pub admin_key: Option<String>,
    pub subject: Option<SubjectId>,
}

impl AccessRequest {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn subject(subject: SubjectId) -> Self {
        Self {
            admin_key: None,
            subject: Some(subject),
        }
    }

    pub fn admin(admin_key: impl Into<String>) -> Self {
        Self {
            admin_key: Some(admin_key.into()),
            subject: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub decision: Decision,
    pub reason: Reason,
    pub elapsed_days: Option<i64>,
}

impl Evaluation {
    const fn full(reason: Reason, elapsed_days: Option<i64>) -> Self {
        Self {
            decision: Decision::FullAccess,
            reason,
            elapsed_days,
        }
    }

    const fn redacted(reason: Reason, elapsed_days: Option<i64>) -> Self {
        Self {
            decision: Decision::RedactedAccess,
            reason,
            elapsed_days,
        }
    }
}

pub struct Entitlements {
    admin_key: SecretString,
    period_days: i64,
    legacy_policy: LegacyGrantPolicy,
    subscriptions: Arc<dyn SubscriptionStore>,
}

impl Entitlements {
    pub fn new(
        admin_key: SecretString,
        period_days: i64,
        legacy_policy: LegacyGrantPolicy,
        subscriptions: Arc<dyn SubscriptionStore>,
    ) -> Self {
        Self {
            admin_key,
            period_days,
            legacy_policy,
            subscriptions,
        }
    }

    /// Constant-time comparison against the configured admin key. An empty
    /// configured key disables the override.
    pub fn is_admin(&self, presented: Option<&str>) -> bool {
        let expected = self.admin_key.expose_secret();

        match presented {
            Some(presented) if !expected.is_empty() => {
                presented.as_bytes().ct_eq(expected.as_bytes()).into()
            }
            _ => false,
        }
    }

    /// Only a failing subscription read is an error. Unknown subjects and
    /// missing credentials resolve to [`Decision::RedactedAccess`].
    pub async fn evaluate(
        &self,
        request: &AccessRequest,
        now: DateTime<Utc>,
    ) -> Result<Evaluation, StoreError> {
        let subject = request.subject.as_ref().map(SubjectId::as_str);

        let evaluation = match self.decide(request, now).await {
            Ok(evaluation) => evaluation,
            Err(error) => {
                warn!(
                    target: "entitlement",
                    reason = "store_error",
                    subject,
                    %error,
                    "evaluation failed, denying"
                );
                return Err(error);
            }
        };

        // The read decided, a failed write only leaves the flag to the next read
        let expiry_persisted = match (&request.subject, evaluation.reason) {
            (Some(subject), Reason::Expired) => {
                Some(self.subscriptions.expire(subject).await.is_ok())
            }
            _ => None,
        };

        if expiry_persisted == Some(false) {
            warn!(
                target: "entitlement",
                decision = evaluation.decision.as_str(),
                reason = evaluation.reason.as_str(),
                elapsed_days = evaluation.elapsed_days,
                subject,
                expiry_persisted,
                "evaluated"
            );
        } else {
            info!(
                target: "entitlement",
                decision = evaluation.decision.as_str(),
                reason = evaluation.reason.as_str(),
                elapsed_days = evaluation.elapsed_days,
                subject,
                expiry_persisted,
                "evaluated"
            );
        }

        Ok(evaluation)
    }

    async fn decide(
        &self,
        request: &AccessRequest,
        now: DateTime<Utc>,
    ) -> Result<Evaluation, StoreError> {
        if self.is_admin(request.admin_key.as_deref()) {
            return Ok(Evaluation::full(Reason::AdminOverride, None));
        }

        let Some(subject) = &request.subject else {
            return Ok(Evaluation::redacted(Reason::Anonymous, None));
        };

        let Some(subscription) = self.subscriptions.read(subject).await? else {
            return Ok(Evaluation::redacted(Reason::SubjectNotFound, None));
        };

        if !subscription.is_subscribed {
            return Ok(Evaluation::redacted(Reason::NotSubscribed, None));
        }

        let Some(granted_at) = subscription.granted_at else {
            return Ok(match self.legacy_policy {
                LegacyGrantPolicy::Allow => Evaluation::full(Reason::LegacyGrant, None),
                LegacyGrantPolicy::Deny => Evaluation::redacted(Reason::LegacyGrant, None),
            });
        };

        let elapsed = elapsed_days(granted_at, now);
        if elapsed < self.period_days {
            Ok(Evaluation::full(Reason::Active, Some(elapsed)))
        } else {
            Ok(Evaluation::redacted(Reason::Expired, Some(elapsed)))
        }
    }
}

/// Whole days between `granted_at` and `now`. Grants in the future count as zero.
pub fn elapsed_days(granted_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - granted_at).num_milliseconds().max(0) / MILLIS_PER_DAY
}

#[cfg(test)]
mod tests {
    use std::{fmt::Write, sync::Mutex};

    use chrono::Duration;
    use tracing::{
        Event, Subscriber,
        field::{Field, Visit},
    };
    use tracing_subscriber::{
        Layer,
        layer::{Context, SubscriberExt},
        registry,
    };

    use super::*;
    use crate::{store::memory::MemoryStore, user::User};

    /// Records `target: field=value ...` for every event on this thread.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<String>>>);

    impl Captured {
        fn install(&self) -> tracing::subscriber::DefaultGuard {
            tracing::subscriber::set_default(registry().with(self.clone()))
        }

        fn events(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    struct Line(String);

    impl Visit for Line {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            let _ = write!(self.0, " {}={:?}", field.name(), value);
        }
    }

    impl<S: Subscriber> Layer<S> for Captured {
        fn on_event(&self, event: &Event<'_>, _: Context<'_, S>) {
            let mut line = Line(format!("{}:", event.metadata().target()));
            event.record(&mut line);
            self.0.lock().unwrap().push(line.0);
        }
    }

    const ADMIN_KEY: &str = "ops-admin-key";

    fn setup(policy: LegacyGrantPolicy) -> (Arc<MemoryStore>, Entitlements) {
        let store = Arc::new(MemoryStore::default());
        let entitlements = Entitlements::new(
            SecretString::from(ADMIN_KEY),
            DEFAULT_SUBSCRIPTION_DAYS,
            policy,
            store.clone(),
        );

        (store, entitlements)
    }

    fn subscriber(
        store: &MemoryStore,
        is_subscribed: bool,
        granted_at: Option<DateTime<Utc>>,
    ) -> SubjectId {
        let id = SubjectId::new(format!("user-{is_subscribed}-{}", granted_at.is_some()));
        let mut user = User::new(id.clone(), "viewer@example.com", "hash");
        user.is_subscribed = is_subscribed;
        user.subscription_granted_at = granted_at;
        store.insert_user(user);

        id
    }

    #[tokio::test]
    async fn test_admin_override_dominates() {
        let (store, entitlements) = setup(LegacyGrantPolicy::Allow);
        let now = Utc::now();
        let expired = subscriber(&store, true, Some(now - Duration::days(90)));

        let request = AccessRequest {
            admin_key: Some(ADMIN_KEY.to_string()),
            subject: Some(expired.clone()),
        };
        let evaluation = entitlements.evaluate(&request, now).await.unwrap();

        assert_eq!(evaluation, Evaluation::full(Reason::AdminOverride, None));
        assert_eq!(store.expire_writes(), 0);
        assert!(store.user(&expired).unwrap().is_subscribed);
    }

    #[tokio::test]
    async fn test_admin_override_skips_an_unavailable_store() {
        let (store, entitlements) = setup(LegacyGrantPolicy::Allow);
        store.set_offline(true);

        let evaluation = entitlements
            .evaluate(&AccessRequest::admin(ADMIN_KEY), Utc::now())
            .await
            .unwrap();

        assert_eq!(evaluation.decision, Decision::FullAccess);
    }

    #[tokio::test]
    async fn test_anonymous_default() {
        let (_, entitlements) = setup(LegacyGrantPolicy::Allow);

        for request in [
            AccessRequest::anonymous(),
            AccessRequest::admin("wrong-key"),
            AccessRequest::admin(""),
        ] {
            let evaluation = entitlements.evaluate(&request, Utc::now()).await.unwrap();
            assert_eq!(evaluation, Evaluation::redacted(Reason::Anonymous, None));
        }
    }

    #[tokio::test]
    async fn test_mismatched_admin_key_falls_through_to_subject() {
        let (store, entitlements) = setup(LegacyGrantPolicy::Allow);
        let now = Utc::now();
        let subject = subscriber(&store, true, Some(now - Duration::days(1)));

        let request = AccessRequest {
            admin_key: Some("wrong-key".to_string()),
            subject: Some(subject),
        };
        let evaluation = entitlements.evaluate(&request, now).await.unwrap();

        assert_eq!(evaluation, Evaluation::full(Reason::Active, Some(1)));
    }

    #[tokio::test]
    async fn test_empty_configured_key_disables_override() {
        let entitlements = Entitlements::new(
            SecretString::from(""),
            DEFAULT_SUBSCRIPTION_DAYS,
            LegacyGrantPolicy::Allow,
            Arc::new(MemoryStore::default()),
        );

        assert!(!entitlements.is_admin(Some("")));
        assert!(!entitlements.is_admin(None));
    }

    #[tokio::test]
    async fn test_unsubscribed_denial_for_any_timestamp() {
        let now = Utc::now();

        for granted_at in [None, Some(now), Some(now - Duration::days(400))] {
            let (store, entitlements) = setup(LegacyGrantPolicy::Allow);
            let subject = subscriber(&store, false, granted_at);

            let evaluation = entitlements
                .evaluate(&AccessRequest::subject(subject), now)
                .await
                .unwrap();

            assert_eq!(evaluation, Evaluation::redacted(Reason::NotSubscribed, None));
            assert_eq!(store.expire_writes(), 0);
        }
    }

    #[tokio::test]
    async fn test_fresh_subscription_grants_access() {
        let (store, entitlements) = setup(LegacyGrantPolicy::Allow);
        let now = Utc::now();
        let subject = subscriber(&store, true, Some(now - Duration::days(1)));

        let evaluation = entitlements
            .evaluate(&AccessRequest::subject(subject), now)
            .await
            .unwrap();

        assert_eq!(evaluation, Evaluation::full(Reason::Active, Some(1)));
    }

    #[tokio::test]
    async fn test_last_hour_of_the_period_still_grants_access() {
        let (store, entitlements) = setup(LegacyGrantPolicy::Allow);
        let now = Utc::now();
        let granted_at = now - (Duration::days(29) + Duration::hours(23));
        let subject = subscriber(&store, true, Some(granted_at));

        let evaluation = entitlements
            .evaluate(&AccessRequest::subject(subject.clone()), now)
            .await
            .unwrap();

        assert_eq!(evaluation, Evaluation::full(Reason::Active, Some(29)));
        assert_eq!(store.expire_writes(), 0);
        assert!(store.user(&subject).unwrap().is_subscribed);
    }

    #[tokio::test]
    async fn test_expires_at_thirty_days_and_writes_once() {
        let (store, entitlements) = setup(LegacyGrantPolicy::Allow);
        let now = Utc::now();
        let subject = subscriber(&store, true, Some(now - Duration::days(30)));

        let evaluation = entitlements
            .evaluate(&AccessRequest::subject(subject.clone()), now)
            .await
            .unwrap();

        assert_eq!(evaluation, Evaluation::redacted(Reason::Expired, Some(30)));
        assert_eq!(store.expire_writes(), 1);
        assert!(!store.user(&subject).unwrap().is_subscribed);
    }

    #[tokio::test]
    async fn test_repeated_evaluation_of_expired_subject() {
        let (store, entitlements) = setup(LegacyGrantPolicy::Allow);
        let now = Utc::now();
        let subject = subscriber(&store, true, Some(now - Duration::days(45)));
        let request = AccessRequest::subject(subject);

        let first = entitlements.evaluate(&request, now).await.unwrap();
        let second = entitlements.evaluate(&request, now).await.unwrap();

        assert_eq!(first, Evaluation::redacted(Reason::Expired, Some(45)));
        assert_eq!(second, Evaluation::redacted(Reason::NotSubscribed, None));
        assert_eq!(store.expire_writes(), 1);
    }

    #[tokio::test]
    async fn test_expiry_write_is_idempotent() {
        let (store, _) = setup(LegacyGrantPolicy::Allow);
        let subject = subscriber(&store, false, Some(Utc::now() - Duration::days(45)));

        store.expire(&subject).await.unwrap();
        store.expire(&subject).await.unwrap();

        assert!(!store.user(&subject).unwrap().is_subscribed);
    }

    #[tokio::test]
    async fn test_legacy_grant_policy() {
        let (store, allow) = setup(LegacyGrantPolicy::Allow);
        let subject = subscriber(&store, true, None);

        let evaluation = allow
            .evaluate(&AccessRequest::subject(subject.clone()), Utc::now())
            .await
            .unwrap();
        assert_eq!(evaluation, Evaluation::full(Reason::LegacyGrant, None));

        let deny = Entitlements::new(
            SecretString::from(ADMIN_KEY),
            DEFAULT_SUBSCRIPTION_DAYS,
            LegacyGrantPolicy::Deny,
            store.clone(),
        );
        let evaluation = deny
            .evaluate(&AccessRequest::subject(subject), Utc::now())
            .await
            .unwrap();
        assert_eq!(evaluation, Evaluation::redacted(Reason::LegacyGrant, None));
        assert_eq!(store.expire_writes(), 0);
    }

    #[tokio::test]
    async fn test_unknown_subject_is_not_subscribed() {
        let (_, entitlements) = setup(LegacyGrantPolicy::Allow);

        let evaluation = entitlements
            .evaluate(&AccessRequest::subject(SubjectId::new("deleted")), Utc::now())
            .await
            .unwrap();

        assert_eq!(evaluation, Evaluation::redacted(Reason::SubjectNotFound, None));
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_closed() {
        let (store, entitlements) = setup(LegacyGrantPolicy::Allow);
        let subject = subscriber(&store, true, Some(Utc::now()));
        store.set_offline(true);

        let result = entitlements
            .evaluate(&AccessRequest::subject(subject), Utc::now())
            .await;

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[test]
    fn test_elapsed_days_floors_and_clamps() {
        let now = Utc::now();

        assert_eq!(elapsed_days(now, now), 0);
        assert_eq!(elapsed_days(now - Duration::hours(23), now), 0);
        assert_eq!(elapsed_days(now - Duration::hours(49), now), 2);
        assert_eq!(elapsed_days(now + Duration::days(3), now), 0);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("allow".parse::<LegacyGrantPolicy>(), Ok(LegacyGrantPolicy::Allow));
        assert_eq!(" DENY ".parse::<LegacyGrantPolicy>(), Ok(LegacyGrantPolicy::Deny));
        assert!("maybe".parse::<LegacyGrantPolicy>().is_err());
        assert_eq!(LegacyGrantPolicy::default().to_string(), "allow");
    }

    #[tokio::test]
    async fn test_failed_expiry_write_still_redacts() {
        let (store, entitlements) = setup(LegacyGrantPolicy::Allow);
        let now = Utc::now();
        let subject = subscriber(&store, true, Some(now - Duration::days(31)));
        store.set_fail_writes(true);

        let evaluation = entitlements
            .evaluate(&AccessRequest::subject(subject.clone()), now)
            .await;

        assert_eq!(
            evaluation.unwrap(),
            Evaluation::redacted(Reason::Expired, Some(31))
        );
        assert!(store.user(&subject).unwrap().is_subscribed);
        assert_eq!(store.expire_writes(), 0);
    }

    #[tokio::test]
    async fn test_one_event_per_evaluation() {
        let (store, entitlements) = setup(LegacyGrantPolicy::Allow);
        let now = Utc::now();
        let captured = Captured::default();
        let _guard = captured.install();

        let subject = subscriber(&store, true, Some(now - Duration::days(31)));
        store.set_fail_writes(true);
        entitlements
            .evaluate(&AccessRequest::subject(subject.clone()), now)
            .await
            .unwrap();

        let events = captured.events();
        assert_eq!(events.len(), 1);
        assert!(events[0].starts_with("entitlement:"));
        assert!(events[0].contains("reason=\"expired\""));
        assert!(events[0].contains("expiry_persisted=false"));

        store.set_fail_writes(false);
        store.set_offline(true);
        let result = entitlements
            .evaluate(&AccessRequest::subject(subject), now)
            .await;
        assert!(result.is_err());

        let events = captured.events();
        assert_eq!(events.len(), 2);
        assert!(events[1].starts_with("entitlement:"));
        assert!(events[1].contains("reason=\"store_error\""));
    }

    #[tokio::test]
    async fn test_persisted_expiry_is_reported() {
        let (store, entitlements) = setup(LegacyGrantPolicy::Allow);
        let now = Utc::now();
        let captured = Captured::default();
        let _guard = captured.install();

        let subject = subscriber(&store, true, Some(now - Duration::days(30)));
        entitlements
            .evaluate(&AccessRequest::subject(subject), now)
            .await
            .unwrap();

        let events = captured.events();
        assert_eq!(events.len(), 1);
        assert!(events[0].contains("expiry_persisted=true"));
    }
}
