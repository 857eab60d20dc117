//! # Payments
//!
//! Razorpay style checkout, two steps.
//!
//! 1. `create-order`: the backend asks the gateway for an order of the configured
//!    amount (minor units, e.g. paise) and hands the gateway's JSON straight to the
//!    frontend checkout widget.
//! 2. `verify`: the widget posts back order id, payment id and signature. The
//!    signature is `hex(HMAC-SHA256(key_secret, "{order_id}|{payment_id}"))` and is
//!    compared in constant time. A match grants the subscription as of now.
//!
//! The gateway's own order lifecycle (captures, refunds, webhooks) is not handled.
use hmac::{Hmac, Mac};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;
use uuid::Uuid;

use crate::{config::PaymentConfig, store::SubjectId};

type HmacSha256 = Hmac<Sha256>;

#[derive(Serialize)]
struct OrderRequest<'a> {
    amount: u64,
    currency: &'a str,
    receipt: String,
    notes: OrderNotes<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderNotes<'a> {
    user_id: &'a str,
}

/// Callback payload from the checkout widget.
#[derive(Debug, Deserialize)]
pub struct PaymentConfirmation {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
}

pub struct PaymentGateway {
    client: Client,
    base_url: String,
    key_id: String,
    key_secret: SecretString,
    amount: u64,
    currency: String,
}

impl PaymentGateway {
    pub fn new(config: PaymentConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.gateway_url.trim_end_matches('/').to_string(),
            key_id: config.key_id,
            key_secret: config.key_secret,
            amount: config.amount,
            currency: config.currency,
        }
    }

    fn order<'a>(&'a self, subject: &'a SubjectId) -> OrderRequest<'a> {
        OrderRequest {
            amount: self.amount,
            currency: &self.currency,
            receipt: format!("rcpt_{}", Uuid::new_v4().simple()),
            notes: OrderNotes {
                user_id: subject.as_str(),
            },
        }
    }

    pub async fn create_order(&self, subject: &SubjectId) -> Result<Value, reqwest::Error> {
        let order = self.order(subject);

        self.client
            .post(format!("{}/v1/orders", self.base_url))
            .basic_auth(&self.key_id, Some(self.key_secret.expose_secret()))
            .json(&order)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    pub fn verify(&self, confirmation: &PaymentConfirmation) -> bool {
        let Ok(presented) = hex::decode(confirmation.razorpay_signature.trim()) else {
            warn!(
                order_id = %confirmation.razorpay_order_id,
                "Payment signature is not hex"
            );
            return false;
        };

        let Ok(mut mac) = HmacSha256::new_from_slice(self.key_secret.expose_secret().as_bytes())
        else {
            return false;
        };
        mac.update(confirmation.razorpay_order_id.as_bytes());
        mac.update(b"|");
        mac.update(confirmation.razorpay_payment_id.as_bytes());
        let computed = mac.finalize().into_bytes();

        let verified: bool = computed.as_slice().ct_eq(&presented).into();
        if !verified {
            warn!(
                order_id = %confirmation.razorpay_order_id,
                "Payment signature mismatch"
            );
        }

        verified
    }
}
