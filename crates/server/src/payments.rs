//! PayPal and Stripe capture confirmation.
//!
//! The client approves a payment with the provider, then hands us the order
//! (PayPal) or payment intent (Stripe) id. We ask the provider whether money
//! actually moved and how much; only then is the subscription extended.

use dentalcare_api::PaymentProvider;
use serde_json::Value;

use crate::error::ApiErr;

#[derive(Debug, Clone)]
pub struct PayPalConfig {
    pub client_id: String,
    pub client_secret: String,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub api_base: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("{0} payments are not configured")]
    NotConfigured(PaymentProvider),
    #[error("invalid payment reference")]
    InvalidReference,
    #[error("payment provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("payment provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("payment is not completed (status {0})")]
    NotCompleted(String),
    #[error("unexpected payment provider response: {0}")]
    Malformed(&'static str),
}

impl From<PaymentError> for ApiErr {
    fn from(e: PaymentError) -> Self {
        match e {
            PaymentError::Transport(_) | PaymentError::Malformed(_) => {
                tracing::error!("payment gateway: {e}");
                ApiErr::bad_gateway("payment provider error")
            }
            PaymentError::Rejected { status, .. } if status >= 500 => {
                tracing::error!("payment gateway: {e}");
                ApiErr::bad_gateway("payment provider error")
            }
            other => ApiErr::bad_request(other.to_string()),
        }
    }
}

/// What the provider confirmed as captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedPayment {
    pub amount_cents: i64,
    pub currency: String,
}

/// Configured payment gateways.
#[derive(Clone)]
pub struct Gateways {
    client: reqwest::Client,
    paypal: Option<PayPalConfig>,
    stripe: Option<StripeConfig>,
}

impl Gateways {
    pub fn new(paypal: Option<PayPalConfig>, stripe: Option<StripeConfig>) -> Self {
        Self {
            client: reqwest::Client::new(),
            paypal,
            stripe,
        }
    }

    /// Providers a client may pay with.
    pub fn providers(&self) -> Vec<PaymentProvider> {
        let mut out = Vec::new();
        if self.paypal.is_some() {
            out.push(PaymentProvider::Paypal);
        }
        if self.stripe.is_some() {
            out.push(PaymentProvider::Stripe);
        }
        out
    }

    pub async fn capture(
        &self,
        provider: PaymentProvider,
        reference: &str,
    ) -> Result<CapturedPayment, PaymentError> {
        validate_reference(reference)?;
        match provider {
            PaymentProvider::Paypal => {
                let cfg = self
                    .paypal
                    .as_ref()
                    .ok_or(PaymentError::NotConfigured(provider))?;
                self.capture_paypal(cfg, reference).await
            }
            PaymentProvider::Stripe => {
                let cfg = self
                    .stripe
                    .as_ref()
                    .ok_or(PaymentError::NotConfigured(provider))?;
                self.confirm_stripe(cfg, reference).await
            }
        }
    }

    async fn capture_paypal(
        &self,
        cfg: &PayPalConfig,
        order_id: &str,
    ) -> Result<CapturedPayment, PaymentError> {
        let base = cfg.api_base.trim_end_matches('/');

        let token_res = self
            .client
            .post(format!("{base}/v1/oauth2/token"))
            .basic_auth(&cfg.client_id, Some(&cfg.client_secret))
            .header("Accept", "application/json")
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials")
            .send()
            .await?;
        let token_json = json_or_rejected(token_res).await?;
        let access_token = token_json
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or(PaymentError::Malformed("missing access_token"))?;

        let res = self
            .client
            .post(format!("{base}/v2/checkout/orders/{order_id}/capture"))
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
            .body("{}")
            .send()
            .await?;
        parse_paypal_capture(&json_or_rejected(res).await?)
    }

    async fn confirm_stripe(
        &self,
        cfg: &StripeConfig,
        intent_id: &str,
    ) -> Result<CapturedPayment, PaymentError> {
        let base = cfg.api_base.trim_end_matches('/');
        let res = self
            .client
            .get(format!("{base}/v1/payment_intents/{intent_id}"))
            .bearer_auth(&cfg.secret_key)
            .header("Accept", "application/json")
            .send()
            .await?;
        parse_stripe_intent(&json_or_rejected(res).await?)
    }
}

async fn json_or_rejected(res: reqwest::Response) -> Result<Value, PaymentError> {
    let status = res.status();
    let body: Value = res.json().await.unwrap_or(Value::Null);
    if !status.is_success() {
        let message = provider_message(&body).unwrap_or_else(|| status.to_string());
        return Err(PaymentError::Rejected {
            status: status.as_u16(),
            message,
        });
    }
    Ok(body)
}

/// PayPal puts it in `message`, Stripe in `error.message`.
fn provider_message(body: &Value) -> Option<String> {
    body.get("message")
        .or_else(|| body.get("error").and_then(|e| e.get("message")))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Provider ids are opaque but always URL-safe; refuse anything else before
/// it is interpolated into a request path.
pub fn validate_reference(reference: &str) -> Result<(), PaymentError> {
    let ok = !reference.is_empty()
        && reference.len() <= 128
        && reference
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(PaymentError::InvalidReference)
    }
}

/// Parse a decimal string like `"29.99"` into cents.
fn parse_decimal_cents(value: &str) -> Option<i64> {
    let (whole, frac) = match value.split_once('.') {
        Some((w, f)) => (w, f),
        None => (value, ""),
    };
    if whole.is_empty() || frac.len() > 2 || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let whole: i64 = whole.parse().ok()?;
    let frac: i64 = if frac.is_empty() {
        0
    } else {
        format!("{frac:0<2}").parse().ok()?
    };
    whole.checked_mul(100)?.checked_add(frac)
}

/// Interpret the body of `POST /v2/checkout/orders/{id}/capture`.
pub fn parse_paypal_capture(body: &Value) -> Result<CapturedPayment, PaymentError> {
    let status = body
        .get("status")
        .and_then(Value::as_str)
        .ok_or(PaymentError::Malformed("missing order status"))?;
    if status != "COMPLETED" {
        return Err(PaymentError::NotCompleted(status.to_string()));
    }

    let amount = body
        .pointer("/purchase_units/0/payments/captures/0/amount")
        .ok_or(PaymentError::Malformed("missing capture amount"))?;
    let currency = amount
        .get("currency_code")
        .and_then(Value::as_str)
        .ok_or(PaymentError::Malformed("missing currency_code"))?;
    let amount_cents = amount
        .get("value")
        .and_then(Value::as_str)
        .and_then(parse_decimal_cents)
        .ok_or(PaymentError::Malformed("bad capture value"))?;

    Ok(CapturedPayment {
        amount_cents,
        currency: currency.to_ascii_uppercase(),
    })
}

/// Interpret the body of `GET /v1/payment_intents/{id}`.
pub fn parse_stripe_intent(body: &Value) -> Result<CapturedPayment, PaymentError> {
    let status = body
        .get("status")
        .and_then(Value::as_str)
        .ok_or(PaymentError::Malformed("missing intent status"))?;
    if status != "succeeded" {
        return Err(PaymentError::NotCompleted(status.to_string()));
    }
    let amount_cents = body
        .get("amount_received")
        .and_then(Value::as_i64)
        .ok_or(PaymentError::Malformed("missing amount_received"))?;
    let currency = body
        .get("currency")
        .and_then(Value::as_str)
        .ok_or(PaymentError::Malformed("missing currency"))?;

    Ok(CapturedPayment {
        amount_cents,
        currency: currency.to_ascii_uppercase(),
    })
}
