use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use std::str::FromStr;

use crate::payments::{PayPalConfig, StripeConfig};

const PAYPAL_SANDBOX_BASE: &str = "https://api-m.sandbox.paypal.com";
const STRIPE_API_BASE: &str = "https://api.stripe.com";

/// Server configuration loaded from environment variables.
#[derive(Clone)]
pub struct AppConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub base_url: String,
    /// Base for links placed in verification and reset emails.
    pub frontend_url: String,
    pub jwt_secret: String,
    pub require_email_verification: bool,
    pub subscription_price_cents: i64,
    pub subscription_currency: String,
    /// 0 disables the sweeper.
    pub sweep_interval_secs: u64,
    pub contact_inbox: String,
    pub contact_max_attachment_bytes: usize,
    pub paypal: Option<PayPalConfig>,
    pub stripe: Option<StripeConfig>,
}

/// Read an env var, treating empty values as unset.
fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_var(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("{key}={raw:?} is invalid: {e}")),
        None => Ok(default),
    }
}

fn env_bool(key: &str, default: bool) -> Result<bool> {
    match env_var(key).as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => bail!("{key}={other:?} is not a boolean"),
    }
}

fn try_load_paypal() -> Option<PayPalConfig> {
    let client_id = env_var("PAYPAL_CLIENT_ID")?;
    let client_secret = env_var("PAYPAL_CLIENT_SECRET")?;
    let api_base = env_var("PAYPAL_API_BASE").unwrap_or_else(|| PAYPAL_SANDBOX_BASE.into());
    tracing::info!("payment provider enabled: PayPal ({api_base})");
    Some(PayPalConfig {
        client_id,
        client_secret,
        api_base,
    })
}

fn try_load_stripe() -> Option<StripeConfig> {
    let secret_key = env_var("STRIPE_SECRET_KEY")?;
    let api_base = env_var("STRIPE_API_BASE").unwrap_or_else(|| STRIPE_API_BASE.into());
    tracing::info!("payment provider enabled: Stripe ({api_base})");
    Some(StripeConfig {
        secret_key,
        api_base,
    })
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let jwt_secret = env_var("JWT_SECRET").context("JWT_SECRET must be set")?;

        let base_url = env_var("BASE_URL").unwrap_or_else(|| "http://localhost:3000".into());
        let frontend_url = env_var("FRONTEND_URL").unwrap_or_else(|| base_url.clone());

        let subscription_price_cents = env_parse("SUBSCRIPTION_PRICE_CENTS", 2999_i64)?;
        if subscription_price_cents <= 0 {
            bail!("SUBSCRIPTION_PRICE_CENTS must be positive");
        }

        Ok(Self {
            port: env_parse("PORT", 3000)?,
            data_dir: env_var("DENTALCARE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data")),
            base_url,
            frontend_url,
            jwt_secret,
            require_email_verification: env_bool("REQUIRE_EMAIL_VERIFICATION", true)?,
            subscription_price_cents,
            subscription_currency: env_var("SUBSCRIPTION_CURRENCY")
                .unwrap_or_else(|| "USD".into())
                .to_ascii_uppercase(),
            sweep_interval_secs: env_parse("SUBSCRIPTION_SWEEP_SECS", 3600)?,
            contact_inbox: env_var("CONTACT_INBOX").unwrap_or_else(|| "support@localhost".into()),
            contact_max_attachment_bytes: env_parse("CONTACT_MAX_ATTACHMENT_BYTES", 5 * 1024 * 1024)?,
            paypal: try_load_paypal(),
            stripe: try_load_stripe(),
        })
    }

    #[cfg(test)]
    pub fn for_tests(data_dir: &std::path::Path) -> Self {
        Self {
            port: 0,
            data_dir: data_dir.to_path_buf(),
            base_url: "http://localhost:3000".into(),
            frontend_url: "http://app.test".into(),
            jwt_secret: "test-secret".into(),
            require_email_verification: true,
            subscription_price_cents: 2999,
            subscription_currency: "USD".into(),
            sweep_interval_secs: 0,
            contact_inbox: "inbox@clinic.test".into(),
            contact_max_attachment_bytes: 1024,
            paypal: None,
            stripe: None,
        }
    }
}
