use std::{env, fmt::Display, str::FromStr, time::Duration};

use gateway_client::GatewayConfig;
use log::*;
use spg_common::{helpers::env_flag, Secret};
use storefront_payment_engine::CheckoutOptions;

use crate::{errors::ServerError, reconciliation_worker::ReconciliationConfig};

const DEFAULT_SPG_HOST: &str = "127.0.0.1";
const DEFAULT_SPG_PORT: u16 = 8460;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/storefront.db";
pub const DEFAULT_WEBHOOK_SIGNATURE_HEADER: &str = "X-Webhook-Signature";
pub const DEFAULT_ADMIN_SIGNATURE_HEADER: &str = "X-Admin-Signature";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address, rather than the connection's
    /// remote address.
    pub use_forwarded: bool,
    pub webhook: WebhookConfig,
    pub admin: AdminConfig,
    pub gateway: GatewayConfig,
    pub checkout: CheckoutOptions,
    pub reconciliation: ReconciliationConfig,
    /// Signs the opaque card tokens handed to the processor
    pub card_token_key: Secret<String>,
}

#[derive(Clone, Debug)]
pub struct WebhookConfig {
    pub hmac_secret: Secret<String>,
    /// If false, webhook signatures are not checked at all. Only ever disable this for local testing.
    pub hmac_checks: bool,
    pub signature_header: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            hmac_secret: Secret::default(),
            hmac_checks: true,
            signature_header: DEFAULT_WEBHOOK_SIGNATURE_HEADER.to_string(),
        }
    }
}

/// Refunds and reconciliation controls live under `/admin` and need a signature made with this secret. With no secret
/// configured the admin routes are not mounted at all.
#[derive(Clone, Debug)]
pub struct AdminConfig {
    pub hmac_secret: Secret<String>,
    pub signature_header: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self { hmac_secret: Secret::default(), signature_header: DEFAULT_ADMIN_SIGNATURE_HEADER.to_string() }
    }
}

impl AdminConfig {
    pub fn from_env_or_default() -> Self {
        let hmac_secret = env::var("SPG_ADMIN_HMAC_SECRET").ok().filter(|s| !s.trim().is_empty()).unwrap_or_else(|| {
            warn!("🪛️ SPG_ADMIN_HMAC_SECRET is not set. Refund and reconciliation routes are disabled.");
            String::default()
        });
        Self { hmac_secret: Secret::new(hmac_secret), ..Default::default() }
    }

    pub fn is_enabled(&self) -> bool {
        !self.hmac_secret.reveal().is_empty()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SPG_HOST.to_string(),
            port: DEFAULT_SPG_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            use_x_forwarded_for: false,
            use_forwarded: false,
            webhook: WebhookConfig::default(),
            admin: AdminConfig::default(),
            gateway: GatewayConfig::default(),
            checkout: CheckoutOptions::default(),
            reconciliation: ReconciliationConfig::default(),
            card_token_key: Secret::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("SPG_HOST").ok().unwrap_or_else(|| DEFAULT_SPG_HOST.into());
        let port = parse_env("SPG_PORT", DEFAULT_SPG_PORT);
        let database_url = env::var("SPG_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ SPG_DATABASE_URL is not set. Using {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let use_x_forwarded_for = env_flag("SPG_USE_X_FORWARDED_FOR", false);
        let use_forwarded = env_flag("SPG_USE_FORWARDED", false);
        let card_token_key = env::var("SPG_CARD_TOKEN_KEY").ok().filter(|s| !s.is_empty()).unwrap_or_else(|| {
            error!("🪛️ SPG_CARD_TOKEN_KEY is not set. The server will refuse to start without it.");
            String::default()
        });
        Self {
            host,
            port,
            database_url,
            use_x_forwarded_for,
            use_forwarded,
            webhook: WebhookConfig::from_env_or_default(),
            admin: AdminConfig::from_env_or_default(),
            gateway: GatewayConfig::new_from_env_or_default(),
            checkout: checkout_options_from_env(),
            reconciliation: reconciliation_config_from_env(),
            card_token_key: Secret::new(card_token_key),
        }
    }

    /// Refuses configurations that would let anyone forge card tokens or webhook deliveries.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.card_token_key.reveal().is_empty() {
            return Err(ServerError::ConfigurationError("SPG_CARD_TOKEN_KEY must be set".into()));
        }
        if self.webhook.hmac_checks && self.webhook.hmac_secret.reveal().is_empty() {
            return Err(ServerError::ConfigurationError(
                "SPG_WEBHOOK_HMAC_SECRET must be set while webhook signature checks are enabled".into(),
            ));
        }
        Ok(())
    }
}

impl WebhookConfig {
    pub fn from_env_or_default() -> Self {
        let hmac_secret = env::var("SPG_WEBHOOK_HMAC_SECRET").ok().filter(|s| !s.trim().is_empty()).unwrap_or_else(|| {
            error!(
                "🪛️ SPG_WEBHOOK_HMAC_SECRET is not set. Please set it to the webhook signing secret shared with the \
                 payment processor."
            );
            String::default()
        });
        let hmac_checks = env_flag("SPG_WEBHOOK_HMAC_CHECKS", true);
        if !hmac_checks {
            warn!("🚨️ Webhook signature checks are DISABLED. Anyone can change order statuses on this server.");
        }
        Self { hmac_secret: Secret::new(hmac_secret), hmac_checks, ..Default::default() }
    }
}

//-------------------------------------------------  ServerOptions  ----------------------------------------------------
/// The part of the configuration that request handlers need. Secrets are kept out of it so that it can be shared as app
/// data.
#[derive(Clone, Copy, Debug, Default)]
pub struct ServerOptions {
    pub use_x_forwarded_for: bool,
    pub use_forwarded: bool,
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self { use_x_forwarded_for: config.use_x_forwarded_for, use_forwarded: config.use_forwarded }
    }
}

fn checkout_options_from_env() -> CheckoutOptions {
    let defaults = CheckoutOptions::default();
    let postback_url = env::var("SPG_POSTBACK_URL").ok().filter(|s| !s.trim().is_empty());
    if postback_url.is_none() {
        info!("🪛️ SPG_POSTBACK_URL is not set. The processor will use the webhook URL configured on its dashboard.");
    }
    let max_installments = parse_env("SPG_MAX_INSTALLMENTS", defaults.max_installments);
    let max_installments = if (1..=12).contains(&max_installments) {
        max_installments
    } else {
        warn!("🪛️ SPG_MAX_INSTALLMENTS must be between 1 and 12. Using {}.", defaults.max_installments);
        defaults.max_installments
    };
    CheckoutOptions {
        pix_expiry_days: parse_env("SPG_PIX_EXPIRY_DAYS", defaults.pix_expiry_days),
        boleto_expiry_days: parse_env("SPG_BOLETO_EXPIRY_DAYS", defaults.boleto_expiry_days),
        max_installments,
        annual_interest_rate: parse_env("SPG_INTEREST_RATE", defaults.annual_interest_rate),
        postback_url,
    }
}

fn reconciliation_config_from_env() -> ReconciliationConfig {
    let defaults = ReconciliationConfig::default();
    let poll_interval = parse_env("SPG_POLL_INTERVAL", defaults.poll_interval.as_secs());
    let scan_interval = parse_env("SPG_SCAN_INTERVAL", defaults.scan_interval.as_secs());
    let max_attempts = parse_env("SPG_MAX_POLL_ATTEMPTS", defaults.max_attempts);
    ReconciliationConfig {
        poll_interval: Duration::from_secs(poll_interval.max(1)),
        scan_interval: Duration::from_secs(scan_interval.max(1)),
        max_attempts: max_attempts.max(1),
    }
}

/// Reads and parses an environment variable, falling back to `default` (with a warning) if the value is invalid.
fn parse_env<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(name) {
        Ok(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            warn!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => {
            debug!("🪛️ {name} is not set. Using the default, {default}.");
            default
        },
    }
}
