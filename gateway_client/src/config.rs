use std::time::Duration;

use log::*;
use spg_common::Secret;

use crate::retry::RetryPolicy;

pub const DEFAULT_GATEWAY_URL: &str = "https://api.fastsoftbrasil.com/api/user";
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the processor API, without a trailing slash, e.g. `https://api.example.com/api/user`
    pub base_url: String,
    pub public_key: Secret<String>,
    pub secret_key: Secret<String>,
    /// Upper bound on each individual HTTP call
    pub timeout: Duration,
    /// Backoff policy applied to transaction creation
    pub retry: RetryPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GATEWAY_URL.to_string(),
            public_key: Secret::default(),
            secret_key: Secret::default(),
            timeout: DEFAULT_GATEWAY_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

impl GatewayConfig {
    pub fn new_from_env_or_default() -> Self {
        let base_url = std::env::var("SPG_GATEWAY_URL").unwrap_or_else(|_| {
            info!("🪛️ SPG_GATEWAY_URL not set, using {DEFAULT_GATEWAY_URL}");
            DEFAULT_GATEWAY_URL.to_string()
        });
        let base_url = base_url.trim_end_matches('/').to_string();
        let public_key = Secret::new(std::env::var("SPG_GATEWAY_PUBLIC_KEY").unwrap_or_else(|_| {
            warn!("🪛️ SPG_GATEWAY_PUBLIC_KEY not set. Gateway calls will fail authentication.");
            String::default()
        }));
        let secret_key = Secret::new(std::env::var("SPG_GATEWAY_SECRET_KEY").unwrap_or_else(|_| {
            warn!("🪛️ SPG_GATEWAY_SECRET_KEY not set. Gateway calls will fail authentication.");
            String::default()
        }));
        let timeout = std::env::var("SPG_GATEWAY_TIMEOUT")
            .ok()
            .and_then(|s| {
                s.parse::<u64>()
                    .map_err(|e| warn!("🪛️ Invalid value for SPG_GATEWAY_TIMEOUT ({s}). {e}. Using the default."))
                    .ok()
            })
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_GATEWAY_TIMEOUT);
        let max_attempts = std::env::var("SPG_GATEWAY_MAX_ATTEMPTS")
            .ok()
            .and_then(|s| {
                s.parse::<u32>()
                    .map_err(|e| warn!("🪛️ Invalid value for SPG_GATEWAY_MAX_ATTEMPTS ({s}). {e}. Using the default."))
                    .ok()
            })
            .filter(|n| *n > 0)
            .unwrap_or(RetryPolicy::default().max_attempts);
        let retry = RetryPolicy { max_attempts, ..RetryPolicy::default() };
        Self { base_url, public_key, secret_key, timeout, retry }
    }
}
