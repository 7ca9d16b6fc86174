use dotenv::dotenv;
use once_cell::sync::Lazy;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub struct Config {
    pub port: u16,
    pub log_level: String,
    pub jwt_secret: String,
    pub chain_api_host: String,
    pub chain_api_timeout: Duration,
    /// Zero disables the background expiry sweep.
    pub sweep_interval: Duration,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("jwt_secret", &"<redacted>")
            .field("chain_api_host", &self.chain_api_host)
            .field("chain_api_timeout", &self.chain_api_timeout)
            .field("sweep_interval", &self.sweep_interval)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

fn parsed<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    fn from_env() -> Self {
        dotenv().ok();

        Self {
            port: parsed("PORT", 3000),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| "secret".to_string()), // Use a secure secret in production
            chain_api_host: env::var("CHAIN_API_HOST").unwrap_or_else(|_| "http://localhost:3001".to_string()),
            chain_api_timeout: Duration::from_secs(parsed("CHAIN_API_TIMEOUT_SECS", 30)),
            sweep_interval: Duration::from_secs(parsed("SWEEP_INTERVAL_SECS", 0)),
            request_timeout: Duration::from_secs(parsed("REQUEST_TIMEOUT_SECS", 60)),
        }
    }
}

pub static CONFIG: Lazy<Config> = Lazy::new(Config::from_env);
