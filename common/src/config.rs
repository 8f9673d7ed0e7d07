use serde::Deserialize;
use std::{error::Error, fs};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CommonConfig {
    pub project_name: String,
    pub database_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    pub server_address: String,
    pub log_level: String,
    /// Origin allowed by CORS. `*` allows any origin.
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            server_address: "0.0.0.0:5000".to_string(),
            log_level: "info".to_string(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_hours: default_token_ttl_hours(),
            bcrypt_cost: default_bcrypt_cost(),
        }
    }
}

fn default_token_ttl_hours() -> i64 {
    24 * 7
}

fn default_bcrypt_cost() -> u32 {
    12
}

/// Pricing knobs used when a cart is quoted or checked out.
#[derive(Debug, Deserialize, Clone)]
pub struct CheckoutConfig {
    pub tax_rate: f64,
    pub free_shipping_threshold: f64,
    pub shipping_cost: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            tax_rate: 0.16,
            free_shipping_threshold: 500.0,
            shipping_cost: 50.0,
            currency: default_currency(),
        }
    }
}

fn default_currency() -> String {
    "MXN".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrackingConfig {
    pub channel_capacity: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self { channel_capacity: 64 }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportsConfig {
    pub low_stock_threshold: i32,
    pub default_range_days: i64,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            low_stock_threshold: 10,
            default_range_days: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    pub common: CommonConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub checkout: CheckoutConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub reports: ReportsConfig,
}

impl Config {
    pub fn load(config_path: &str) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let contents = fs::read_to_string(config_path)?;
        let mut config = Self::from_yaml(&contents)?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, Box<dyn Error + Send + Sync>> {
        Ok(serde_yml::from_str(contents)?)
    }

    /// `DATABASE_URL` and `JWT_SECRET` from the process environment (or a
    /// `.env` file) take precedence over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!(error = %e, "No .env file loaded");
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.common.database_url = url;
        }
        if let Ok(secret) = std::env::var("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
    }

    pub fn validate(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        if self.auth.jwt_secret.trim().is_empty() {
            return Err("auth.jwt_secret must be set".into());
        }
        if !(0.0..1.0).contains(&self.checkout.tax_rate) {
            return Err(format!("checkout.tax_rate out of range: {}", self.checkout.tax_rate).into());
        }
        if self.tracking.channel_capacity == 0 {
            return Err("tracking.channel_capacity must be positive".into());
        }
        Ok(())
    }
}
