use crate::domain::PriceCatalog;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

pub const DEFAULT_APP_URL: &str = "https://testiflow.com";
pub const DEFAULT_STANDARD_PRICE_ID: &str = "price_1Rznb5Dn6VTzl81bjqFfCagv";
pub const DEFAULT_PREMIUM_PRICE_ID: &str = "price_1Rznb5Dn6VTzl81b8Hx5UQt6";
pub const DEFAULT_EMAIL_FROM: &str = "TestiFlow <info@testiflow.com>";

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub app_url: String,

    pub standard_price_id: String,
    pub premium_price_id: String,

    // Provider credentials; handlers that need a missing one answer 500.
    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub stripe_portal_configuration_id: Option<String>,
    pub resend_api_key: Option<String>,
    pub auth_url: Option<String>,
    pub auth_service_key: Option<String>,

    pub email_from: String,
    pub webhook_tolerance_secs: u64,
    pub cors_allowed_origin: Option<String>,
}

impl AppConfig {
    /// `config/default`, `config/local`, then `TESTIFLOW_*` variables
    /// (`__` separates nested keys).
    pub fn from_env() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("TESTIFLOW")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        Self::build(builder)
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let config = builder
            .set_default("server_host", "0.0.0.0")?
            .set_default("server_port", 8080)?
            .set_default("app_url", DEFAULT_APP_URL)?
            .set_default("standard_price_id", DEFAULT_STANDARD_PRICE_ID)?
            .set_default("premium_price_id", DEFAULT_PREMIUM_PRICE_ID)?
            .set_default("email_from", DEFAULT_EMAIL_FROM)?
            .set_default("webhook_tolerance_secs", 300)?
            .build()?;

        config.try_deserialize()
    }

    pub fn price_catalog(&self) -> PriceCatalog {
        PriceCatalog::new(&self.standard_price_id, &self.premium_price_id)
    }

    pub fn app_origin(&self) -> &str {
        self.app_url.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PlanTier;

    #[test]
    fn defaults_fill_everything_but_the_database() {
        let builder = Config::builder()
            .set_override("database_url", "postgres://localhost/testiflow")
            .unwrap();
        let config = AppConfig::build(builder).unwrap();

        assert_eq!(config.server_port, 8080);
        assert_eq!(config.app_url, DEFAULT_APP_URL);
        assert_eq!(config.webhook_tolerance_secs, 300);
        assert!(config.stripe_secret_key.is_none());
        assert_eq!(
            config.price_catalog().plan_for(DEFAULT_PREMIUM_PRICE_ID),
            Some(PlanTier::Premium)
        );
    }

    #[test]
    fn missing_database_url_is_an_error() {
        assert!(AppConfig::build(Config::builder()).is_err());
    }

    #[test]
    fn origin_drops_trailing_slash() {
        let builder = Config::builder()
            .set_override("database_url", "postgres://localhost/testiflow")
            .unwrap()
            .set_override("app_url", "http://localhost:5173/")
            .unwrap();
        let config = AppConfig::build(builder).unwrap();
        assert_eq!(config.app_origin(), "http://localhost:5173");
    }
}
