use config::{Config, ConfigError, Environment};
use dotenv::dotenv;
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub jwt_secret: String,
    /// Secret key sent as a Bearer header on every gateway call.
    pub gateway_secret_key: String,
    pub gateway_base_url: String,
    /// Public base URL of this service, used to build the gateway callback URL.
    pub public_base_url: String,
    /// Flat fee charged for publishing any listing, in minor currency units.
    pub base_listing_fee_minor: i64,
    /// Per-day promotion fee for already-published listings, in minor units.
    pub daily_promotion_fee_minor: i64,
    /// Cap applied to each result set on list/search/home endpoints.
    pub page_size: i64,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenv().ok(); // Load .env file if present

        Config::builder()
            .set_default("port", 8000_i64)?
            .set_default("gateway_base_url", "https://api.paystack.co")?
            .set_default("public_base_url", "http://localhost:8000")?
            .set_default("base_listing_fee_minor", 100_000_i64)?
            .set_default("daily_promotion_fee_minor", 5_000_i64)?
            .set_default("page_size", 20_i64)?
            .add_source(Environment::default())
            .build()?
            .try_deserialize()
    }

    pub fn payment_callback_url(&self) -> String {
        format!(
            "{}/api/payments/verify",
            self.public_base_url.trim_end_matches('/')
        )
    }
}
