use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub gateway_api_url: String,
    pub gateway_private_key: String,
    pub gateway_integrity_key: String,
    pub currency: String,
    pub reconciler_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        Ok(Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            database_url: env::var("DATABASE_URL")?,
            gateway_api_url: env::var("GATEWAY_API_URL")?,
            gateway_private_key: env::var("GATEWAY_PRIVATE_KEY")?,
            // Only ever fed into the integrity signature, never sent on the wire.
            gateway_integrity_key: env::var("GATEWAY_INTEGRITY_KEY")?,
            currency: env::var("CHECKOUT_CURRENCY").unwrap_or_else(|_| "COP".to_string()),
            reconciler_interval_secs: env::var("RECONCILER_INTERVAL_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
        })
    }
}
