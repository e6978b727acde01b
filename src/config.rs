use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub payment: PaymentConfig,
}

/// Credentials and endpoints for the external payment provider.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub api_url: String,
    pub shop_id: String,
    pub secret_key: String,
    /// Base URL the customer is redirected to after confirming a payment;
    /// the order id is appended.
    pub return_url: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let payment = PaymentConfig::from_env()?;
        Ok(Self {
            port,
            database_url,
            host,
            payment,
        })
    }
}

impl PaymentConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let api_url = env::var("PAYMENT_API_URL")
            .unwrap_or_else(|_| "https://api.yookassa.ru/v3".to_string());
        let shop_id = env::var("PAYMENT_SHOP_ID")?;
        let secret_key = env::var("PAYMENT_SECRET_KEY")?;
        let return_url =
            env::var("PAYMENT_RETURN_URL").unwrap_or_else(|_| "http://localhost:3000/orders".to_string());
        Ok(Self {
            api_url,
            shop_id,
            secret_key,
            return_url,
        })
    }
}
