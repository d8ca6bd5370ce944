use anyhow::{Context, Result};
use dotenvy::dotenv;
use secrecy::Secret;
use serde::Deserialize;
use std::env;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub chapa: ChapaConfig,
    pub smtp: SmtpConfig,
    pub service_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub db_name: String,
}

/// Credentials and defaults for the Chapa payment provider.
#[derive(Deserialize, Clone, Debug)]
pub struct ChapaConfig {
    pub secret_key: Secret<String>,
    pub api_base_url: String,
    /// Currency applied to every payment (Chapa settles in ETB).
    pub currency: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct SmtpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Secret<String>,
    pub from_email: String,
    pub from_name: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env::var("STAYBOOK_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("STAYBOOK_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("STAYBOOK_PORT must be a valid port number")?;

        let db_url = env::var("MONGODB_URL").context("MONGODB_URL must be set")?;
        let db_name = env::var("DATABASE_NAME").unwrap_or_else(|_| "staybook".to_string());

        let chapa_secret = env::var("CHAPA_SECRET_KEY").context("CHAPA_SECRET_KEY must be set")?;
        let chapa_base_url =
            env::var("CHAPA_BASE_URL").unwrap_or_else(|_| "https://api.chapa.co/v1".to_string());
        let currency = env::var("CHAPA_CURRENCY").unwrap_or_else(|_| "ETB".to_string());

        let smtp_enabled = env::var("SMTP_ENABLED")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);
        let smtp_host = env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".to_string());
        let smtp_port = env::var("SMTP_PORT")
            .unwrap_or_else(|_| "587".to_string())
            .parse()
            .context("SMTP_PORT must be a valid port number")?;
        let smtp_user = env::var("SMTP_USER").unwrap_or_default();
        let smtp_password = env::var("SMTP_PASSWORD").unwrap_or_default();
        let from_email =
            env::var("SMTP_FROM_EMAIL").unwrap_or_else(|_| "noreply@staybook.app".to_string());
        let from_name = env::var("SMTP_FROM_NAME").unwrap_or_else(|_| "Staybook".to_string());

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: Secret::new(db_url),
                db_name,
            },
            chapa: ChapaConfig {
                secret_key: Secret::new(chapa_secret),
                api_base_url: chapa_base_url,
                currency,
            },
            smtp: SmtpConfig {
                enabled: smtp_enabled,
                host: smtp_host,
                port: smtp_port,
                user: smtp_user,
                password: Secret::new(smtp_password),
                from_email,
                from_name,
            },
            service_name: "staybook".to_string(),
        })
    }
}
