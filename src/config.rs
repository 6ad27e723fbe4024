use std::env;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
}

/// Everything the bootstrap run needs, pulled from the environment once at
/// startup. Credentials are never hardcoded; `.env` is supported via dotenv.
#[derive(Debug, Clone)]
pub struct Config {
    pub uri: String,
    pub admin_username: String,
    pub admin_password: String,
    pub target_db: String,
    pub app_username: String,
    pub app_password: String,
    pub collection: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Config {
            uri: required("MONGODB_URI")?,
            admin_username: required("MONGODB_ADMIN_USERNAME")?,
            admin_password: required("MONGODB_ADMIN_PASSWORD")?,
            target_db: required("MONGODB_NAME")?,
            app_username: required("MONGODB_APP_USERNAME")?,
            app_password: required("MONGODB_APP_PASSWORD")?,
            collection: required("MONGODB_COLLECTION")?,
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}
