mod bootstrap;
mod config;
mod db;
mod models;

use dotenv::dotenv;
use std::process::ExitCode;

use crate::config::Config;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok(); // Load .env file
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("configuration error: {}", e);
            return ExitCode::from(2);
        }
    };

    match bootstrap::run(&config).await {
        Ok(()) => {
            log::info!("bootstrap complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("bootstrap failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
