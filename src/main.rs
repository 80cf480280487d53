#![allow(non_snake_case)]

use std::env;
use std::process::ExitCode;

use scheduleBot::config::{AppConfig, RunMode, Settings};
use scheduleBot::store::open_store;
use scheduleBot::{cli, logging, runtime};

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    let config = match env::var("CONFIG_FILE") {
        Ok(path) => match AppConfig::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("event=config_failed error=\"{}\"", e);
                return ExitCode::FAILURE;
            }
        },
        Err(_) => AppConfig::default(),
    };

    let settings = match Settings::resolve(&config) {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("event=config_invalid error=\"{}\"", e);
            return ExitCode::FAILURE;
        }
    };

    let store = match open_store(&settings.store) {
        Ok(store) => store,
        Err(e) => {
            log::error!("event=store_open_failed error=\"{}\"", e);
            return ExitCode::FAILURE;
        }
    };

    match settings.run_mode {
        RunMode::Api => {
            if let Err(e) = runtime::run_api(settings, store).await {
                log::error!("event=server_failed error=\"{}\"", e);
                return ExitCode::FAILURE;
            }
        }
        RunMode::Cli => {
            if let Err(e) = cli::cli(settings, store).await {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}
