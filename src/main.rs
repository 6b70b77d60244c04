use std::process::ExitCode;

use async_std::task;
use log::error;

use webforge::config::{self, HttpConfig};
use webforge::net::server::Server;

const DEFAULT_CONFIG_PATH: &str = "webforge.toml";

fn main() -> ExitCode {
    env_logger::init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    // configuration errors are fatal: refuse to start rather than run with
    // ambiguous or unsafe routing
    let http_config = match HttpConfig::from_file(&path) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("{}: {}", path, err);
            return ExitCode::FAILURE;
        }
    };
    config::set_config(http_config);

    if let Err(err) = task::block_on(Server::run()) {
        error!("server failed: {}", err);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
