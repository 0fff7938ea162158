use dotenvy::dotenv;
use salvo::prelude::*;
use tracing::{error, info};

use crate::config::{self, Config};
use crate::handlers;
use crate::state::AppState;
use crate::utils::init_tracing;

pub async fn run() {
    let env_file = dotenv();
    init_tracing(&config::log_level());
    info!("Starting users relay...");
    config::report_env_file(&env_file);

    let config = Config::load();
    let state = build_state_or_exit(config.clone());
    let listen_addr = config.listen_addr();

    let acceptor = match TcpListener::new(listen_addr.as_str()).try_bind().await {
        Ok(acceptor) => acceptor,
        Err(error) => {
            error!("Server failed to start on {listen_addr}: {error}");
            std::process::exit(1);
        }
    };

    info!(
        "{} listening on {} and forwarding to {}",
        config.service_name, listen_addr, config.upstream_url
    );
    Server::new(acceptor).serve(handlers::router(state)).await;
}

fn build_state_or_exit(config: Config) -> AppState {
    match AppState::new(config) {
        Ok(state) => state,
        Err(error) => {
            error!("Initialization Error: {error}");
            std::process::exit(1);
        }
    }
}
