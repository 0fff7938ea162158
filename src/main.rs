mod app;
mod config;
mod constants;
mod errors;
mod handlers;
mod state;
mod upstream;
mod utils;

#[tokio::main]
async fn main() {
    app::run().await;
}
