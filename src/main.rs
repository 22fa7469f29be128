use dotenv::dotenv;
use glitchvid::config::Config;
use glitchvid::server::{router, AppState};

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    let addr = format!("{}:{}", config.addr, config.port);

    let app = router(AppState::new(config));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind TCP listener");
    println!("Listening at {}", addr);
    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
