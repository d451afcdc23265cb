use holdem_house_server::config::ServerConfig;
use holdem_house_server::store::RoomStore;
use holdem_house_server::{init_tracing, ws};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = ServerConfig::from_env()?;
    let store = RoomStore::new(config.table.clone());
    let app = ws::router(store);

    info!("服务器正在监听 {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
