#[cfg(feature = "http_api")]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use care_route::{AssignmentStore, EngineConfig, MemoryStore, http_api};

    env_logger::init();
    let config = EngineConfig::from_env()?;
    let addr: SocketAddr = config.http_addr.parse()?;

    let store: Arc<dyn AssignmentStore> = match config.db_path.as_ref() {
        #[cfg(feature = "sqlite")]
        Some(path) => {
            log::info!("using sqlite store at {}", path.display());
            Arc::new(care_route::SqliteStore::new(path)?)
        }
        #[cfg(not(feature = "sqlite"))]
        Some(path) => {
            log::warn!(
                "ignoring database path {}; built without the `sqlite` feature",
                path.display()
            );
            Arc::new(MemoryStore::new())
        }
        None => Arc::new(MemoryStore::new()),
    };

    println!("care-route HTTP API listening on http://{addr}");
    let state = http_api::AppState::with_config(store, &config);
    http_api::serve(addr, state).await?;
    Ok(())
}

#[cfg(not(feature = "http_api"))]
fn main() {
    eprintln!("Rebuild with the `http_api` feature to enable the HTTP server.");
}
