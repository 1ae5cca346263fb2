pub mod adapters;
mod app;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod fanout;
pub mod keys;
pub mod ports;
pub mod push;
pub mod schedule;
pub mod signing;
pub mod state;
#[cfg(test)]
mod test_support;
pub mod types;

pub use app::app;
pub use keys::{GeneratedKeys, generate_keys};

use std::net::SocketAddr;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ServeError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

pub async fn serve(config: config::AppConfig) -> Result<(), ServeError> {
    let addr = config.bind;
    let router = app(config)?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServeError::Bind { addr, source })?;
    info!("listening on http://{addr}");
    axum::serve(listener, router).await?;
    Ok(())
}
