//! Thin HTTP surface (§10.5): `ApiService` wraps `axum::serve` with a
//! graceful-shutdown channel.

pub mod error;
pub mod routes;

use crate::services::Service;
use crate::status::ServiceStatus;
use routes::ApiState;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, trace};

pub use routes::create_router;

pub struct ApiService {
    port: u16,
    state: ApiState,
    shutdown_tx: Option<broadcast::Sender<()>>,
}

impl ApiService {
    pub fn new(port: u16, state: ApiState) -> Self {
        Self {
            port,
            state,
            shutdown_tx: None,
        }
    }
}

#[async_trait::async_trait]
impl Service for ApiService {
    fn name(&self) -> &'static str {
        "api"
    }

    async fn run(&mut self) -> Result<(), anyhow::Error> {
        let app = create_router(self.state.clone());
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr).await?;

        self.state.service_statuses.set("api", ServiceStatus::Active);
        info!(service = "api", address = %addr, "api server listening");

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        self.shutdown_tx = Some(shutdown_tx);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                trace!(service = "api", "graceful shutdown signal received");
            })
            .await?;

        info!(service = "api", "api server stopped");
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), anyhow::Error> {
        self.state.service_statuses.set("api", ServiceStatus::Disabled);
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        Ok(())
    }
}
