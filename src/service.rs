//! Service lifecycle: directories, pipeline wiring and the HTTP listener.

use crate::api::{self, AppState};
use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::event::{create_event_channel, PipelineEvent, PipelineEventsChannel, PipelineEventsSender};
use crate::pipeline::{CommandRunner, Pipeline, TokioRunner};
use crate::store::VerificationStore;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

/// Builder for constructing the service.
pub struct ServiceBuilder {
    config: ServiceConfig,
    runner: Arc<dyn CommandRunner>,
}

impl ServiceBuilder {
    /// Create a new builder with the given configuration.
    #[must_use]
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            runner: Arc::new(TokioRunner::new()),
        }
    }

    /// Use a different command runner.
    #[must_use]
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Prepare directories, wire the pipeline and bind the listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, a directory cannot
    /// be created, or the address cannot be bound.
    pub async fn build(self) -> Result<RunningService> {
        info!("Building dkim-verify with config: {:?}", self.config);
        self.config.validate()?;

        // Ensure working directories exist
        for dir in [
            &self.config.pipeline.staging_dir,
            &self.config.pipeline.build_dir,
            &self.config.pipeline.project_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }

        if self.config.prover.private_key.is_none() {
            warn!(
                "SP1_PRIVATE_KEY is not set; the prover will rely on its own environment (mode={})",
                self.config.prover.mode
            );
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (events_tx, events_rx) = create_event_channel();

        let store = VerificationStore::new();
        let pipeline = Arc::new(Pipeline::new(
            &self.config,
            self.runner,
            store.clone(),
            events_tx.clone(),
        ));
        let router = api::router(
            AppState::new(Arc::clone(&pipeline)),
            self.config.server.max_upload_bytes,
        );

        let address = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = TcpListener::bind(&address).await?;
        let local_addr = listener.local_addr()?;

        Ok(RunningService {
            local_addr,
            listener: Some(listener),
            router,
            store,
            shutdown_tx,
            shutdown_rx,
            events_tx,
            events_rx: Some(events_rx),
        })
    }
}

/// A bound, ready-to-serve service.
pub struct RunningService {
    local_addr: SocketAddr,
    listener: Option<TcpListener>,
    router: Router,
    store: VerificationStore,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    events_tx: PipelineEventsSender,
    events_rx: Option<PipelineEventsChannel>,
}

impl RunningService {
    /// Address the listener is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Process-wide result store.
    #[must_use]
    pub fn store(&self) -> &VerificationStore {
        &self.store
    }

    /// Get a receiver for pipeline events.
    ///
    /// Note: Can only be called once. Subsequent calls return None.
    pub fn events(&mut self) -> Option<PipelineEventsChannel> {
        self.events_rx.take()
    }

    /// Serve requests until shutdown is requested or Ctrl-C is received.
    ///
    /// # Errors
    ///
    /// Returns an error if the server was already run or fails while serving.
    pub async fn run(&mut self) -> Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| Error::Server("service has already been run".to_string()))?;

        info!("Server running on {}", self.local_addr);
        let _ = self.events_tx.send(PipelineEvent::Started);

        let mut shutdown_rx = self.shutdown_rx.clone();
        let shutdown_tx = self.shutdown_tx.clone();
        let shutdown = async move {
            tokio::select! {
                () = wait_for_shutdown(&mut shutdown_rx) => {
                    info!("Shutdown signal received");
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl-C received, initiating shutdown");
                    let _ = shutdown_tx.send(true);
                }
            }
        };

        axum::serve(listener, self.router.clone())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| Error::Server(e.to_string()))?;

        let _ = self.events_tx.send(PipelineEvent::ShuttingDown);
        info!("Service shutdown complete");
        Ok(())
    }

    /// Request the service to shut down.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Sender that triggers shutdown from another task.
    #[must_use]
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown_tx.clone()
    }
}

async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    // A dropped sender also ends the wait.
    let _ = rx.wait_for(|stop| *stop).await;
}
