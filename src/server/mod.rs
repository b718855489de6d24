//! Local server lifecycle
//!
//! [`ServerLifecycle`] drives a [`ServerBackend`] through
//! `Idle → Starting → Ready → Stopping → Stopped`, with `Failed` reachable from `Starting`.
//! Starting launches the backend, builds a client through a [`ClientFactory`] and polls the
//! canary probe until the server answers. Stopping is best-effort and never fails, so teardown
//! after a partial startup cannot hide the original test failure.
//!
//! Backends:
//!
//! - [`crate::client::InMemoryDynamoDb`]: in-process emulator
//! - [`DockerBackend`]: `amazon/dynamodb-local` through testcontainers (feature `docker`)
//! - [`LocalProcessBackend`]: DynamoDB Local jar as a child process

#[cfg(feature = "docker")]
mod docker;
pub mod probe;
mod process;

#[cfg(feature = "docker")]
pub use docker::{DockerBackend, DynamoDbLocalArgs, DynamoDbLocalImage};
pub use process::LocalProcessBackend;

use crate::client::{ClientFactory, DynamoDbApi};
use crate::config::LifecycleConfig;
use crate::error::{Error, Result};
use crate::metrics::STARTUP_TIME;
use crate::port::SessionIdentity;
use metrics::histogram;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Starts and stops the process or container serving DynamoDB requests
pub trait ServerBackend {
    /// Short description used in logs
    fn name(&self) -> &str;

    /// Launches the server bound to the identity's port under the identity's name.
    /// Launching an already running backend is a no-op.
    fn launch(&mut self, identity: &SessionIdentity) -> Result<()>;

    /// Stops and removes the server. Must succeed when nothing was launched.
    fn shutdown(&mut self) -> Result<()>;
}

/// Lifecycle state of a local server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Not started
    Idle,
    /// Launched, waiting for the canary probe
    Starting,
    /// Answering requests
    Ready,
    /// Shutting down
    Stopping,
    /// Shut down
    Stopped,
    /// Startup could not be confirmed
    Failed,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerState::Idle => "IDLE",
            ServerState::Starting => "STARTING",
            ServerState::Ready => "READY",
            ServerState::Stopping => "STOPPING",
            ServerState::Stopped => "STOPPED",
            ServerState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Snapshot of a server's identity and state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHandle {
    /// Unique server name
    pub id: String,

    /// Host port
    pub port: u16,

    /// Lifecycle state
    pub state: ServerState,
}

/// Lifecycle of one local DynamoDB server, owned by a test session
pub struct ServerLifecycle<B: ServerBackend> {
    identity: SessionIdentity,
    backend: B,
    factory: Arc<dyn ClientFactory>,
    config: LifecycleConfig,
    state: ServerState,
    client: Option<Arc<dyn DynamoDbApi>>,
}

impl<B: ServerBackend> fmt::Debug for ServerLifecycle<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerLifecycle")
            .field("identity", &self.identity)
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .field("state", &self.state)
            .finish()
    }
}

impl<B: ServerBackend> ServerLifecycle<B> {
    /// Creates an idle lifecycle
    pub fn new(identity: SessionIdentity, backend: B, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            identity,
            backend,
            factory,
            config: LifecycleConfig::default(),
            state: ServerState::Idle,
            client: None,
        }
    }

    /// Sets the readiness polling configuration
    pub fn with_config(mut self, config: LifecycleConfig) -> Self {
        self.config = config;
        self
    }

    /// Current state
    pub fn state(&self) -> ServerState {
        self.state
    }

    /// The session identity
    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    /// Identity and state snapshot
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            id: self.identity.id().to_string(),
            port: self.identity.port(),
            state: self.state,
        }
    }

    /// The backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The client that passed the readiness probe. Fails unless the server is ready.
    pub fn client(&self) -> Result<Arc<dyn DynamoDbApi>> {
        match (&self.client, self.state) {
            (Some(client), ServerState::Ready) => Ok(Arc::clone(client)),
            (_, state) => Err(Error::NotReady(format!(
                "server {} is {}",
                self.identity.id(),
                state
            ))),
        }
    }

    /// Launches the server and waits until it answers the canary probe.
    ///
    /// Calling `start` on a ready server does nothing. A failed startup leaves the lifecycle in
    /// `Failed` until [`stop`](Self::stop) is called.
    pub async fn start(&mut self) -> Result<()> {
        match self.state {
            ServerState::Ready => {
                log::debug!("server {} already running", self.identity.id());
                return Ok(());
            }
            ServerState::Failed => {
                return Err(Error::Startup(format!(
                    "server {} failed to start; stop it before starting again",
                    self.identity.id()
                )));
            }
            ServerState::Idle
            | ServerState::Starting
            | ServerState::Stopping
            | ServerState::Stopped => {}
        }

        log::info!(
            "starting {} DynamoDB server {} on port {}",
            self.backend.name(),
            self.identity.id(),
            self.identity.port()
        );
        self.state = ServerState::Starting;
        let started = Instant::now();

        match self.bring_up().await {
            Ok(client) => {
                self.client = Some(client);
                self.state = ServerState::Ready;
                histogram!(STARTUP_TIME, started.elapsed());
                log::info!(
                    "DynamoDB server {} ready after {:?}",
                    self.identity.id(),
                    started.elapsed()
                );
                Ok(())
            }
            Err(err) => {
                self.state = ServerState::Failed;
                if let Err(shutdown_err) = self.backend.shutdown() {
                    log::warn!(
                        "cleanup of server {} after failed startup failed: {}",
                        self.identity.id(),
                        shutdown_err
                    );
                }
                match err {
                    Error::Startup(_) => Err(err),
                    other => Err(Error::Startup(format!(
                        "server {}: {}",
                        self.identity.id(),
                        other
                    ))),
                }
            }
        }
    }

    async fn bring_up(&mut self) -> Result<Arc<dyn DynamoDbApi>> {
        self.backend.launch(&self.identity)?;
        let client = self.factory.connect(&self.identity).await?;
        let attempts = probe::wait_until_ready(client.as_ref(), &self.config).await?;
        log::debug!(
            "server {} answered the canary after {} attempt(s)",
            self.identity.id(),
            attempts
        );
        Ok(client)
    }

    /// Stops the server. Never fails: backend errors are logged and dropped. Stopping a server
    /// that was never started does nothing.
    pub fn stop(&mut self) {
        match self.state {
            ServerState::Idle | ServerState::Stopped => return,
            ServerState::Starting
            | ServerState::Ready
            | ServerState::Stopping
            | ServerState::Failed => {}
        }

        self.state = ServerState::Stopping;
        self.client = None;

        match self.backend.shutdown() {
            Ok(()) => log::info!("stopped DynamoDB server {}", self.identity.id()),
            Err(err) => log::warn!(
                "failed to stop DynamoDB server {}: {}",
                self.identity.id(),
                err
            ),
        }

        self.state = ServerState::Stopped;
    }
}

impl<B: ServerBackend> Drop for ServerLifecycle<B> {
    fn drop(&mut self) {
        self.stop();
    }
}
