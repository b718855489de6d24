//! Configuration value objects
//!
//! Every knob of the test harness lives in one of three plain structs with sensible defaults and
//! builder-style setters, so a test suite can override one field without restating the rest:
//!
//! - [`ClientConfig`]: endpoint, placeholder credentials and region label for data-plane clients
//! - [`LifecycleConfig`]: readiness polling of the server lifecycle
//! - [`ProvisionConfig`]: throughput overrides and ACTIVE polling of the table provisioner

use crate::schema::Throughput;
use std::time::Duration;

/// Access key used for every client of a session. DynamoDB Local only uses it to name its
/// database file, so the value is irrelevant as long as it is identical across clients.
pub const DEFAULT_ACCESS_KEY: &str = "key";

/// Secret key paired with [`DEFAULT_ACCESS_KEY`]
pub const DEFAULT_SECRET_KEY: &str = "secret";

/// Region label. Cosmetic for a local endpoint.
pub const DEFAULT_REGION: &str = "us-west-2";

/// Delay between two canary requests while the server is starting
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_millis(100);

/// Delay between two status checks while a table is being created
pub const DEFAULT_ACTIVE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on status checks per created table
pub const DEFAULT_MAX_ACTIVE_POLLS: u32 = 600;

/// Settings for clients pointed at the local endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Endpoint URL, e.g. `http://localhost:58123`
    pub endpoint: String,

    /// Placeholder access key
    pub access_key: String,

    /// Placeholder secret key
    pub secret_key: String,

    /// Region label
    pub region: String,
}

impl ClientConfig {
    /// Configuration for a server listening on `localhost:<port>`
    pub fn local(port: u16) -> Self {
        Self {
            endpoint: local_endpoint(port),
            access_key: DEFAULT_ACCESS_KEY.to_string(),
            secret_key: DEFAULT_SECRET_KEY.to_string(),
            region: DEFAULT_REGION.to_string(),
        }
    }

    /// Overrides the endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Overrides the placeholder credentials
    pub fn with_credentials(
        mut self,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.access_key = access_key.into();
        self.secret_key = secret_key.into();
        self
    }

    /// Overrides the region label
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }
}

/// Returns the endpoint URL of a server listening on `localhost:<port>`
pub fn local_endpoint(port: u16) -> String {
    format!("http://localhost:{}", port)
}

/// Readiness polling settings for [`crate::server::ServerLifecycle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleConfig {
    /// Delay between canary attempts
    pub probe_interval: Duration,

    /// Maximum number of canary attempts. `None` polls until the server answers or the test
    /// harness times out.
    pub max_probe_attempts: Option<u32>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            probe_interval: DEFAULT_PROBE_INTERVAL,
            max_probe_attempts: None,
        }
    }
}

impl LifecycleConfig {
    /// Sets the delay between canary attempts
    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    /// Bounds the number of canary attempts
    pub fn with_max_probe_attempts(mut self, attempts: u32) -> Self {
        self.max_probe_attempts = Some(attempts);
        self
    }
}

/// Settings for [`crate::provision::TableProvisioner`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionConfig {
    /// Throughput forced onto every table and global secondary index. Local servers ignore it
    /// but the create-table API requires a value.
    pub throughput: Throughput,

    /// Delay between status checks while waiting for a table to become active
    pub active_poll_interval: Duration,

    /// Maximum number of status checks per table
    pub max_active_polls: u32,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            throughput: Throughput::MINIMAL,
            active_poll_interval: DEFAULT_ACTIVE_POLL_INTERVAL,
            max_active_polls: DEFAULT_MAX_ACTIVE_POLLS,
        }
    }
}

impl ProvisionConfig {
    /// Overrides the forced throughput
    pub fn with_throughput(mut self, throughput: Throughput) -> Self {
        self.throughput = throughput;
        self
    }

    /// Overrides the ACTIVE polling settings
    pub fn with_active_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.active_poll_interval = interval;
        self.max_active_polls = max_polls;
        self
    }
}
