//! Metric names
//!
//! Metrics are emitted through the `metrics` facade and go nowhere unless the test binary installs
//! a recorder.

/// Counter: canary requests sent while waiting for a server
pub const PROBE_ATTEMPTS: &str = "dynamodb_testkit.lifecycle.probe";

/// Histogram: time from launch to a ready server
pub const STARTUP_TIME: &str = "dynamodb_testkit.lifecycle.startup";

/// Counter: tables created by the provisioner
pub const TABLES_PROVISIONED: &str = "dynamodb_testkit.provision.tables";
