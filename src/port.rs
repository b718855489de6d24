//! Per-process port and name allocation
//!
//! Concurrent test processes on one host each need their own server. Both the port and the
//! container name are derived from the process id, which keeps them stable for the whole test
//! session without any coordination between processes. Two processes whose ids are equal modulo
//! [`PORT_WINDOW`] still collide; that rare flake is accepted.

/// First port of the allocation window
pub const PORT_BASE: u16 = 58000;

/// Number of ports in the allocation window
pub const PORT_WINDOW: u32 = 1000;

/// Prefix of the server name derived from the process id
pub const SESSION_ID_PREFIX: &str = "docker-dynamodb-local";

/// Picks the port for the current process
pub fn pick_port() -> u16 {
    port_for_pid(std::process::id())
}

/// Maps a process id into the allocation window
pub fn port_for_pid(pid: u32) -> u16 {
    // Always < PORT_WINDOW, so the sum stays within u16.
    PORT_BASE + (pid % PORT_WINDOW) as u16
}

/// Returns the server name for a process id
pub fn session_id_for_pid(pid: u32) -> String {
    format!("{}-{}", SESSION_ID_PREFIX, pid)
}

/// Identity of one test session's server: a unique name and the host port it binds
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionIdentity {
    id: String,
    port: u16,
}

impl SessionIdentity {
    /// Creates an explicit identity
    pub fn new(id: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            port,
        }
    }

    /// Identity derived from the current process id
    pub fn current() -> Self {
        Self::for_pid(std::process::id())
    }

    /// Identity derived from the given process id
    pub fn for_pid(pid: u32) -> Self {
        Self::new(session_id_for_pid(pid), port_for_pid(pid))
    }

    /// The server name
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The host port
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Default for SessionIdentity {
    fn default() -> Self {
        Self::current()
    }
}
