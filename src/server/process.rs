use crate::error::{Error, Result};
use crate::port::SessionIdentity;
use crate::server::ServerBackend;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

/// Environment variable naming the DynamoDB Local install directory
pub const INSTALL_DIR_ENV: &str = "DYNAMODB_LOCAL_HOME";

/// Runs the DynamoDB Local jar as a child process.
///
/// The install directory must contain `DynamoDBLocal.jar` and `DynamoDBLocal_lib/`.
#[derive(Debug)]
pub struct LocalProcessBackend {
    install_dir: PathBuf,
    java: PathBuf,
    child: Option<Child>,
}

impl LocalProcessBackend {
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
            java: PathBuf::from("java"),
            child: None,
        }
    }

    /// Reads the install directory from `DYNAMODB_LOCAL_HOME`
    pub fn from_env() -> Result<Self> {
        std::env::var_os(INSTALL_DIR_ENV)
            .map(Self::new)
            .ok_or_else(|| Error::InvalidArgument(format!("{} is not set", INSTALL_DIR_ENV)))
    }

    /// Uses a specific java executable instead of the one on `PATH`
    pub fn with_java(mut self, java: impl Into<PathBuf>) -> Self {
        self.java = java.into();
        self
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Process id of the running server, if any
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    fn command(&self, port: u16) -> Command {
        let mut command = Command::new(&self.java);
        command
            .arg(format!(
                "-Djava.library.path={}",
                self.install_dir.join("DynamoDBLocal_lib").display()
            ))
            .arg("-jar")
            .arg(self.install_dir.join("DynamoDBLocal.jar"))
            .args(["-sharedDb", "-inMemory", "-port"])
            .arg(port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        command
    }
}

impl ServerBackend for LocalProcessBackend {
    fn name(&self) -> &str {
        "local-process"
    }

    fn launch(&mut self, identity: &SessionIdentity) -> Result<()> {
        if self.child.is_some() {
            return Ok(());
        }

        let child = self.command(identity.port()).spawn().map_err(|e| {
            Error::Backend(format!(
                "failed to spawn DynamoDB Local from {}: {}",
                self.install_dir.display(),
                e
            ))
        })?;

        log::debug!(
            "spawned DynamoDB Local for {} as pid {}",
            identity.id(),
            child.id()
        );
        self.child = Some(child);
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        // kill fails if the process already exited; reaping still applies
        if let Err(e) = child.kill() {
            log::debug!("kill of pid {} failed: {}", child.id(), e);
        }
        let status = child.wait()?;
        log::debug!("DynamoDB Local pid {} exited with {}", child.id(), status);
        Ok(())
    }
}

impl Drop for LocalProcessBackend {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::warn!("failed to stop DynamoDB Local: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line() {
        let backend = LocalProcessBackend::new("/opt/dynamodb-local");
        let command = backend.command(58123);

        assert_eq!(command.get_program(), "java");
        let args: Vec<String> = command
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "-Djava.library.path=/opt/dynamodb-local/DynamoDBLocal_lib",
                "-jar",
                "/opt/dynamodb-local/DynamoDBLocal.jar",
                "-sharedDb",
                "-inMemory",
                "-port",
                "58123",
            ]
        );
    }

    #[test]
    fn test_spawn_failure_is_backend_error() {
        let mut backend = LocalProcessBackend::new("/nonexistent")
            .with_java("/nonexistent/bin/java-does-not-exist");

        let err = backend
            .launch(&SessionIdentity::new("process-test", 58124))
            .unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
        assert!(backend.pid().is_none());
    }

    #[test]
    fn test_shutdown_without_launch() {
        let mut backend = LocalProcessBackend::new("/opt/dynamodb-local");
        assert!(backend.shutdown().is_ok());
        assert!(backend.shutdown().is_ok());
    }
}
