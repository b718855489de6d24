//! Canary readiness probe
//!
//! DynamoDB-compatible servers often accept TCP connections before they can serve requests, so
//! readiness is checked with a real request: deleting a table that does not exist. A server that
//! answers at all, even with an error, is ready.

use crate::client::DynamoDbApi;
use crate::config::LifecycleConfig;
use crate::error::{Error, Result};
use crate::metrics::PROBE_ATTEMPTS;
use metrics::counter;

/// Table deleted by the canary request
pub const CANARY_TABLE: &str = "not a table";

/// Classification of one canary attempt
#[derive(Debug)]
pub enum ProbeOutcome {
    /// The server answered meaningfully
    Ready,
    /// The server is not accepting requests yet
    NotReady(String),
    /// The server misbehaved; retrying will not help
    Fatal(Error),
}

/// Classifies the result of a canary request
pub fn classify(result: Result<()>) -> ProbeOutcome {
    match result {
        // The canary table may exist if a test created it; an answer is still an answer.
        Ok(()) => ProbeOutcome::Ready,
        Err(Error::Service { .. }) | Err(Error::ConditionFailed(_)) => ProbeOutcome::Ready,
        Err(Error::Transport(reason)) => ProbeOutcome::NotReady(reason),
        Err(other) => ProbeOutcome::Fatal(other),
    }
}

/// Sends one canary request and classifies the answer
pub async fn probe_once(client: &dyn DynamoDbApi) -> ProbeOutcome {
    classify(client.delete_table(CANARY_TABLE).await)
}

/// Polls the server until it answers the canary request.
///
/// Only [`ProbeOutcome::NotReady`] is retried, after `config.probe_interval`. Returns the number
/// of attempts it took.
pub async fn wait_until_ready(client: &dyn DynamoDbApi, config: &LifecycleConfig) -> Result<u32> {
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        counter!(PROBE_ATTEMPTS, 1);

        match probe_once(client).await {
            ProbeOutcome::Ready => return Ok(attempts),
            ProbeOutcome::NotReady(reason) => {
                if let Some(max_attempts) = config.max_probe_attempts {
                    if attempts >= max_attempts {
                        return Err(Error::Startup(format!(
                            "server not ready after {} attempts: {}",
                            attempts, reason
                        )));
                    }
                }

                log::debug!("server not ready (attempt {}): {}", attempts, reason);
                tokio::time::sleep(config.probe_interval).await;
            }
            ProbeOutcome::Fatal(err) => {
                return Err(Error::Startup(format!("readiness probe failed: {}", err)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ReadConsistency, TableStatus};
    use crate::condition::Condition;
    use crate::item::Item;
    use crate::schema::CreateTableRequest;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Answers canary requests from a script, then with `ResourceNotFoundException`
    struct ScriptedServer {
        script: Mutex<Vec<Error>>,
        deletes: Mutex<u32>,
    }

    impl ScriptedServer {
        fn new(mut script: Vec<Error>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                deletes: Mutex::new(0),
            }
        }

        fn deletes(&self) -> u32 {
            *self.deletes.lock().unwrap()
        }
    }

    #[async_trait]
    impl DynamoDbApi for ScriptedServer {
        async fn list_tables(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        async fn create_table(&self, _request: &CreateTableRequest) -> Result<()> {
            Ok(())
        }

        async fn describe_table_status(&self, _table_name: &str) -> Result<TableStatus> {
            Ok(TableStatus::Active)
        }

        async fn delete_table(&self, _table_name: &str) -> Result<()> {
            *self.deletes.lock().unwrap() += 1;
            match self.script.lock().unwrap().pop() {
                Some(err) => Err(err),
                None => Err(Error::service("ResourceNotFoundException", "no such table")),
            }
        }

        async fn put_item(&self, _: &str, _: Item, _: Option<&Condition>) -> Result<()> {
            Ok(())
        }

        async fn get_item(&self, _: &str, _: Item, _: ReadConsistency) -> Result<Option<Item>> {
            Ok(None)
        }

        async fn delete_item(&self, _: &str, _: Item, _: Option<&Condition>) -> Result<()> {
            Ok(())
        }
    }

    fn fast() -> LifecycleConfig {
        LifecycleConfig::default().with_probe_interval(Duration::from_millis(1))
    }

    #[test]
    fn test_classify() {
        assert!(matches!(classify(Ok(())), ProbeOutcome::Ready));
        assert!(matches!(
            classify(Err(Error::service("ResourceNotFoundException", "x"))),
            ProbeOutcome::Ready
        ));
        assert!(matches!(
            classify(Err(Error::Transport("refused".into()))),
            ProbeOutcome::NotReady(_)
        ));
        assert!(matches!(
            classify(Err(Error::Internal("construction failure".into()))),
            ProbeOutcome::Fatal(_)
        ));
    }

    #[tokio::test]
    async fn test_retries_transport_errors() {
        let server = ScriptedServer::new(vec![
            Error::Transport("connection refused".into()),
            Error::Transport("connection reset".into()),
        ]);

        let attempts = wait_until_ready(&server, &fast()).await.expect("ready");
        assert_eq!(attempts, 3);
        assert_eq!(server.deletes(), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let server = ScriptedServer::new(vec![
            Error::Transport("connection refused".into()),
            Error::Internal("bad request signing".into()),
        ]);

        let err = wait_until_ready(&server, &fast()).await.unwrap_err();
        assert!(matches!(err, Error::Startup(_)));
        assert_eq!(server.deletes(), 2);
    }

    #[tokio::test]
    async fn test_attempt_bound() {
        let server = ScriptedServer::new(
            (0..10)
                .map(|_| Error::Transport("connection refused".into()))
                .collect(),
        );

        let err = wait_until_ready(&server, &fast().with_max_probe_attempts(4))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Startup(_)));
        assert_eq!(server.deletes(), 4);
    }
}
