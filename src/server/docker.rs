use crate::error::{Error, Result};
use crate::port::SessionIdentity;
use crate::server::ServerBackend;
use testcontainers::core::WaitFor;
use testcontainers::{clients, Container, Image, ImageArgs, RunnableImage};

const NAME: &str = "amazon/dynamodb-local";
const TAG: &str = "latest";

/// Port DynamoDB Local listens on inside the container
pub const CONTAINER_PORT: u16 = 8000;

/// The `amazon/dynamodb-local` image
#[derive(Debug, Clone)]
pub struct DynamoDbLocalImage {
    tag: String,
}

impl Default for DynamoDbLocalImage {
    fn default() -> Self {
        Self {
            tag: TAG.to_owned(),
        }
    }
}

impl DynamoDbLocalImage {
    /// Pins the image tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }
}

impl Image for DynamoDbLocalImage {
    type Args = DynamoDbLocalArgs;

    fn name(&self) -> String {
        NAME.to_owned()
    }

    fn tag(&self) -> String {
        self.tag.clone()
    }

    fn ready_conditions(&self) -> Vec<WaitFor> {
        // Readiness is confirmed by the canary probe, the log line only skips the JVM boot
        vec![WaitFor::message_on_stdout(
            "Initializing DynamoDB Local with the following configuration",
        )]
    }
}

/// Command line of the DynamoDB Local jar inside the container
#[derive(Debug, Clone)]
pub struct DynamoDbLocalArgs {
    shared_db: bool,
    in_memory: bool,
}

impl Default for DynamoDbLocalArgs {
    fn default() -> Self {
        Self {
            shared_db: true,
            in_memory: false,
        }
    }
}

impl DynamoDbLocalArgs {
    /// Keeps tables in memory instead of the container's filesystem
    pub fn with_in_memory(mut self, in_memory: bool) -> Self {
        self.in_memory = in_memory;
        self
    }

    /// Uses one database file regardless of the credentials and region of the caller
    pub fn with_shared_db(mut self, shared_db: bool) -> Self {
        self.shared_db = shared_db;
        self
    }

    fn to_vec(&self) -> Vec<String> {
        let mut args = vec!["-jar".to_owned(), "DynamoDBLocal.jar".to_owned()];
        if self.shared_db {
            args.push("-sharedDb".to_owned());
        }
        if self.in_memory {
            args.push("-inMemory".to_owned());
        }
        args
    }
}

impl ImageArgs for DynamoDbLocalArgs {
    fn into_iterator(self) -> Box<dyn Iterator<Item = String>> {
        Box::new(self.to_vec().into_iter())
    }
}

/// Runs DynamoDB Local in a Docker container named after the session.
///
/// The container is bound to the session port and removed on shutdown.
pub struct DockerBackend<'d> {
    docker: &'d clients::Cli,
    image: DynamoDbLocalImage,
    args: DynamoDbLocalArgs,
    container: Option<Container<'d, DynamoDbLocalImage>>,
}

impl<'d> DockerBackend<'d> {
    /// Creates a backend running the default image through `docker`
    pub fn new(docker: &'d clients::Cli) -> Self {
        Self {
            docker,
            image: DynamoDbLocalImage::default(),
            args: DynamoDbLocalArgs::default(),
            container: None,
        }
    }

    pub fn with_image(mut self, image: DynamoDbLocalImage) -> Self {
        self.image = image;
        self
    }

    pub fn with_args(mut self, args: DynamoDbLocalArgs) -> Self {
        self.args = args;
        self
    }

    /// Id of the running container, if any
    pub fn container_id(&self) -> Option<&str> {
        self.container.as_ref().map(|container| container.id())
    }
}

impl ServerBackend for DockerBackend<'_> {
    fn name(&self) -> &str {
        "docker"
    }

    fn launch(&mut self, identity: &SessionIdentity) -> Result<()> {
        if self.container.is_some() {
            return Ok(());
        }

        log::debug!(
            "running {}:{} as {} on port {}",
            NAME,
            self.image.tag,
            identity.id(),
            identity.port()
        );

        let image = RunnableImage::from((self.image.clone(), self.args.clone()))
            .with_container_name(identity.id())
            .with_mapped_port((identity.port(), CONTAINER_PORT));

        // The client panics when the daemon is unreachable or the name is taken
        let docker = self.docker;
        let container = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| docker.run(image)))
            .map_err(|_| {
                Error::Backend(format!("failed to run container {}", identity.id()))
            })?;

        self.container = Some(container);
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        if let Some(container) = self.container.take() {
            log::debug!("removing container {}", container.id());
            // Dropping the container stops and removes it
            drop(container);
        }
        Ok(())
    }
}
