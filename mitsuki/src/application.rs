//! Core application framework functionality. [Application] bootstraps a Mitsuki application:
//! configuration loading, container resolution, scheduler startup, and running discovered
//! [ApplicationRunner](crate::runner::ApplicationRunner)s, followed by an orderly shutdown in
//! reverse.

use crate::properties::{ConfigurationError, ConfigurationProperties};
use crate::runner::ApplicationRunnerPtr;
use crate::scheduler::{Scheduler, SchedulerError, SchedulerSettings, TaskRegistry};
use mitsuki_di::container::Container;
use mitsuki_di::error::ContainerError;
use mitsuki_di::instance_provider::{ComponentInstancePtr, ErrorPtr};
use mitsuki_di::registry::ComponentRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{dispatcher, error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Clone, Error, Debug)]
pub enum ApplicationError {
    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    /// Container resolution failed; the message names the offending descriptor.
    #[error("dependency injection error: {0}")]
    Container(#[from] ContainerError),
    /// The scheduler rejected a task descriptor or could not start.
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
    /// There was an error retrieving application runners from the container.
    #[error("error retrieving runners: {0}")]
    RunnerInjectionError(ContainerError),
    /// A runner returned an error.
    #[error("runner error: {0}")]
    RunnerError(ErrorPtr),
    /// A shutdown signal source rejected registration.
    #[error("error registering shutdown signal source: {0}")]
    ShutdownRegistrationError(ErrorPtr),
}

/// Sender half of the application shutdown signal.
pub type ShutdownSignalSender = watch::Sender<()>;

/// Source for gracefully shutting down the application: long-running runners complete once the
/// signal fires. Components implementing this trait receive the sender during startup and may
/// wire it to process signals, admin endpoints, or tests.
pub trait ShutdownSignalSource {
    fn register_shutdown(&self, shutdown_sender: ShutdownSignalSender) -> Result<(), ErrorPtr>;
}

/// The live application: frozen container, frozen configuration, the scheduler, and the shutdown
/// channel. Threaded into every runner instead of a process-global handle.
pub struct Runtime {
    container: Arc<Container>,
    properties: Arc<ConfigurationProperties>,
    scheduler: Arc<Scheduler>,
    shutdown: ShutdownSignalSender,
}

impl Runtime {
    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    pub fn properties(&self) -> &Arc<ConfigurationProperties> {
        &self.properties
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// A receiver resolving once application shutdown has been requested.
    pub fn shutdown_receiver(&self) -> watch::Receiver<()> {
        self.shutdown.subscribe()
    }

    pub fn shutdown_sender(&self) -> ShutdownSignalSender {
        self.shutdown.clone()
    }
}

/// Main entrypoint for a Mitsuki application. Collects statically submitted components and tasks
/// by default; explicit registries replace them.
pub struct Application {
    registry: Option<ComponentRegistry>,
    tasks: Option<TaskRegistry>,
    config_directory: PathBuf,
    profile: Option<String>,
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

impl Application {
    pub fn new() -> Self {
        Self {
            registry: None,
            tasks: None,
            config_directory: PathBuf::from("."),
            profile: None,
        }
    }

    /// Replaces the statically collected component registry.
    pub fn with_registry(mut self, registry: ComponentRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Replaces the statically collected scheduled task registry.
    pub fn with_tasks(mut self, tasks: TaskRegistry) -> Self {
        self.tasks = Some(tasks);
        self
    }

    /// Sets the directory searched for `application.<ext>` documents.
    pub fn with_config_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.config_directory = directory.into();
        self
    }

    /// Forces an active profile instead of reading `MITSUKI_PROFILE`; the profile overlay file
    /// must then exist.
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Bootstraps and runs the application to completion.
    pub async fn run(&mut self) -> Result<(), ApplicationError> {
        let mut configuration = ConfigurationProperties::builder().directory(&self.config_directory);
        if let Some(profile) = &self.profile {
            configuration = configuration.profile(profile.clone());
        }
        let properties = Arc::new(configuration.load()?);

        let _logger = install_logger(&properties)?;
        properties.log_sources();

        info!(profile = properties.profile(), "Starting application.");

        let registry = self
            .registry
            .take()
            .unwrap_or_else(ComponentRegistry::with_submitted);
        let container = Arc::new(
            Container::resolve_with_values(registry, properties.profile(), properties.clone())
                .await?,
        );

        let tasks = self.tasks.take().unwrap_or_else(TaskRegistry::with_submitted);
        let scheduler = Arc::new(Scheduler::new(
            tasks,
            SchedulerSettings::from_properties(&properties)?,
        ));

        let (shutdown, _) = watch::channel(());
        let runtime = Arc::new(Runtime {
            container: container.clone(),
            properties,
            scheduler: scheduler.clone(),
            shutdown,
        });

        let sources = container
            .instances_of::<dyn ShutdownSignalSource + Send + Sync>()
            .await?;
        for source in sources {
            source
                .register_shutdown(runtime.shutdown_sender())
                .map_err(ApplicationError::ShutdownRegistrationError)?;
        }

        scheduler.start(&container).await?;

        let result = run_runners(&container, runtime).await;

        scheduler.stop().await;
        container.shutdown().await;

        info!("Application stopped.");

        result
    }
}

async fn run_runners(
    container: &Arc<Container>,
    runtime: Arc<Runtime>,
) -> Result<(), ApplicationError> {
    info!("Searching for application runners...");

    let mut runners = container
        .instances_of::<ApplicationRunnerPtr>()
        .await
        .map_err(|error| {
            error!(%error, "Error retrieving application runners!");
            ApplicationError::RunnerInjectionError(error)
        })?;

    runners.sort_unstable_by_key(|runner| -runner.priority());

    info!("Running {} application runners...", runners.len());

    let mut current_runner_index = 0;
    while current_runner_index < runners.len() {
        current_runner_index +=
            run_grouped_by_priority(&runners[current_runner_index..], runtime.clone())
                .await
                .map_err(|error| {
                    error!(%error, "Error running application runner!");
                    ApplicationError::RunnerError(error)
                })?;
    }

    Ok(())
}

/// Runs the leading group of runners sharing a priority concurrently, returning the group size.
async fn run_grouped_by_priority(
    runners: &[ComponentInstancePtr<ApplicationRunnerPtr>],
    runtime: Arc<Runtime>,
) -> Result<usize, ErrorPtr> {
    // note: assuming runners are sorted by priority
    let current_priority = runners[0].priority();
    let first_new_priority_index = runners
        .iter()
        .enumerate()
        .find(|(_, entry)| entry.priority() != current_priority)
        .map(|(index, _)| index)
        .unwrap_or(runners.len());

    futures::future::try_join_all(
        runners[..first_new_priority_index]
            .iter()
            .map(|runner| runner.run(runtime.clone())),
    )
    .await
    .map(move |_| first_new_priority_index)
}

fn install_logger(
    properties: &ConfigurationProperties,
) -> Result<Option<dispatcher::DefaultGuard>, ApplicationError> {
    if !properties.get_bool("mitsuki.logging.install", true)? {
        return Ok(None);
    }

    Ok(Some(
        tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(fmt::layer())
            .set_default(),
    ))
}
