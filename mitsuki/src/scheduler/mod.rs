//! Declarative periodic tasks tied to the application lifecycle. Tasks are registered against
//! components; once the container is frozen the scheduler looks the target instances up and runs
//! one sequential loop per task, so at most one execution per task is ever in flight. Failures
//! are recorded and logged, never propagated: a throwing task keeps its schedule, and no task can
//! affect another's.
//!
//! The scheduler is disabled by default (`mitsuki.scheduler.enabled`); when disabled, tasks stay
//! discoverable through [Scheduler::snapshot] but never run. The scheduler is process-local: with
//! multiple worker processes every worker runs its own copy of every task.

pub mod stats;
pub mod trigger;

use crate::properties::{ConfigurationError, ConfigurationProperties};
use chrono::Utc;
use fxhash::FxHashSet;
use mitsuki_di::container::Container;
use mitsuki_di::future::BoxFuture;
use mitsuki_di::instance_provider::{
    ComponentInstanceAnyPtr, ComponentInstancePtr, ErrorPtr,
};
use futures::FutureExt;
use stats::{SchedulerSnapshot, TaskStats, TaskStatus};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{error, info, warn};
use trigger::Trigger;

#[derive(Error, Clone, Debug)]
pub enum SchedulerError {
    #[error("invalid trigger: {0}")]
    InvalidTrigger(String),
    #[error("invalid cron expression '{expression}': {message}")]
    InvalidCronExpression { expression: String, message: String },
    #[error("unknown time zone '{0}'")]
    UnknownTimeZone(String),
    #[error("duplicate scheduled task id '{0}'")]
    DuplicateTaskId(String),
    #[error("scheduled task '{task_id}' references unknown component '{component}': {message}")]
    UnknownComponent {
        task_id: String,
        component: String,
        message: String,
    },
}

/// Type-erased task body, invoked with the target component instance.
pub type TaskFunction =
    Arc<dyn Fn(ComponentInstanceAnyPtr) -> BoxFuture<'static, Result<(), ErrorPtr>> + Send + Sync>;

/// A periodic task bound to a method of a managed component.
pub struct ScheduledTask {
    /// `"<ComponentName>.<methodName>"`, unique within the scheduler.
    pub task_id: String,
    /// Name of the component the task runs on.
    pub component: String,
    pub method: String,
    pub trigger: Trigger,
    run: TaskFunction,
}

impl ScheduledTask {
    /// Declares a task running `body` against the component registered as `component`, which
    /// must produce an instance of `C`.
    pub fn new<C, F, Fut>(
        component: impl Into<String>,
        method: impl Into<String>,
        trigger: Trigger,
        body: F,
    ) -> Self
    where
        C: Send + Sync + 'static,
        F: Fn(ComponentInstancePtr<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ErrorPtr>> + Send + 'static,
    {
        let component = component.into();
        let method = method.into();
        let task_id = format!("{component}.{method}");

        let mismatch_id = task_id.clone();
        let run: TaskFunction = Arc::new(move |instance: ComponentInstanceAnyPtr| {
            match instance.downcast::<C>() {
                Ok(typed) => body(typed).boxed(),
                Err(_) => {
                    let error = Arc::new(SchedulerError::UnknownComponent {
                        task_id: mismatch_id.clone(),
                        component: mismatch_id.clone(),
                        message: "component instance has an unexpected type".to_string(),
                    }) as ErrorPtr;
                    async move { Err(error) }.boxed()
                }
            }
        });

        Self {
            task_id,
            component,
            method,
            trigger,
            run,
        }
    }
}

/// Statically submitted task registration, collected at startup.
pub struct TaskRegistrar {
    pub register: fn() -> ScheduledTask,
}

inventory::collect!(TaskRegistrar);

/// Submits a `fn() -> ScheduledTask` for static collection.
#[macro_export]
macro_rules! submit_scheduled_task {
    ($register:path) => {
        $crate::inventory::submit! {
            $crate::scheduler::TaskRegistrar {
                register: $register,
            }
        }
    };
}

/// Catalogue of scheduled tasks awaiting scheduler startup.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: Vec<ScheduledTask>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_submitted() -> Self {
        let mut registry = Self::new();
        for registrar in inventory::iter::<TaskRegistrar> {
            registry.register((registrar.register)());
        }
        registry
    }

    pub fn register(&mut self, task: ScheduledTask) -> &mut Self {
        self.tasks.push(task);
        self
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Scheduler behavior derived from configuration.
#[derive(Clone, Debug)]
pub struct SchedulerSettings {
    pub enabled: bool,
    pub shutdown_grace: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            shutdown_grace: Duration::from_millis(10_000),
        }
    }
}

impl SchedulerSettings {
    pub fn from_properties(
        properties: &ConfigurationProperties,
    ) -> Result<Self, ConfigurationError> {
        Ok(Self {
            enabled: properties.get_bool("mitsuki.scheduler.enabled", false)?,
            shutdown_grace: Duration::from_millis(
                properties
                    .get_i64("mitsuki.scheduler.shutdown_grace_ms", 10_000)?
                    .max(0) as u64,
            ),
        })
    }
}

struct TaskState {
    task: ScheduledTask,
    stats: Mutex<TaskStats>,
}

impl TaskState {
    fn lock_stats(&self) -> std::sync::MutexGuard<'_, TaskStats> {
        self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Owns the time loops of all registered tasks.
pub struct Scheduler {
    tasks: Vec<Arc<TaskState>>,
    settings: SchedulerSettings,
    shutdown: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(registry: TaskRegistry, settings: SchedulerSettings) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            tasks: registry
                .tasks
                .into_iter()
                .map(|task| {
                    Arc::new(TaskState {
                        task,
                        stats: Mutex::new(TaskStats::new()),
                    })
                })
                .collect(),
            settings,
            shutdown,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    pub fn task_ids(&self) -> Vec<String> {
        self.tasks
            .iter()
            .map(|state| state.task.task_id.clone())
            .collect()
    }

    /// Begins the time loops. Requires a frozen container holding every target component. A
    /// disabled scheduler leaves all tasks inactive.
    pub async fn start(&self, container: &Arc<Container>) -> Result<(), SchedulerError> {
        if !self.settings.enabled {
            info!(
                tasks = self.tasks.len(),
                "Scheduler disabled; registered tasks remain inactive."
            );
            return Ok(());
        }

        let mut seen = FxHashSet::default();
        for state in &self.tasks {
            if !seen.insert(state.task.task_id.clone()) {
                return Err(SchedulerError::DuplicateTaskId(state.task.task_id.clone()));
            }
        }

        let mut handles = Vec::with_capacity(self.tasks.len());
        for state in &self.tasks {
            let instance = container
                .instance_by_name(&state.task.component)
                .await
                .map_err(|error| SchedulerError::UnknownComponent {
                    task_id: state.task.task_id.clone(),
                    component: state.task.component.clone(),
                    message: error.to_string(),
                })?;

            handles.push(tokio::spawn(run_task_loop(
                state.clone(),
                instance,
                self.shutdown.subscribe(),
            )));
        }

        info!(tasks = handles.len(), "Scheduler started.");
        let mut slots = self
            .handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slots = handles;

        Ok(())
    }

    /// Stops accepting new starts, waits up to the configured grace period for in-flight
    /// executions, then marks all tasks stopped. Running bodies are never aborted mid-flight.
    pub async fn stop(&self) {
        if !self.settings.enabled {
            return;
        }

        let _ = self.shutdown.send(true);

        let handles: Vec<_> = {
            let mut slots = self
                .handles
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            slots.drain(..).collect()
        };
        if handles.is_empty() {
            return;
        }

        if tokio::time::timeout(self.settings.shutdown_grace, futures::future::join_all(handles))
            .await
            .is_err()
        {
            warn!(
                grace_ms = self.settings.shutdown_grace.as_millis() as u64,
                "Scheduler grace period elapsed with tasks still in flight."
            );
        }

        for state in &self.tasks {
            state.lock_stats().mark_stopped();
        }

        info!("Scheduler stopped.");
    }

    /// A consistent read-only snapshot of per-task statistics and aggregate counters.
    pub fn snapshot(&self) -> SchedulerSnapshot {
        let tasks: Vec<_> = self
            .tasks
            .iter()
            .map(|state| state.lock_stats().snapshot(&state.task.task_id))
            .collect();
        let running_tasks = tasks
            .iter()
            .filter(|task| task.status == TaskStatus::Running)
            .count();

        SchedulerSnapshot {
            total_tasks: tasks.len(),
            running_tasks,
            tasks,
        }
    }
}

async fn run_task_loop(
    state: Arc<TaskState>,
    instance: ComponentInstanceAnyPtr,
    mut shutdown: watch::Receiver<bool>,
) {
    let trigger = state.task.trigger.clone();
    let mut planned = Instant::now() + first_wait(&trigger);

    loop {
        tokio::select! {
            _ = sleep_until(planned) => {}
            _ = shutdown.changed() => break,
        }

        let started = Instant::now();
        state.lock_stats().record_start();

        let failed = match (state.task.run)(instance.clone()).await {
            Ok(()) => false,
            Err(cause) => {
                error!(
                    task = %state.task.task_id,
                    %cause,
                    "Scheduled task failed; keeping its schedule."
                );
                true
            }
        };
        state.lock_stats().record_finish(started.elapsed(), failed);

        if *shutdown.borrow() {
            break;
        }

        planned = match &trigger {
            Trigger::FixedRate { interval, .. } => {
                // grid slot overrun by the previous execution: start as soon as possible,
                // skipping the missed slot
                let next = planned + *interval;
                next.max(Instant::now())
            }
            Trigger::FixedDelay { delay, .. } => Instant::now() + *delay,
            Trigger::Cron { .. } => Instant::now() + cron_wait(&trigger),
        };
    }

    state.lock_stats().mark_stopped();
}

fn first_wait(trigger: &Trigger) -> Duration {
    match trigger {
        Trigger::FixedRate { initial_delay, .. } | Trigger::FixedDelay { initial_delay, .. } => {
            *initial_delay
        }
        Trigger::Cron { .. } => cron_wait(trigger),
    }
}

fn cron_wait(trigger: &Trigger) -> Duration {
    let now = Utc::now();
    trigger
        .next_fire_after(now)
        .and_then(|next| (next - now).to_std().ok())
        // exhausted schedule: park the loop and re-check later
        .unwrap_or(Duration::from_secs(3600))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mitsuki_di::component::ComponentKind;
    use mitsuki_di::descriptor::ComponentDescriptor;
    use mitsuki_di::registry::ComponentRegistry;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    #[derive(Default)]
    struct Worker {
        runs: AtomicU64,
        in_flight: AtomicBool,
        overlapped: AtomicBool,
    }

    impl Worker {
        fn enter(&self) {
            if self.in_flight.swap(true, Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            self.runs.fetch_add(1, Ordering::SeqCst);
        }

        fn leave(&self) {
            self.in_flight.store(false, Ordering::SeqCst);
        }
    }

    async fn container_with_worker(worker: Arc<Worker>) -> Arc<Container> {
        let mut registry = ComponentRegistry::new();
        registry.register(
            ComponentDescriptor::new::<Worker>("Worker", ComponentKind::Service)
                .with_existing(worker),
        );
        Arc::new(Container::resolve(registry, "").await.unwrap())
    }

    fn enabled_settings() -> SchedulerSettings {
        SchedulerSettings {
            enabled: true,
            shutdown_grace: Duration::from_millis(2_000),
        }
    }

    fn scheduler_with_task(trigger: Trigger, body_ms: u64) -> Scheduler {
        let mut tasks = TaskRegistry::new();
        tasks.register(ScheduledTask::new::<Worker, _, _>(
            "Worker",
            "tick",
            trigger,
            move |worker| async move {
                worker.enter();
                if body_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(body_ms)).await;
                }
                worker.leave();
                Ok(())
            },
        ));
        Scheduler::new(tasks, enabled_settings())
    }

    #[tokio::test(start_paused = true)]
    async fn should_run_fixed_rate_on_the_grid() {
        let worker = Arc::new(Worker::default());
        let container = container_with_worker(worker.clone()).await;

        let scheduler = scheduler_with_task(Trigger::fixed_rate(100).unwrap(), 0);
        scheduler.start(&container).await.unwrap();

        tokio::time::sleep(Duration::from_millis(350)).await;
        scheduler.stop().await;

        let runs = worker.runs.load(Ordering::SeqCst);
        assert!((3..=4).contains(&runs), "runs = {runs}");
        assert!(!worker.overlapped.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn should_skip_missed_slots_on_overrun() {
        let worker = Arc::new(Worker::default());
        let container = container_with_worker(worker.clone()).await;

        // rate 100ms, body 250ms: starts back-to-back at 0, 250, 500, 750, ...
        let scheduler = scheduler_with_task(Trigger::fixed_rate(100).unwrap(), 250);
        scheduler.start(&container).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        scheduler.stop().await;

        let runs = worker.runs.load(Ordering::SeqCst);
        assert!((4..=5).contains(&runs), "runs = {runs}");
        assert!(!worker.overlapped.load(Ordering::SeqCst));

        let snapshot = scheduler.snapshot();
        assert_eq!(snapshot.tasks[0].executions, runs);
        assert_eq!(snapshot.tasks[0].failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn should_wait_for_initial_delay() {
        let worker = Arc::new(Worker::default());
        let container = container_with_worker(worker.clone()).await;

        let scheduler = scheduler_with_task(
            Trigger::fixed_rate(100).unwrap().with_initial_delay(200),
            0,
        );
        scheduler.start(&container).await.unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(worker.runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(worker.runs.load(Ordering::SeqCst) >= 1);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn should_space_fixed_delay_from_completion() {
        let worker = Arc::new(Worker::default());
        let container = container_with_worker(worker.clone()).await;

        // delay 100ms after a 100ms body: one start every ~200ms
        let scheduler = scheduler_with_task(Trigger::fixed_delay(100).unwrap(), 100);
        scheduler.start(&container).await.unwrap();

        tokio::time::sleep(Duration::from_millis(650)).await;
        scheduler.stop().await;

        let runs = worker.runs.load(Ordering::SeqCst);
        assert!((3..=4).contains(&runs), "runs = {runs}");
    }

    #[tokio::test(start_paused = true)]
    async fn should_keep_schedule_after_task_errors() {
        let worker = Arc::new(Worker::default());
        let container = container_with_worker(worker.clone()).await;

        let healthy_runs = Arc::new(AtomicU64::new(0));

        let mut tasks = TaskRegistry::new();
        tasks.register(ScheduledTask::new::<Worker, _, _>(
            "Worker",
            "flaky",
            Trigger::fixed_rate(100).unwrap(),
            |worker| async move {
                let run = worker.runs.fetch_add(1, Ordering::SeqCst) + 1;
                if run == 2 {
                    return Err(Arc::new(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "flaky",
                    )) as ErrorPtr);
                }
                Ok(())
            },
        ));
        let runs = healthy_runs.clone();
        tasks.register(ScheduledTask::new::<Worker, _, _>(
            "Worker",
            "healthy",
            Trigger::fixed_rate(100).unwrap(),
            move |_| {
                let runs = runs.clone();
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        ));
        let scheduler = Scheduler::new(tasks, enabled_settings());
        scheduler.start(&container).await.unwrap();

        tokio::time::sleep(Duration::from_millis(450)).await;
        scheduler.stop().await;

        let snapshot = scheduler.snapshot();
        let flaky = snapshot
            .tasks
            .iter()
            .find(|task| task.task_id == "Worker.flaky")
            .unwrap();
        assert!(flaky.executions >= 4);
        assert_eq!(flaky.failures, 1);

        // a failing neighbour never costs another task executions
        assert!(healthy_runs.load(Ordering::SeqCst) >= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn should_mark_tasks_stopped_after_shutdown() {
        let worker = Arc::new(Worker::default());
        let container = container_with_worker(worker.clone()).await;

        let scheduler = scheduler_with_task(Trigger::fixed_rate(100).unwrap(), 0);
        scheduler.start(&container).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        scheduler.stop().await;

        let snapshot = scheduler.snapshot();
        assert_eq!(snapshot.total_tasks, 1);
        assert_eq!(snapshot.running_tasks, 0);
        assert_eq!(snapshot.tasks[0].status, TaskStatus::Stopped);
    }

    #[tokio::test]
    async fn should_reject_duplicate_task_ids() {
        let worker = Arc::new(Worker::default());
        let container = container_with_worker(worker).await;

        let mut tasks = TaskRegistry::new();
        for _ in 0..2 {
            tasks.register(ScheduledTask::new::<Worker, _, _>(
                "Worker",
                "tick",
                Trigger::fixed_rate(100).unwrap(),
                |_| async { Ok(()) },
            ));
        }
        let scheduler = Scheduler::new(tasks, enabled_settings());

        assert!(matches!(
            scheduler.start(&container).await.unwrap_err(),
            SchedulerError::DuplicateTaskId(id) if id == "Worker.tick"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn should_stay_inactive_when_disabled() {
        let worker = Arc::new(Worker::default());
        let container = container_with_worker(worker.clone()).await;

        let mut tasks = TaskRegistry::new();
        tasks.register(ScheduledTask::new::<Worker, _, _>(
            "Worker",
            "tick",
            Trigger::fixed_rate(50).unwrap(),
            |worker| async move {
                worker.enter();
                worker.leave();
                Ok(())
            },
        ));
        let scheduler = Scheduler::new(tasks, SchedulerSettings::default());
        scheduler.start(&container).await.unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(worker.runs.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.snapshot().total_tasks, 1);
        assert_eq!(scheduler.snapshot().tasks[0].status, TaskStatus::Pending);
    }
}
