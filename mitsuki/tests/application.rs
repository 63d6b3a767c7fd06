use mitsuki::application::{Application, Runtime};
use mitsuki::future::FutureExt;
use mitsuki::properties::ConfigSource;
use mitsuki::runner::{ApplicationRunner, ApplicationRunnerPtr, ErrorPtr};
use mitsuki::scheduler::trigger::Trigger;
use mitsuki::scheduler::{ScheduledTask, TaskRegistry};
use mitsuki_di::alias_cast;
use mitsuki_di::component::ComponentKind;
use mitsuki_di::descriptor::ComponentDescriptor;
use mitsuki_di::future::BoxFuture;
use mitsuki_di::instance_provider::ComponentInstancePtr;
use mitsuki_di::registry::ComponentRegistry;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Greeter {
    greeting: String,
}

struct TickCounter {
    ticks: AtomicU64,
}

struct Probe {
    greeting: Mutex<Option<String>>,
    greeting_source: Mutex<Option<ConfigSource>>,
    observed_ticks: AtomicU64,
}

struct ProbeRunner {
    greeter: ComponentInstancePtr<Greeter>,
    probe: ComponentInstancePtr<Probe>,
}

impl ApplicationRunner for ProbeRunner {
    fn run(&self, runtime: Arc<Runtime>) -> BoxFuture<'_, Result<(), ErrorPtr>> {
        async move {
            self.probe
                .greeting
                .lock()
                .unwrap()
                .replace(self.greeter.greeting.clone());
            self.probe.greeting_source.lock().unwrap().clone_from(
                &runtime
                    .properties()
                    .provenance()
                    .get("app.greeting")
                    .cloned(),
            );

            // leave the scheduler a few periods to fire before the application winds down
            tokio::time::sleep(Duration::from_millis(200)).await;

            let snapshot = runtime.scheduler().snapshot();
            self.probe.observed_ticks.store(
                snapshot
                    .tasks
                    .iter()
                    .find(|task| task.task_id == "TickCounter.tick")
                    .map(|task| task.executions)
                    .unwrap_or(0),
                Ordering::SeqCst,
            );

            Ok(())
        }
        .boxed()
    }
}

fn registry(probe: Arc<Probe>) -> ComponentRegistry {
    let mut registry = ComponentRegistry::new();
    registry.register(
        ComponentDescriptor::new::<Greeter>("Greeter", ComponentKind::Service)
            .with_value("greeting", "${app.greeting:hi}")
            .with_factory(|deps| async move {
                Ok(Greeter {
                    greeting: deps.value("greeting")?,
                })
            }),
    );
    registry.register(
        ComponentDescriptor::new::<TickCounter>("TickCounter", ComponentKind::Service)
            .with_factory(|_| async {
                Ok(TickCounter {
                    ticks: AtomicU64::new(0),
                })
            }),
    );
    registry.register(
        ComponentDescriptor::new::<Probe>("Probe", ComponentKind::Generic).with_existing(probe),
    );
    registry.register(
        ComponentDescriptor::new::<ProbeRunner>("ProbeRunner", ComponentKind::Generic)
            .with_alias::<ApplicationRunnerPtr>(alias_cast!(ProbeRunner => ApplicationRunnerPtr))
            .with_dependency(mitsuki_di::descriptor::DependencyDescriptor::by_type::<Greeter>(
                "greeter",
            ))
            .with_dependency(mitsuki_di::descriptor::DependencyDescriptor::by_type::<Probe>(
                "probe",
            ))
            .with_factory(|deps| async move {
                Ok(ProbeRunner {
                    greeter: deps.instance::<Greeter>("greeter")?,
                    probe: deps.instance::<Probe>("probe")?,
                })
            }),
    );
    registry
}

fn tasks() -> TaskRegistry {
    let mut tasks = TaskRegistry::new();
    tasks.register(ScheduledTask::new::<TickCounter, _, _>(
        "TickCounter",
        "tick",
        Trigger::fixed_rate(20).unwrap(),
        |counter| async move {
            counter.ticks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
    ));
    tasks
}

#[tokio::test]
async fn should_bootstrap_profile_scheduler_and_runners() {
    let directory = tempfile::tempdir().unwrap();
    let mut base = std::fs::File::create(directory.path().join("application.yml")).unwrap();
    write!(
        base,
        "app:\n  greeting: hello\nmitsuki:\n  logging:\n    install: false\n  scheduler:\n    enabled: true\n    shutdown_grace_ms: 500\n"
    )
    .unwrap();
    let mut overlay = std::fs::File::create(directory.path().join("application-dev.yml")).unwrap();
    write!(overlay, "app:\n  greeting: bonjour\n").unwrap();

    let probe = Arc::new(Probe {
        greeting: Mutex::new(None),
        greeting_source: Mutex::new(None),
        observed_ticks: AtomicU64::new(0),
    });

    Application::new()
        .with_registry(registry(probe.clone()))
        .with_tasks(tasks())
        .with_config_directory(directory.path())
        .with_profile("dev")
        .run()
        .await
        .unwrap();

    // profile overlay beat the base file, and the value dependency saw the merged store
    assert_eq!(probe.greeting.lock().unwrap().as_deref(), Some("bonjour"));
    assert_eq!(
        *probe.greeting_source.lock().unwrap(),
        Some(ConfigSource::ProfileFile("application-dev.yml".to_string()))
    );

    // the scheduler ran while the application was live
    assert!(probe.observed_ticks.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn should_fail_startup_on_missing_profile_overlay() {
    let directory = tempfile::tempdir().unwrap();

    let error = Application::new()
        .with_registry(ComponentRegistry::new())
        .with_tasks(TaskRegistry::new())
        .with_config_directory(directory.path())
        .with_profile("staging")
        .run()
        .await
        .unwrap_err();

    assert!(error.to_string().contains("staging"));
}
