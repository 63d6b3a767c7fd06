use mitsuki::application::{Application, Runtime};
use mitsuki::future::FutureExt;
use mitsuki::runner::{ApplicationRunner, ApplicationRunnerPtr, ErrorPtr};
use mitsuki_di::alias_cast;
use mitsuki_di::component::ComponentKind;
use mitsuki_di::descriptor::ComponentDescriptor;
use mitsuki_di::future::BoxFuture;
use std::sync::Arc;

struct HelloRunner;

impl ApplicationRunner for HelloRunner {
    fn run(&self, runtime: Arc<Runtime>) -> BoxFuture<'_, Result<(), ErrorPtr>> {
        async move {
            println!(
                "Hello from a runner! Active profile: '{}'",
                runtime.properties().profile()
            );
            Ok(())
        }
        .boxed()
    }
}

fn hello_runner() -> ComponentDescriptor {
    ComponentDescriptor::new::<HelloRunner>("HelloRunner", ComponentKind::Generic)
        .with_alias::<ApplicationRunnerPtr>(alias_cast!(HelloRunner => ApplicationRunnerPtr))
        .with_factory(|_| async { Ok(HelloRunner) })
}

mitsuki_di::submit_component!(hello_runner);

#[tokio::main]
async fn main() {
    if let Err(error) = Application::new().run().await {
        eprintln!("application error: {error}");
        std::process::exit(1);
    }
}
