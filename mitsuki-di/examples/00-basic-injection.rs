use mitsuki_di::alias_cast;
use mitsuki_di::component::ComponentKind;
use mitsuki_di::container::Container;
use mitsuki_di::descriptor::{ComponentDescriptor, DependencyDescriptor};
use mitsuki_di::instance_provider::ComponentInstancePtr;
use mitsuki_di::registry::ComponentRegistry;

// this is a trait we would like to use in our component
trait TextProvider: Send + Sync {
    fn text(&self) -> String;
}

// this is a dependency which implements the above trait
struct GreetingProvider;

impl TextProvider for GreetingProvider {
    fn text(&self) -> String {
        "Hello world!".to_string()
    }
}

// this is another component, with a dependency on the trait above
struct Printer {
    provider: ComponentInstancePtr<dyn TextProvider + Send + Sync>,
}

impl Printer {
    fn print(&self) {
        println!("{}", self.provider.text());
    }
}

#[tokio::main]
async fn main() {
    let mut registry = ComponentRegistry::new();
    registry.register(
        ComponentDescriptor::new::<GreetingProvider>("GreetingProvider", ComponentKind::Generic)
            .with_alias::<dyn TextProvider + Send + Sync>(
                alias_cast!(GreetingProvider => dyn TextProvider + Send + Sync),
            )
            .with_factory(|_| async { Ok(GreetingProvider) }),
    );
    registry.register(
        ComponentDescriptor::new::<Printer>("Printer", ComponentKind::Service)
            .with_dependency(DependencyDescriptor::by_type::<dyn TextProvider + Send + Sync>(
                "provider",
            ))
            .with_factory(|deps| async move {
                Ok(Printer {
                    provider: deps.instance::<dyn TextProvider + Send + Sync>("provider")?,
                })
            }),
    );

    let container = Container::resolve(registry, "")
        .await
        .expect("error resolving container");

    container
        .instance_typed::<Printer>("Printer")
        .await
        .expect("error creating Printer")
        .print();
}
