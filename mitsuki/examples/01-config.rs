use mitsuki::properties::ConfigurationProperties;
use serde_json::json;

fn main() {
    // layered store: bundled defaults < environment < application.yml < profile overlay
    // < programmatic overrides
    let properties = ConfigurationProperties::builder()
        .with_override("app.name", json!("config-demo"))
        .load()
        .expect("error loading configuration");

    let name = properties
        .get_string("app.name", "unnamed")
        .expect("error reading app.name");
    let port = properties
        .get_i64("mitsuki.server.port", 8000)
        .expect("error reading port");
    let banner = properties
        .substitute("starting ${app.name} on port ${mitsuki.server.port}")
        .expect("error substituting banner");

    println!("{banner} (name = {name}, port = {port})");

    for (key, source) in properties.provenance() {
        println!("{key} <- {source}");
    }
}
