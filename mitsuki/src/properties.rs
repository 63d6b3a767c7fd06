//! The layered configuration store. Sources are merged into a flat dot-keyed table in ascending
//! precedence order, so higher-precedence writes overwrite lower ones while each key remembers
//! which source supplied its final value:
//!
//! programmatic override > `application-<profile>.<ext>` > `application.<ext>` >
//! environment variable > bundled defaults.
//!
//! Environment variables use the `MITSUKI_` prefix and map `MITSUKI_A_B_C` to `a.b.c`; they are a
//! fallback only, never overriding a file-supplied key. Keys whose last segment contains an
//! underscore cannot be found by that mechanical mapping, so lookups additionally probe the exact
//! candidate variable on a miss and record the observation in provenance.
//!
//! The store is write-once: after loading, only the lazy environment-observation cache mutates.

use config::{Config, File, FileFormat, Source, Value as ConfigValue, ValueKind};
use fxhash::FxHashMap;
use mitsuki_di::container::ValueResolver;
use mitsuki_di::instance_provider::{convert_error, ErrorPtr};
use serde::de::DeserializeOwned;
use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};
use std::any::type_name;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;
use tracing::info;

/// Prefix for configuration environment variables.
pub const ENV_PREFIX: &str = "MITSUKI";

/// Environment variable selecting the active profile.
pub const PROFILE_ENV: &str = "MITSUKI_PROFILE";

/// File extensions probed for configuration documents, in order.
const EXTENSIONS: [(&str, FileFormat); 4] = [
    ("yml", FileFormat::Yaml),
    ("yaml", FileFormat::Yaml),
    ("json", FileFormat::Json),
    ("toml", FileFormat::Toml),
];

/// Placeholder substitution gives up after this many passes and reports a cycle.
const SUBSTITUTION_DEPTH: usize = 10;

/// Configuration bundled with the framework, the lowest-precedence source.
const BUNDLED_DEFAULTS: &str = r#"
mitsuki:
  logging:
    install: true
  server:
    host: 127.0.0.1
    port: 8000
    debug: false
    ignore_trailing_slash: false
  scheduler:
    enabled: false
    shutdown_grace_ms: 10000
"#;

#[derive(Error, Debug, Clone)]
pub enum ConfigurationError {
    #[error("cannot read configuration file '{path}': {message}")]
    FileRead { path: String, message: String },
    #[error("malformed configuration document '{path}': {message}")]
    Malformed { path: String, message: String },
    #[error("required profile configuration file 'application-{0}' not found")]
    MissingProfileFile(String),
    #[error("unresolved configuration placeholder '${{{0}}}'")]
    UnresolvedPlaceholder(String),
    #[error("circular placeholder substitution in '{0}'")]
    CircularPlaceholder(String),
    #[error("cannot coerce configuration key '{key}' into {requested}: {message}")]
    Coercion {
        key: String,
        requested: String,
        message: String,
    },
}

/// Identity of the source that supplied a configuration value.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ConfigSource {
    Defaults,
    ApplicationFile(String),
    ProfileFile(String),
    Environment(String),
    Programmatic,
}

impl ConfigSource {
    fn is_file(&self) -> bool {
        matches!(
            self,
            ConfigSource::ApplicationFile(_) | ConfigSource::ProfileFile(_)
        )
    }
}

impl Display for ConfigSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Defaults => f.write_str("default configuration"),
            ConfigSource::ApplicationFile(name) | ConfigSource::ProfileFile(name) => {
                f.write_str(name)
            }
            ConfigSource::Environment(variable) => {
                write!(f, "environment variable ({variable})")
            }
            ConfigSource::Programmatic => f.write_str("programmatic override"),
        }
    }
}

/// Builder for [ConfigurationProperties]. An explicitly requested profile requires its overlay
/// file to exist; a profile taken from [PROFILE_ENV] tolerates a missing overlay.
pub struct ConfigurationBuilder {
    directory: PathBuf,
    profile: Option<String>,
    overrides: Vec<(String, JsonValue)>,
}

impl ConfigurationBuilder {
    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Adds a programmatic override, the highest-precedence source.
    pub fn with_override(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.overrides.push((key.into(), value));
        self
    }

    pub fn load(self) -> Result<ConfigurationProperties, ConfigurationError> {
        let (profile, profile_required) = match self.profile {
            Some(profile) => (profile, true),
            None => (
                std::env::var(PROFILE_ENV).unwrap_or_default(),
                false,
            ),
        };

        let mut entries = FxHashMap::default();

        merge_document(
            &mut entries,
            parse_str(BUNDLED_DEFAULTS, FileFormat::Yaml, "<defaults>")?,
            &ConfigSource::Defaults,
        );

        for (variable, value) in std::env::vars() {
            let Some(suffix) = variable.strip_prefix(&format!("{ENV_PREFIX}_")) else {
                continue;
            };
            if variable == PROFILE_ENV || suffix.is_empty() {
                continue;
            }
            let key = suffix.to_lowercase().replace('_', ".");
            entries.insert(
                key,
                (
                    JsonValue::String(value),
                    ConfigSource::Environment(variable),
                ),
            );
        }

        if let Some((path, format, name)) = find_document(&self.directory, "application") {
            merge_document(
                &mut entries,
                parse_file(&path, format)?,
                &ConfigSource::ApplicationFile(name),
            );
        }

        if !profile.is_empty() {
            let stem = format!("application-{profile}");
            match find_document(&self.directory, &stem) {
                Some((path, format, name)) => merge_document(
                    &mut entries,
                    parse_file(&path, format)?,
                    &ConfigSource::ProfileFile(name),
                ),
                None if profile_required => {
                    return Err(ConfigurationError::MissingProfileFile(profile))
                }
                None => {}
            }
        }

        for (key, value) in self.overrides {
            entries.insert(key, (value, ConfigSource::Programmatic));
        }

        Ok(ConfigurationProperties {
            entries,
            observed_env: RwLock::new(BTreeMap::new()),
            profile,
        })
    }
}

/// The merged, frozen configuration of a running application.
#[derive(Debug)]
pub struct ConfigurationProperties {
    entries: FxHashMap<String, (JsonValue, ConfigSource)>,
    observed_env: RwLock<BTreeMap<String, String>>,
    profile: String,
}

impl ConfigurationProperties {
    /// Loads configuration from the current directory, profile taken from [PROFILE_ENV].
    pub fn load() -> Result<Self, ConfigurationError> {
        Self::builder().load()
    }

    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder {
            directory: PathBuf::from("."),
            profile: None,
            overrides: Vec::new(),
        }
    }

    /// The active profile; empty means base configuration only.
    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Returns the raw value for a key, or `None` when no source supplies it.
    pub fn get(&self, key: &str) -> Option<JsonValue> {
        self.lookup(key).map(|(value, _)| value)
    }

    /// Returns the value for `key` coerced into `T`, or `default` when absent. Present values
    /// that cannot be coerced are an error, never silently replaced by the default.
    pub fn get_or<T: DeserializeOwned>(
        &self,
        key: &str,
        default: T,
    ) -> Result<T, ConfigurationError> {
        match self.lookup(key) {
            Some((value, _)) => coerce(key, &value),
            None => Ok(default),
        }
    }

    /// Returns the value for `key` coerced into `T`, or `None` when absent.
    pub fn get_typed<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, ConfigurationError> {
        self.lookup(key)
            .map(|(value, _)| coerce(key, &value))
            .transpose()
    }

    pub fn get_string(&self, key: &str, default: &str) -> Result<String, ConfigurationError> {
        self.get_or(key, default.to_string())
    }

    pub fn get_i64(&self, key: &str, default: i64) -> Result<i64, ConfigurationError> {
        self.get_or(key, default)
    }

    pub fn get_f64(&self, key: &str, default: f64) -> Result<f64, ConfigurationError> {
        self.get_or(key, default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool, ConfigurationError> {
        self.get_or(key, default)
    }

    pub fn get_list(&self, key: &str) -> Result<Vec<String>, ConfigurationError> {
        self.get_or(key, Vec::new())
    }

    /// Resolves `${key}` and `${key:default}` placeholders in a template, recursively, with a
    /// bounded number of passes to catch substitution cycles.
    pub fn substitute(&self, template: &str) -> Result<String, ConfigurationError> {
        let mut current = template.to_string();
        for _ in 0..SUBSTITUTION_DEPTH {
            if !current.contains("${") {
                return Ok(current);
            }
            current = self.substitute_once(&current)?;
        }
        Err(ConfigurationError::CircularPlaceholder(template.to_string()))
    }

    /// Resolves a value expression for injection: a full `${key[:default]}` placeholder keeps the
    /// stored value's type, a plain string is treated as a key lookup, and anything else is
    /// substituted as a template.
    pub fn resolve_expression(&self, expression: &str) -> Result<JsonValue, ConfigurationError> {
        let trimmed = expression.trim();

        if let Some(inner) = trimmed
            .strip_prefix("${")
            .and_then(|rest| rest.strip_suffix('}'))
            .filter(|inner| !inner.contains("${"))
        {
            let (key, default) = split_placeholder(inner);
            return match self.lookup(key) {
                Some((JsonValue::String(text), _)) if text.contains("${") => self
                    .substitute(&text)
                    .map(JsonValue::String),
                Some((value, _)) => Ok(value),
                None => match default {
                    Some(default) => self.substitute(default).map(JsonValue::String),
                    None => Err(ConfigurationError::UnresolvedPlaceholder(key.to_string())),
                },
            };
        }

        if trimmed.contains("${") {
            return self.substitute(trimmed).map(JsonValue::String);
        }

        Ok(self.get(trimmed).unwrap_or(JsonValue::Null))
    }

    /// Which source supplied each final key, including lazily observed environment fallbacks.
    pub fn provenance(&self) -> BTreeMap<String, ConfigSource> {
        let mut sources: BTreeMap<String, ConfigSource> = self
            .entries
            .iter()
            .map(|(key, (_, source))| (key.clone(), source.clone()))
            .collect();

        if let Ok(observed) = self.observed_env.read() {
            for (key, variable) in observed.iter() {
                sources.insert(key.clone(), ConfigSource::Environment(variable.clone()));
            }
        }

        sources
    }

    /// Logs the merged configuration keys grouped by source, at info level.
    pub fn log_sources(&self) {
        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (key, source) in self.provenance() {
            grouped.entry(source.to_string()).or_default().push(key);
        }

        info!("Configuration sources:");
        for (source, keys) in grouped {
            info!("  [{source}] {}", keys.join(", "));
        }
    }

    fn lookup(&self, key: &str) -> Option<(JsonValue, ConfigSource)> {
        match self.entries.get(key) {
            Some((_, source)) if !source.is_file() && *source != ConfigSource::Programmatic => {
                // Defaults and mechanically-mapped env entries can still lose to an exact
                // environment probe (underscore-bearing keys never match the eager scan).
                self.probe_environment(key)
                    .or_else(|| self.entries.get(key).cloned())
            }
            Some(entry) => Some(entry.clone()),
            None => self.probe_environment(key),
        }
    }

    fn probe_environment(&self, key: &str) -> Option<(JsonValue, ConfigSource)> {
        let variable = format!(
            "{ENV_PREFIX}_{}",
            key.replace('.', "_").to_uppercase()
        );
        let value = std::env::var(&variable).ok()?;

        if let Ok(mut observed) = self.observed_env.write() {
            observed.insert(key.to_string(), variable.clone());
        }

        Some((JsonValue::String(value), ConfigSource::Environment(variable)))
    }

    fn substitute_once(&self, template: &str) -> Result<String, ConfigurationError> {
        let mut output = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("${") {
            output.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                // unterminated placeholder is left as literal text
                output.push_str(&rest[start..]);
                return Ok(output);
            };

            let (key, default) = split_placeholder(&after[..end]);
            match self.lookup(key) {
                Some((value, _)) => output.push_str(&value_to_string(&value)),
                None => match default {
                    Some(default) => output.push_str(default),
                    None => {
                        return Err(ConfigurationError::UnresolvedPlaceholder(key.to_string()))
                    }
                },
            }

            rest = &after[end + 1..];
        }

        output.push_str(rest);
        Ok(output)
    }
}

impl ValueResolver for ConfigurationProperties {
    fn resolve_value(&self, expression: &str) -> Result<JsonValue, ErrorPtr> {
        self.resolve_expression(expression).map_err(convert_error)
    }
}

fn split_placeholder(inner: &str) -> (&str, Option<&str>) {
    match inner.split_once(':') {
        Some((key, default)) => (key.trim(), Some(default)),
        None => (inner.trim(), None),
    }
}

fn value_to_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(text) => text.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

/// Coerces a stored value into a caller type, per the store's coercion table: the stored
/// representation directly, then string reinterpretation (numeric/JSON literals, truthy/falsy
/// word sets, comma-separated lists).
fn coerce<T: DeserializeOwned>(key: &str, value: &JsonValue) -> Result<T, ConfigurationError> {
    if let Ok(coerced) = serde_json::from_value::<T>(value.clone()) {
        return Ok(coerced);
    }

    if let JsonValue::String(raw) = value {
        let trimmed = raw.trim();

        if let Ok(literal) = serde_json::from_str::<JsonValue>(trimmed) {
            if let Ok(coerced) = serde_json::from_value::<T>(literal) {
                return Ok(coerced);
            }
        }

        let as_bool = match trimmed.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        };
        if let Some(flag) = as_bool {
            if let Ok(coerced) = serde_json::from_value::<T>(JsonValue::Bool(flag)) {
                return Ok(coerced);
            }
        }

        let items = trimmed
            .split(',')
            .map(|item| JsonValue::String(item.trim().to_string()))
            .collect();
        if let Ok(coerced) = serde_json::from_value::<T>(JsonValue::Array(items)) {
            return Ok(coerced);
        }
    }

    Err(ConfigurationError::Coercion {
        key: key.to_string(),
        requested: type_name::<T>().to_string(),
        message: format!("incompatible value: {value}"),
    })
}

fn find_document(directory: &Path, stem: &str) -> Option<(PathBuf, FileFormat, String)> {
    EXTENSIONS.iter().find_map(|(extension, format)| {
        let name = format!("{stem}.{extension}");
        let path = directory.join(&name);
        path.is_file().then_some((path, *format, name))
    })
}

fn parse_file(path: &Path, format: FileFormat) -> Result<JsonValue, ConfigurationError> {
    let display = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|error| ConfigurationError::FileRead {
        path: display.clone(),
        message: error.to_string(),
    })?;
    parse_str(&text, format, &display)
}

fn parse_str(
    text: &str,
    format: FileFormat,
    origin: &str,
) -> Result<JsonValue, ConfigurationError> {
    let parsed = Config::builder()
        .add_source(File::from_str(text, format))
        .build()
        .map_err(|error| ConfigurationError::Malformed {
            path: origin.to_string(),
            message: error.to_string(),
        })?;

    let table = parsed
        .collect()
        .map_err(|error| ConfigurationError::Malformed {
            path: origin.to_string(),
            message: error.to_string(),
        })?;

    Ok(JsonValue::Object(
        table
            .into_iter()
            .map(|(key, value)| (key, config_to_json(value)))
            .collect(),
    ))
}

fn config_to_json(value: ConfigValue) -> JsonValue {
    match value.kind {
        ValueKind::Nil => JsonValue::Null,
        ValueKind::Boolean(flag) => JsonValue::Bool(flag),
        ValueKind::I64(number) => JsonValue::Number(number.into()),
        ValueKind::U64(number) => JsonValue::Number(number.into()),
        ValueKind::I128(number) => i64::try_from(number)
            .map(|n| JsonValue::Number(n.into()))
            .unwrap_or_else(|_| JsonValue::String(number.to_string())),
        ValueKind::U128(number) => u64::try_from(number)
            .map(|n| JsonValue::Number(n.into()))
            .unwrap_or_else(|_| JsonValue::String(number.to_string())),
        ValueKind::Float(number) => JsonNumber::from_f64(number)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        ValueKind::String(text) => JsonValue::String(text),
        ValueKind::Table(table) => JsonValue::Object(
            table
                .into_iter()
                .map(|(key, value)| (key, config_to_json(value)))
                .collect::<JsonMap<_, _>>(),
        ),
        ValueKind::Array(items) => {
            JsonValue::Array(items.into_iter().map(config_to_json).collect())
        }
    }
}

/// Flattens a nested document into dot-joined keys and merges it over existing entries.
fn merge_document(
    entries: &mut FxHashMap<String, (JsonValue, ConfigSource)>,
    document: JsonValue,
    source: &ConfigSource,
) {
    fn walk(
        entries: &mut FxHashMap<String, (JsonValue, ConfigSource)>,
        prefix: &str,
        value: JsonValue,
        source: &ConfigSource,
    ) {
        match value {
            JsonValue::Object(map) => {
                for (key, nested) in map {
                    let path = if prefix.is_empty() {
                        key
                    } else {
                        format!("{prefix}.{key}")
                    };
                    walk(entries, &path, nested, source);
                }
            }
            leaf => {
                entries.insert(prefix.to_string(), (leaf, source.clone()));
            }
        }
    }

    walk(entries, "", document, source);
}
