//! Route descriptors and the materialized route table. Controllers enumerate
//! [RouteDescriptor]s; after the container freezes, [RouteTable::from_container] combines them
//! with controller base paths, validates placeholder/parameter correspondence, rejects
//! conflicting `(method, pattern)` pairs and orders specific patterns before parameterized ones.
//! The table then stays immutable for the lifetime of the application, which is what allows the
//! OpenAPI view ([RouteTable::metadata]) to be read without synchronization.

use crate::controller::Controller;
use crate::error::{RequestError, RouteError};
use crate::response::ResponseEntity;
use axum::http::Method;
use derivative::Derivative;
use fxhash::FxHashSet;
use futures::future::BoxFuture;
use futures::FutureExt;
use mitsuki_di::component::ComponentKind;
use mitsuki_di::container::Container;
use mitsuki_di::instance_provider::{
    ComponentInstanceAnyPtr, ComponentInstancePtr, ErrorPtr,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::any::type_name;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

/// Declared type of a textual path or query parameter, driving coercion at binding time.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValueType {
    String,
    Integer,
    Float,
    Boolean,
    Uuid,
}

impl ValueType {
    pub(crate) fn parse(&self, parameter: &str, raw: &str) -> Result<JsonValue, RequestError> {
        let fail = |message: String| RequestError::Binding {
            parameter: parameter.to_string(),
            message,
        };

        match self {
            ValueType::String => Ok(JsonValue::String(raw.to_string())),
            ValueType::Integer => raw
                .parse::<i64>()
                .map(|number| JsonValue::Number(number.into()))
                .map_err(|_| fail(format!("'{raw}' is not an integer"))),
            ValueType::Float => raw
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(JsonValue::Number)
                .ok_or_else(|| fail(format!("'{raw}' is not a number"))),
            ValueType::Boolean => match raw.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(JsonValue::Bool(true)),
                "false" | "no" | "off" | "0" => Ok(JsonValue::Bool(false)),
                _ => Err(fail(format!("'{raw}' is not a boolean"))),
            },
            ValueType::Uuid => raw
                .parse::<Uuid>()
                .map(|id| JsonValue::String(id.to_string()))
                .map_err(|_| fail(format!("'{raw}' is not a UUID"))),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Integer => "integer",
            ValueType::Float => "float",
            ValueType::Boolean => "boolean",
            ValueType::Uuid => "uuid",
        }
    }
}

/// Size and content-type constraints for an uploaded file binding.
#[derive(Clone, Debug, Default)]
pub struct FileConstraints {
    pub max_file_size: Option<usize>,
    pub max_total_size: Option<usize>,
    /// Allowed content types; exact matches, or prefixes when ending in `/*`. Empty = any.
    pub allowed_content_types: Vec<String>,
    pub required: bool,
}

impl FileConstraints {
    pub fn required() -> Self {
        Self {
            required: true,
            ..Self::default()
        }
    }

    pub fn max_file_size(mut self, bytes: usize) -> Self {
        self.max_file_size = Some(bytes);
        self
    }

    pub fn max_total_size(mut self, bytes: usize) -> Self {
        self.max_total_size = Some(bytes);
        self
    }

    pub fn allow_content_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_content_types = types.into_iter().map(Into::into).collect();
        self
    }
}

/// How a single handler parameter is produced from the incoming request.
#[derive(Clone, Debug)]
pub enum BindingKind {
    Path {
        value_type: ValueType,
    },
    Query {
        value_type: ValueType,
        default: Option<JsonValue>,
    },
    Body,
    Request,
    MultipartFile {
        constraints: FileConstraints,
    },
    MultipartField {
        default: Option<String>,
    },
}

#[derive(Clone, Debug)]
pub struct ParamBinding {
    pub name: String,
    pub kind: BindingKind,
}

impl ParamBinding {
    pub fn path(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            kind: BindingKind::Path { value_type },
        }
    }

    pub fn query(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            kind: BindingKind::Query {
                value_type,
                default: None,
            },
        }
    }

    /// Default applied when the query entry is absent; an absent entry without a default is a
    /// 400.
    pub fn with_default(mut self, default: JsonValue) -> Self {
        if let BindingKind::Query { default: slot, .. } = &mut self.kind {
            *slot = Some(default);
        }
        self
    }

    pub fn body() -> Self {
        Self {
            name: "body".to_string(),
            kind: BindingKind::Body,
        }
    }

    pub fn request() -> Self {
        Self {
            name: "request".to_string(),
            kind: BindingKind::Request,
        }
    }

    pub fn multipart_file(name: impl Into<String>, constraints: FileConstraints) -> Self {
        Self {
            name: name.into(),
            kind: BindingKind::MultipartFile { constraints },
        }
    }

    pub fn multipart_field(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: BindingKind::MultipartField { default: None },
        }
    }

    pub fn with_field_default(mut self, default: impl Into<String>) -> Self {
        if let BindingKind::MultipartField { default: slot } = &mut self.kind {
            *slot = Some(default.into());
        }
        self
    }

    fn shape(&self) -> ParameterMetadata {
        let (kind, value_type, required) = match &self.kind {
            BindingKind::Path { value_type } => ("path", Some(value_type.name()), true),
            BindingKind::Query {
                value_type,
                default,
            } => ("query", Some(value_type.name()), default.is_none()),
            BindingKind::Body => ("body", None, true),
            BindingKind::Request => ("request", None, true),
            BindingKind::MultipartFile { constraints } => {
                ("multipart-file", None, constraints.required)
            }
            BindingKind::MultipartField { default } => {
                ("multipart-field", None, default.is_none())
            }
        };

        ParameterMetadata {
            name: self.name.clone(),
            kind: kind.to_string(),
            value_type: value_type.map(str::to_string),
            required,
        }
    }
}

/// Shape contract for a request body (ingress) or response value (egress). Validation runs the
/// document through `T`'s serde implementation, so serde defaults apply during materialization.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct TypeContract {
    pub type_name: String,
    #[derivative(Debug = "ignore")]
    validate: Arc<dyn Fn(&JsonValue) -> Result<JsonValue, String> + Send + Sync>,
}

impl TypeContract {
    pub fn of<T: Serialize + DeserializeOwned + 'static>() -> Self {
        Self {
            type_name: short_type_name(type_name::<T>()),
            validate: Arc::new(|value| {
                serde_json::from_value::<T>(value.clone())
                    .map_err(|error| error.to_string())
                    .and_then(|typed| {
                        serde_json::to_value(typed).map_err(|error| error.to_string())
                    })
            }),
        }
    }

    pub(crate) fn check(&self, value: &JsonValue) -> Result<JsonValue, String> {
        (self.validate)(value)
    }
}

/// Values bound for a single handler invocation, addressable by parameter name.
pub struct BoundArguments {
    entries: Vec<(String, BoundValue)>,
}

pub(crate) enum BoundValue {
    Json(JsonValue),
    Request(Arc<crate::request::RequestContext>),
    File(crate::multipart::UploadedFile),
    Absent,
}

impl BoundArguments {
    pub(crate) fn new(entries: Vec<(String, BoundValue)>) -> Self {
        Self { entries }
    }

    fn entry(&self, name: &str) -> Result<&BoundValue, ErrorPtr> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, value)| value)
            .ok_or_else(|| {
                Arc::new(RequestError::MissingParameter {
                    parameter: name.to_string(),
                }) as ErrorPtr
            })
    }

    /// Returns a bound value deserialized into the handler's type.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T, ErrorPtr> {
        match self.entry(name)? {
            BoundValue::Json(value) => serde_json::from_value(value.clone()).map_err(|error| {
                Arc::new(RequestError::Binding {
                    parameter: name.to_string(),
                    message: error.to_string(),
                }) as ErrorPtr
            }),
            _ => Err(Arc::new(RequestError::Binding {
                parameter: name.to_string(),
                message: "parameter is not a value binding".to_string(),
            }) as ErrorPtr),
        }
    }

    /// Returns the raw JSON document of a body binding.
    pub fn json(&self, name: &str) -> Result<&JsonValue, ErrorPtr> {
        match self.entry(name)? {
            BoundValue::Json(value) => Ok(value),
            _ => Err(Arc::new(RequestError::Binding {
                parameter: name.to_string(),
                message: "parameter is not a value binding".to_string(),
            }) as ErrorPtr),
        }
    }

    /// Returns the raw transport request view.
    pub fn request(&self, name: &str) -> Result<Arc<crate::request::RequestContext>, ErrorPtr> {
        match self.entry(name)? {
            BoundValue::Request(request) => Ok(request.clone()),
            _ => Err(Arc::new(RequestError::Binding {
                parameter: name.to_string(),
                message: "parameter is not a request binding".to_string(),
            }) as ErrorPtr),
        }
    }

    /// Returns an uploaded file, or `None` for an absent optional file.
    pub fn file(
        &self,
        name: &str,
    ) -> Result<Option<crate::multipart::UploadedFile>, ErrorPtr> {
        match self.entry(name)? {
            BoundValue::File(file) => Ok(Some(file.clone())),
            BoundValue::Absent => Ok(None),
            _ => Err(Arc::new(RequestError::Binding {
                parameter: name.to_string(),
                message: "parameter is not a file binding".to_string(),
            }) as ErrorPtr),
        }
    }
}

/// Type-erased route handler: receives the controller instance and the bound arguments.
pub type HandlerFunction = Arc<
    dyn Fn(ComponentInstanceAnyPtr, BoundArguments) -> BoxFuture<'static, Result<ResponseEntity, ErrorPtr>>
        + Send
        + Sync,
>;

/// Builds a [HandlerFunction] from a typed closure on controller `C`.
pub fn handler<C, F, Fut>(body: F) -> HandlerFunction
where
    C: Send + Sync + 'static,
    F: Fn(ComponentInstancePtr<C>, BoundArguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ResponseEntity, ErrorPtr>> + Send + 'static,
{
    Arc::new(move |instance: ComponentInstanceAnyPtr, arguments| {
        match instance.downcast::<C>() {
            Ok(controller) => body(controller, arguments).boxed(),
            Err(_) => {
                let error = Arc::new(RequestError::Handler(Arc::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("controller instance is not a {}", type_name::<C>()),
                )))) as ErrorPtr;
                async move { Err(error) }.boxed()
            }
        }
    })
}

/// A routed handler as declared on a controller; the path is the method-level suffix, combined
/// with the controller base path during table construction.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct RouteDescriptor {
    pub method: Method,
    pub path: String,
    pub handler_name: String,
    pub parameters: Vec<ParamBinding>,
    pub ingress: Option<TypeContract>,
    pub egress: Option<TypeContract>,
    pub egress_exclusions: Vec<String>,
    pub security_tags: Vec<String>,
    pub metadata: JsonValue,
    #[derivative(Debug = "ignore")]
    pub(crate) handler: Option<HandlerFunction>,
}

impl RouteDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            handler_name: String::new(),
            parameters: Vec::new(),
            ingress: None,
            egress: None,
            egress_exclusions: Vec::new(),
            security_tags: Vec::new(),
            metadata: JsonValue::Null,
            handler: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Names the handler method, for diagnostics and consumers of the metadata view.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.handler_name = name.into();
        self
    }

    pub fn with_param(mut self, parameter: ParamBinding) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Declares the ingress contract: the body is validated against `T` and materialized.
    pub fn consumes<T: Serialize + DeserializeOwned + 'static>(mut self) -> Self {
        self.ingress = Some(TypeContract::of::<T>());
        self
    }

    /// Declares the egress contract: the response value must match `T`'s shape.
    pub fn produces<T: Serialize + DeserializeOwned + 'static>(mut self) -> Self {
        self.egress = Some(TypeContract::of::<T>());
        self
    }

    /// Field names stripped recursively from every nested mapping of the response.
    pub fn exclude_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.egress_exclusions = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn secured<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.security_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Opaque metadata passed through to route-table consumers (e.g. OpenAPI generation).
    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_handler(mut self, handler: HandlerFunction) -> Self {
        self.handler = Some(handler);
        self
    }
}

/// A fully resolved route: combined pattern, owning controller component and descriptor.
pub struct Route {
    pub method: Method,
    pub pattern: String,
    pub controller: String,
    pub descriptor: RouteDescriptor,
    pub(crate) handler: HandlerFunction,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .field("controller", &self.controller)
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

/// Parameter shape exposed through the metadata view.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ParameterMetadata {
    pub name: String,
    pub kind: String,
    pub value_type: Option<String>,
    pub required: bool,
}

/// Read-only route description for documentation consumers; stable after startup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteMetadata {
    pub method: String,
    pub pattern: String,
    pub parameters: Vec<ParameterMetadata>,
    pub ingress_type: Option<String>,
    pub egress_type: Option<String>,
    pub security_tags: Vec<String>,
    pub metadata: JsonValue,
}

/// The immutable routing table built once after container freeze.
#[derive(Debug)]
pub struct RouteTable {
    routes: Vec<Arc<Route>>,
}

impl RouteTable {
    /// Enumerates controller components from the container and materializes the table.
    pub async fn from_container(
        container: &Arc<Container>,
        ignore_trailing_slash: bool,
    ) -> Result<Self, RouteError> {
        let controller_names: Vec<String> = container
            .descriptors()
            .filter(|descriptor| descriptor.kind == ComponentKind::Controller)
            .map(|descriptor| descriptor.name.clone())
            .collect();

        let mut routes = Vec::new();
        for name in controller_names {
            let controller = container
                .instance_typed::<dyn Controller + Send + Sync>(&name)
                .await
                .map_err(|error| RouteError::ControllerLookup(Arc::new(error)))?;

            let base = controller.base_path().unwrap_or_default();
            let controller_tags = controller.security_tags();
            for mut descriptor in controller.routes() {
                for tag in &controller_tags {
                    if !descriptor.security_tags.contains(tag) {
                        descriptor.security_tags.push(tag.clone());
                    }
                }
                routes.push(build_route(&name, &base, descriptor)?);
            }
        }

        let mut seen: FxHashSet<(Method, String)> = FxHashSet::default();
        for route in &routes {
            if !seen.insert((route.method.clone(), route.pattern.clone())) {
                return Err(RouteError::RouteConflict {
                    method: route.method.clone(),
                    pattern: route.pattern.clone(),
                });
            }
        }

        if ignore_trailing_slash {
            let mut twins = Vec::new();
            for route in &routes {
                if route.pattern.len() > 1 && !route.pattern.ends_with('/') {
                    let twin_pattern = format!("{}/", route.pattern);
                    if seen.insert((route.method.clone(), twin_pattern.clone())) {
                        twins.push(Arc::new(Route {
                            method: route.method.clone(),
                            pattern: twin_pattern,
                            controller: route.controller.clone(),
                            descriptor: route.descriptor.clone(),
                            handler: route.handler.clone(),
                        }));
                    }
                }
            }
            routes.extend(twins);
        }

        // specific patterns before parameterized ones
        routes.sort_by_key(|route| {
            let segments: Vec<_> = route.pattern.split('/').filter(|s| !s.is_empty()).collect();
            let placeholders = segments.iter().filter(|s| s.starts_with('{')).count();
            (
                placeholders,
                isize::try_from(segments.len()).map(|n| -n).unwrap_or(0),
                route.pattern.clone(),
            )
        });

        Ok(Self { routes })
    }

    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// The read-only view consumed by OpenAPI generation and other documentation tooling.
    pub fn metadata(&self) -> Vec<RouteMetadata> {
        self.routes
            .iter()
            .map(|route| RouteMetadata {
                method: route.method.to_string(),
                pattern: route.pattern.clone(),
                parameters: route
                    .descriptor
                    .parameters
                    .iter()
                    .map(ParamBinding::shape)
                    .collect(),
                ingress_type: route
                    .descriptor
                    .ingress
                    .as_ref()
                    .map(|contract| contract.type_name.to_string()),
                egress_type: route
                    .descriptor
                    .egress
                    .as_ref()
                    .map(|contract| contract.type_name.to_string()),
                security_tags: route.descriptor.security_tags.clone(),
                metadata: route.descriptor.metadata.clone(),
            })
            .collect()
    }
}

fn build_route(
    controller: &str,
    base: &str,
    descriptor: RouteDescriptor,
) -> Result<Arc<Route>, RouteError> {
    let pattern = combine_paths(base, &descriptor.path);
    let method = descriptor.method.clone();

    let placeholders = pattern_placeholders(&pattern);
    let mut unique = FxHashSet::default();
    for name in &placeholders {
        if !unique.insert(name.clone()) {
            return Err(RouteError::DuplicatePlaceholder {
                method,
                pattern,
                name: name.clone(),
            });
        }
    }

    let path_parameters: Vec<&str> = descriptor
        .parameters
        .iter()
        .filter(|parameter| matches!(parameter.kind, BindingKind::Path { .. }))
        .map(|parameter| parameter.name.as_str())
        .collect();

    for name in &placeholders {
        if !path_parameters.contains(&name.as_str()) {
            return Err(RouteError::UnboundPlaceholder {
                method,
                pattern,
                name: name.clone(),
            });
        }
    }
    for name in &path_parameters {
        if !placeholders.iter().any(|placeholder| placeholder == name) {
            return Err(RouteError::UnknownPathParameter {
                method,
                pattern,
                name: name.to_string(),
            });
        }
    }

    let handler = descriptor
        .handler
        .clone()
        .ok_or_else(|| RouteError::MissingHandler {
            method: method.clone(),
            pattern: pattern.clone(),
        })?;

    Ok(Arc::new(Route {
        method,
        pattern,
        controller: controller.to_string(),
        descriptor,
        handler,
    }))
}

fn combine_paths(base: &str, suffix: &str) -> String {
    let base = base.trim_end_matches('/');
    let suffix = suffix.trim_end_matches('/');

    if suffix.is_empty() {
        return if base.is_empty() {
            "/".to_string()
        } else {
            base.to_string()
        };
    }
    if base.is_empty() {
        return suffix.to_string();
    }
    format!("{base}{suffix}")
}

/// Shortens a fully qualified type name, dropping module paths inside generics too, e.g.
/// `serde_json::map::Map<alloc::string::String, serde_json::value::Value>` becomes
/// `Map<String, Value>`.
fn short_type_name(full: &str) -> String {
    let mut out = String::new();
    let mut ident = String::new();
    for c in full.chars() {
        if c == ':' {
            ident.clear();
        } else if c.is_alphanumeric() || c == '_' {
            ident.push(c);
        } else {
            out.push_str(&ident);
            ident.clear();
            out.push(c);
        }
    }
    out.push_str(&ident);
    out
}

fn pattern_placeholders(pattern: &str) -> Vec<String> {
    pattern
        .split('/')
        .filter_map(|segment| {
            segment
                .strip_prefix('{')
                .and_then(|rest| rest.strip_suffix('}'))
                .map(str::to_string)
        })
        .collect()
}
