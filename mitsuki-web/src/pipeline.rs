//! The per-request pipeline: argument binding, controller invocation through the container,
//! egress validation and response framing. A matched request is bound, invoked, shaped and
//! written in that order; any failure short-circuits into a classified error response, so errors
//! never propagate into the event loop.

use crate::error::RequestError;
use crate::multipart::{enforce_constraints, parse_multipart, MultipartBody};
use crate::request::RequestContext;
use crate::response::{ResponseBody, ResponseEntity};
use crate::route::{BindingKind, BoundArguments, BoundValue, Route};
use crate::serialization::{JsonEncoderRegistry, JSON_ENCODERS_COMPONENT};
use axum::body::{Body, Bytes};
use axum::http::header::CONTENT_TYPE;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use fxhash::FxHashMap;
use mitsuki_di::container::Container;
use mitsuki_di::instance_provider::ErrorPtr;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Pipeline behavior derived from server configuration.
#[derive(Clone, Debug, Default)]
pub struct PipelineSettings {
    /// Include error detail in 500 bodies; production profiles keep it off.
    pub debug: bool,
    /// Per-request budget; expiry cancels the in-flight handler cooperatively.
    pub timeout: Option<Duration>,
}

/// Dispatches matched requests to controller handlers resolved from the container.
pub struct RequestPipeline {
    container: Arc<Container>,
    encoders: Arc<JsonEncoderRegistry>,
    settings: PipelineSettings,
}

impl RequestPipeline {
    /// Creates a pipeline, picking up an application-supplied encoder registry from the reserved
    /// [JSON_ENCODERS_COMPONENT] component when present.
    pub async fn new(
        container: Arc<Container>,
        settings: PipelineSettings,
    ) -> Result<Self, ErrorPtr> {
        let encoders = if container.contains(JSON_ENCODERS_COMPONENT) {
            container
                .instance_typed::<JsonEncoderRegistry>(JSON_ENCODERS_COMPONENT)
                .await
                .map_err(|error| Arc::new(error) as ErrorPtr)?
        } else {
            Arc::new(JsonEncoderRegistry::new())
        };

        Ok(Self {
            container,
            encoders,
            settings,
        })
    }

    /// Runs the full request lifecycle for a matched route, always producing a response.
    pub async fn handle(
        &self,
        route: &Arc<Route>,
        request: Request<Body>,
        path_params: HashMap<String, String>,
        client_addr: Option<SocketAddr>,
    ) -> Response {
        let outcome = match self.settings.timeout {
            Some(limit) => {
                match tokio::time::timeout(
                    limit,
                    self.process(route, request, path_params, client_addr),
                )
                .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(RequestError::Timeout),
                }
            }
            None => self.process(route, request, path_params, client_addr).await,
        };

        outcome.unwrap_or_else(|error| self.error_response(&error))
    }

    async fn process(
        &self,
        route: &Arc<Route>,
        request: Request<Body>,
        path_params: HashMap<String, String>,
        client_addr: Option<SocketAddr>,
    ) -> Result<Response, RequestError> {
        let arguments = bind_arguments(route, request, &path_params, client_addr).await?;

        let controller = self
            .container
            .instance_by_name(&route.controller)
            .await
            .map_err(|error| RequestError::Handler(Arc::new(error)))?;

        let entity = (route.handler)(controller, arguments)
            .await
            .map_err(classify_handler_error)?;

        self.shape(route, entity)
    }

    fn shape(&self, route: &Arc<Route>, mut entity: ResponseEntity) -> Result<Response, RequestError> {
        if let ResponseBody::Any(payload) = &entity.body {
            let encoded = self.encoders.encode(payload.as_ref()).ok_or_else(|| {
                RequestError::Serialization(
                    "no JSON encoder registered for response payload type".to_string(),
                )
            })?;
            entity.body = ResponseBody::Json(encoded);
        }

        if let Some(contract) = &route.descriptor.egress {
            if let ResponseBody::Json(document) = &entity.body {
                match contract.check(document) {
                    Ok(validated) => entity.body = ResponseBody::Json(validated),
                    Err(message) => {
                        error!(
                            route = %route.pattern,
                            expected = %contract.type_name,
                            %message,
                            value = %document,
                            "Response value failed egress validation."
                        );
                        return Err(RequestError::EgressValidation {
                            type_name: contract.type_name.to_string(),
                            message,
                        });
                    }
                }
            }
        }

        if !route.descriptor.egress_exclusions.is_empty() {
            if let ResponseBody::Json(document) = &mut entity.body {
                strip_fields(document, &route.descriptor.egress_exclusions);
            }
        }

        write_entity(entity)
    }

    fn error_response(&self, error: &RequestError) -> Response {
        let status = error.status();
        if status.is_server_error() {
            error!(%error, "Request failed.");
        } else {
            debug!(%error, "Rejecting request.");
        }

        let body = error.public_body(self.settings.debug);
        json_response(status, &body)
    }
}

async fn bind_arguments(
    route: &Arc<Route>,
    request: Request<Body>,
    path_params: &HashMap<String, String>,
    client_addr: Option<SocketAddr>,
) -> Result<BoundArguments, RequestError> {
    let parameters = &route.descriptor.parameters;
    let (parts, body) = request.into_parts();

    let query: FxHashMap<String, String> = parts
        .uri
        .query()
        .and_then(|raw| serde_urlencoded::from_str::<Vec<(String, String)>>(raw).ok())
        .map(|pairs| pairs.into_iter().collect())
        .unwrap_or_default();

    let wants_body = parameters
        .iter()
        .any(|parameter| matches!(parameter.kind, BindingKind::Body));
    let wants_multipart = parameters.iter().any(|parameter| {
        matches!(
            parameter.kind,
            BindingKind::MultipartFile { .. } | BindingKind::MultipartField { .. }
        )
    });

    let body_bytes = if wants_body || wants_multipart {
        hyper::body::to_bytes(body)
            .await
            .map_err(|error| RequestError::Binding {
                parameter: "body".to_string(),
                message: format!("cannot read request body: {error}"),
            })?
    } else {
        Bytes::new()
    };

    let document = wants_body
        .then(|| parse_json_body(&body_bytes))
        .transpose()?;

    let multipart = if wants_multipart {
        let content_type = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        parse_multipart(content_type, body_bytes.clone()).await?
    } else {
        MultipartBody::default()
    };
    let total_upload_size: usize = multipart.files.values().map(|file| file.size()).sum();

    let context = Arc::new(RequestContext::new(
        parts.method.clone(),
        parts.uri.path().to_string(),
        query.clone(),
        parts.headers.clone(),
        client_addr,
    ));

    let mut entries = Vec::with_capacity(parameters.len());
    for parameter in parameters {
        let value = match &parameter.kind {
            BindingKind::Path { value_type } => {
                let raw = path_params.get(&parameter.name).ok_or_else(|| {
                    RequestError::MissingParameter {
                        parameter: parameter.name.clone(),
                    }
                })?;
                BoundValue::Json(value_type.parse(&parameter.name, raw)?)
            }
            BindingKind::Query {
                value_type,
                default,
            } => match query.get(&parameter.name) {
                Some(raw) => BoundValue::Json(value_type.parse(&parameter.name, raw)?),
                None => match default {
                    Some(default) => BoundValue::Json(default.clone()),
                    None => {
                        return Err(RequestError::MissingParameter {
                            parameter: parameter.name.clone(),
                        })
                    }
                },
            },
            BindingKind::Body => {
                let document = document.clone().unwrap_or(JsonValue::Null);
                match &route.descriptor.ingress {
                    Some(contract) => {
                        BoundValue::Json(contract.check(&document).map_err(|message| {
                            RequestError::IngressValidation {
                                type_name: contract.type_name.to_string(),
                                message,
                            }
                        })?)
                    }
                    None => BoundValue::Json(document),
                }
            }
            BindingKind::Request => BoundValue::Request(context.clone()),
            BindingKind::MultipartFile { constraints } => {
                match multipart.files.get(&parameter.name) {
                    Some(file) => {
                        enforce_constraints(&parameter.name, file, total_upload_size, constraints)?;
                        BoundValue::File(file.clone())
                    }
                    None if constraints.required => {
                        return Err(RequestError::MissingParameter {
                            parameter: parameter.name.clone(),
                        })
                    }
                    None => BoundValue::Absent,
                }
            }
            BindingKind::MultipartField { default } => {
                match multipart.fields.get(&parameter.name).cloned().or_else(|| default.clone()) {
                    Some(text) => BoundValue::Json(JsonValue::String(text)),
                    None => {
                        return Err(RequestError::MissingParameter {
                            parameter: parameter.name.clone(),
                        })
                    }
                }
            }
        };
        entries.push((parameter.name.clone(), value));
    }

    Ok(BoundArguments::new(entries))
}

fn parse_json_body(bytes: &Bytes) -> Result<JsonValue, RequestError> {
    if bytes.is_empty() {
        return Ok(JsonValue::Null);
    }
    serde_json::from_slice(bytes).map_err(|error| RequestError::Binding {
        parameter: "body".to_string(),
        message: format!("malformed JSON body: {error}"),
    })
}

/// Handler-side errors that are really classified request faults (e.g. typed access through
/// [BoundArguments]) keep their classification; everything else is an opaque handler error.
fn classify_handler_error(error: ErrorPtr) -> RequestError {
    if let Some(request_error) = error.downcast_ref::<RequestError>() {
        return request_error.clone();
    }
    RequestError::Handler(error)
}

/// Removes the named fields from every nested mapping, traversing arrays.
pub(crate) fn strip_fields(value: &mut JsonValue, exclusions: &[String]) {
    match value {
        JsonValue::Object(map) => {
            map.retain(|key, _| !exclusions.iter().any(|excluded| excluded == key));
            for nested in map.values_mut() {
                strip_fields(nested, exclusions);
            }
        }
        JsonValue::Array(items) => {
            for item in items {
                strip_fields(item, exclusions);
            }
        }
        _ => {}
    }
}

fn write_entity(entity: ResponseEntity) -> Result<Response, RequestError> {
    let explicit = entity.explicit_content_type().map(str::to_string);

    let (bytes, detected) = match entity.body {
        ResponseBody::Empty => (Vec::new(), "application/json"),
        ResponseBody::Json(document) => (
            serde_json::to_vec(&document)
                .map_err(|error| RequestError::Serialization(error.to_string()))?,
            "application/json",
        ),
        ResponseBody::Text(text) => (text.into_bytes(), "text/plain; charset=utf-8"),
        ResponseBody::Bytes(bytes) => (bytes, "application/octet-stream"),
        ResponseBody::Any(_) => {
            return Err(RequestError::Serialization(
                "type-erased payload reached response framing unencoded".to_string(),
            ))
        }
    };

    let mut builder = axum::http::Response::builder().status(entity.status);
    for (name, value) in &entity.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if explicit.is_none() {
        builder = builder.header(CONTENT_TYPE, detected);
    }

    builder
        .body(axum::body::boxed(axum::body::Full::from(bytes)))
        .map_err(|error| RequestError::Serialization(error.to_string()))
}

fn json_response(status: StatusCode, body: &JsonValue) -> Response {
    let bytes = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    axum::http::Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(axum::body::boxed(axum::body::Full::from(bytes)))
        .unwrap_or_else(|_| {
            let mut fallback = Response::new(axum::body::boxed(axum::body::Empty::new()));
            *fallback.status_mut() = status;
            fallback
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::{
        handler, ParamBinding, RouteDescriptor, RouteTable, ValueType,
    };
    use crate::controller::Controller;
    use mitsuki_di::alias_cast;
    use mitsuki_di::component::ComponentKind;
    use mitsuki_di::descriptor::ComponentDescriptor;
    use mitsuki_di::registry::ComponentRegistry;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Serialize, Deserialize)]
    struct CreateUser {
        name: String,
        #[serde(default = "default_age")]
        age: i64,
    }

    fn default_age() -> i64 {
        18
    }

    #[derive(Serialize, Deserialize)]
    struct UserView {
        id: i64,
        name: String,
    }

    struct UsersController;

    impl Controller for UsersController {
        fn base_path(&self) -> Option<String> {
            Some("/api/users".to_string())
        }

        fn routes(&self) -> Vec<RouteDescriptor> {
            vec![
                RouteDescriptor::post("/{id}")
                    .named("create_user")
                    .with_param(ParamBinding::path("id", ValueType::Integer))
                    .with_param(
                        ParamBinding::query("notify", ValueType::Boolean)
                            .with_default(json!(false)),
                    )
                    .with_param(ParamBinding::body())
                    .consumes::<CreateUser>()
                    .with_handler(handler::<UsersController, _, _>(|_, args| async move {
                        let id: i64 = args.get("id")?;
                        let notify: bool = args.get("notify")?;
                        let body: CreateUser = args.get("body")?;
                        ResponseEntity::created().body(&json!({
                            "id": id,
                            "name": body.name,
                            "age": body.age,
                            "notify": notify,
                        }))
                    })),
                RouteDescriptor::get("/{id}")
                    .named("get_user")
                    .with_param(ParamBinding::path("id", ValueType::Integer))
                    .produces::<UserView>()
                    .with_handler(handler::<UsersController, _, _>(|_, args| async move {
                        let id: i64 = args.get("id")?;
                        if id == 0 {
                            // shape violation: missing `name`
                            return ResponseEntity::ok().body(&json!({ "id": id }));
                        }
                        ResponseEntity::of(&UserView {
                            id,
                            name: "A".to_string(),
                        })
                    })),
                RouteDescriptor::get("/{id}/profile")
                    .named("get_profile")
                    .with_param(ParamBinding::path("id", ValueType::Integer))
                    .exclude_fields(["password_hash", "admin_notes"])
                    .with_handler(handler::<UsersController, _, _>(|_, args| async move {
                        let id: i64 = args.get("id")?;
                        ResponseEntity::ok().body(&json!({
                            "user": {
                                "id": id,
                                "password_hash": "x",
                                "profile": { "bio": "b", "admin_notes": "n" },
                            }
                        }))
                    })),
            ]
        }
    }

    async fn pipeline_and_table() -> (RequestPipeline, RouteTable) {
        let mut registry = ComponentRegistry::new();
        registry.register(
            ComponentDescriptor::new::<UsersController>(
                "UsersController",
                ComponentKind::Controller,
            )
            .with_alias::<dyn Controller + Send + Sync>(
                alias_cast!(UsersController => dyn Controller + Send + Sync),
            )
            .with_factory(|_| async { Ok(UsersController) }),
        );

        let container = Arc::new(Container::resolve(registry, "").await.unwrap());
        let table = RouteTable::from_container(&container, false).await.unwrap();
        let pipeline = RequestPipeline::new(container, PipelineSettings::default())
            .await
            .unwrap();
        (pipeline, table)
    }

    fn find_route<'t>(table: &'t RouteTable, name: &str) -> &'t Arc<Route> {
        table
            .routes()
            .iter()
            .find(|route| route.descriptor.handler_name == name)
            .unwrap()
    }

    async fn body_json(response: Response) -> JsonValue {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn should_bind_path_query_and_body() {
        let (pipeline, table) = pipeline_and_table().await;
        let route = find_route(&table, "create_user");

        let request = Request::builder()
            .method("POST")
            .uri("/api/users/42?notify=true")
            .body(Body::from(r#"{"name":"A","age":30}"#))
            .unwrap();
        let params = HashMap::from([("id".to_string(), "42".to_string())]);

        let response = pipeline.handle(route, request, params, None).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            body_json(response).await,
            json!({ "id": 42, "name": "A", "age": 30, "notify": true })
        );
    }

    #[tokio::test]
    async fn should_apply_serde_defaults_and_query_default() {
        let (pipeline, table) = pipeline_and_table().await;
        let route = find_route(&table, "create_user");

        let request = Request::builder()
            .method("POST")
            .uri("/api/users/7")
            .body(Body::from(r#"{"name":"B"}"#))
            .unwrap();
        let params = HashMap::from([("id".to_string(), "7".to_string())]);

        let body = body_json(pipeline.handle(route, request, params, None).await).await;
        assert_eq!(body["age"], 18);
        assert_eq!(body["notify"], false);
    }

    #[tokio::test]
    async fn should_reject_uncoercible_path_parameter() {
        let (pipeline, table) = pipeline_and_table().await;
        let route = find_route(&table, "create_user");

        let request = Request::builder()
            .method("POST")
            .uri("/api/users/abc")
            .body(Body::from(r#"{"name":"A"}"#))
            .unwrap();
        let params = HashMap::from([("id".to_string(), "abc".to_string())]);

        let response = pipeline.handle(route, request, params, None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["details"]["parameter"], "id");
    }

    #[tokio::test]
    async fn should_reject_body_failing_ingress_contract() {
        let (pipeline, table) = pipeline_and_table().await;
        let route = find_route(&table, "create_user");

        let request = Request::builder()
            .method("POST")
            .uri("/api/users/1")
            .body(Body::from(r#"{"age":30}"#))
            .unwrap();
        let params = HashMap::from([("id".to_string(), "1".to_string())]);

        let response = pipeline.handle(route, request, params, None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("CreateUser"));
    }

    #[tokio::test]
    async fn should_reject_response_failing_egress_contract() {
        let (pipeline, table) = pipeline_and_table().await;
        let route = find_route(&table, "get_user");

        let request = Request::builder()
            .method("GET")
            .uri("/api/users/0")
            .body(Body::empty())
            .unwrap();
        let params = HashMap::from([("id".to_string(), "0".to_string())]);

        let response = pipeline.handle(route, request, params, None).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        // opaque body outside debug mode
        assert_eq!(
            body_json(response).await,
            json!({ "error": "Internal server error" })
        );
    }

    #[tokio::test]
    async fn should_strip_excluded_fields_recursively() {
        let (pipeline, table) = pipeline_and_table().await;
        let route = find_route(&table, "get_profile");

        let request = Request::builder()
            .method("GET")
            .uri("/api/users/1/profile")
            .body(Body::empty())
            .unwrap();
        let params = HashMap::from([("id".to_string(), "1".to_string())]);

        let response = pipeline.handle(route, request, params, None).await;
        assert_eq!(
            body_json(response).await,
            json!({ "user": { "id": 1, "profile": { "bio": "b" } } })
        );
    }

    #[tokio::test]
    async fn should_time_out_slow_handlers() {
        struct SlowController;

        impl Controller for SlowController {
            fn routes(&self) -> Vec<RouteDescriptor> {
                vec![RouteDescriptor::get("/slow")
                    .named("slow")
                    .with_handler(handler::<SlowController, _, _>(|_, _| async {
                        tokio::time::sleep(Duration::from_millis(500)).await;
                        Ok(ResponseEntity::no_content())
                    }))]
            }
        }

        let mut registry = ComponentRegistry::new();
        registry.register(
            ComponentDescriptor::new::<SlowController>("SlowController", ComponentKind::Controller)
                .with_alias::<dyn Controller + Send + Sync>(
                    alias_cast!(SlowController => dyn Controller + Send + Sync),
                )
                .with_factory(|_| async { Ok(SlowController) }),
        );
        let container = Arc::new(Container::resolve(registry, "").await.unwrap());
        let table = RouteTable::from_container(&container, false).await.unwrap();
        let pipeline = RequestPipeline::new(
            container,
            PipelineSettings {
                debug: false,
                timeout: Some(Duration::from_millis(50)),
            },
        )
        .await
        .unwrap();

        let request = Request::builder()
            .method("GET")
            .uri("/slow")
            .body(Body::empty())
            .unwrap();
        let response = pipeline
            .handle(&table.routes()[0], request, HashMap::new(), None)
            .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn should_bind_multipart_files_and_fields() {
        use crate::route::FileConstraints;

        struct UploadController;

        impl Controller for UploadController {
            fn routes(&self) -> Vec<RouteDescriptor> {
                vec![RouteDescriptor::post("/upload")
                    .named("upload")
                    .with_param(ParamBinding::multipart_file(
                        "attachment",
                        FileConstraints::required()
                            .max_file_size(1024)
                            .allow_content_types(["text/*"]),
                    ))
                    .with_param(
                        ParamBinding::multipart_field("description")
                            .with_field_default("untitled"),
                    )
                    .with_handler(handler::<UploadController, _, _>(|_, args| async move {
                        let file = args.file("attachment")?.ok_or_else(|| {
                            Arc::new(std::io::Error::new(
                                std::io::ErrorKind::NotFound,
                                "missing attachment",
                            )) as ErrorPtr
                        })?;
                        let description: String = args.get("description")?;
                        ResponseEntity::ok().body(&json!({
                            "file_name": file.file_name,
                            "size": file.size(),
                            "description": description,
                        }))
                    }))]
            }
        }

        let mut registry = ComponentRegistry::new();
        registry.register(
            ComponentDescriptor::new::<UploadController>(
                "UploadController",
                ComponentKind::Controller,
            )
            .with_alias::<dyn Controller + Send + Sync>(
                alias_cast!(UploadController => dyn Controller + Send + Sync),
            )
            .with_factory(|_| async { Ok(UploadController) }),
        );
        let container = Arc::new(Container::resolve(registry, "").await.unwrap());
        let table = RouteTable::from_container(&container, false).await.unwrap();
        let pipeline = RequestPipeline::new(container, PipelineSettings::default())
            .await
            .unwrap();

        let boundary = "mitsuki-test-boundary";
        let payload = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"attachment\"; filename=\"note.txt\"\r\n\
             Content-Type: text/plain\r\n\r\n\
             file contents\r\n\
             --{boundary}--\r\n"
        );
        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(payload))
            .unwrap();

        let response = pipeline
            .handle(&table.routes()[0], request, HashMap::new(), None)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({
                "file_name": "note.txt",
                "size": 13,
                "description": "untitled",
            })
        );
    }

    #[tokio::test]
    async fn should_reject_disallowed_upload_content_type() {
        use crate::route::FileConstraints;

        struct StrictController;

        impl Controller for StrictController {
            fn routes(&self) -> Vec<RouteDescriptor> {
                vec![RouteDescriptor::post("/upload")
                    .named("upload")
                    .with_param(ParamBinding::multipart_file(
                        "attachment",
                        FileConstraints::required().allow_content_types(["application/pdf"]),
                    ))
                    .with_handler(handler::<StrictController, _, _>(|_, _| async {
                        Ok(ResponseEntity::no_content())
                    }))]
            }
        }

        let mut registry = ComponentRegistry::new();
        registry.register(
            ComponentDescriptor::new::<StrictController>(
                "StrictController",
                ComponentKind::Controller,
            )
            .with_alias::<dyn Controller + Send + Sync>(
                alias_cast!(StrictController => dyn Controller + Send + Sync),
            )
            .with_factory(|_| async { Ok(StrictController) }),
        );
        let container = Arc::new(Container::resolve(registry, "").await.unwrap());
        let table = RouteTable::from_container(&container, false).await.unwrap();
        let pipeline = RequestPipeline::new(container, PipelineSettings::default())
            .await
            .unwrap();

        let boundary = "mitsuki-test-boundary";
        let payload = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"attachment\"; filename=\"pic.png\"\r\n\
             Content-Type: image/png\r\n\r\n\
             not a pdf\r\n\
             --{boundary}--\r\n"
        );
        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(payload))
            .unwrap();

        let response = pipeline
            .handle(&table.routes()[0], request, HashMap::new(), None)
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["details"]["parameter"], "attachment");
    }

    #[test]
    fn should_strip_fields_at_any_depth() {
        let mut value = json!({
            "user": {
                "id": 1,
                "password_hash": "x",
                "profile": { "bio": "b", "admin_notes": "n" },
                "sessions": [ { "token": "t", "admin_notes": "n" } ],
            }
        });
        strip_fields(
            &mut value,
            &["password_hash".to_string(), "admin_notes".to_string()],
        );
        assert_eq!(
            value,
            json!({
                "user": {
                    "id": 1,
                    "profile": { "bio": "b" },
                    "sessions": [ { "token": "t" } ],
                }
            })
        );
    }
}
