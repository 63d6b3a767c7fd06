//! Core server-related functionality: materializes the route table into an axum [Router] and
//! runs a hyper server wired to the application's shutdown signal. [ServerRunner] registers
//! itself as a component, so linking this crate is enough to get a serving application.

use crate::error::RouteError;
use crate::pipeline::{PipelineSettings, RequestPipeline};
use crate::route::{Route, RouteTable};
use axum::body::Body;
use axum::extract::{ConnectInfo, Path};
use axum::http::header::CONTENT_TYPE;
use axum::http::{Method, Request, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{on, MethodFilter};
use axum::Router;
use mitsuki::application::Runtime;
use mitsuki::properties::{ConfigurationError, ConfigurationProperties};
use mitsuki::runner::{ApplicationRunner, ApplicationRunnerPtr};
use mitsuki_di::alias_cast;
use mitsuki_di::component::ComponentKind;
use mitsuki_di::descriptor::ComponentDescriptor;
use mitsuki_di::future::{BoxFuture, FutureExt};
use mitsuki_di::instance_provider::{convert_error, ErrorPtr};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Server behavior derived from the `mitsuki.server.*` configuration keys.
#[derive(Clone, Debug)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub debug: bool,
    pub ignore_trailing_slash: bool,
    pub request_timeout: Option<Duration>,
}

impl ServerSettings {
    pub fn from_properties(
        properties: &ConfigurationProperties,
    ) -> Result<Self, ConfigurationError> {
        let port = properties.get_i64("mitsuki.server.port", 8000)?;
        let port = u16::try_from(port).map_err(|_| ConfigurationError::Coercion {
            key: "mitsuki.server.port".to_string(),
            requested: "u16".to_string(),
            message: format!("{port} is out of range"),
        })?;

        Ok(Self {
            host: properties.get_string("mitsuki.server.host", "127.0.0.1")?,
            port,
            debug: properties.get_bool("mitsuki.server.debug", false)?,
            ignore_trailing_slash: properties
                .get_bool("mitsuki.server.ignore_trailing_slash", false)?,
            request_timeout: properties
                .get_typed::<u64>("mitsuki.server.request_timeout_ms")?
                .map(Duration::from_millis),
        })
    }
}

/// Materializes the route table into an axum router backed by the request pipeline.
pub fn build_router(
    table: &RouteTable,
    pipeline: Arc<RequestPipeline>,
) -> Result<Router, RouteError> {
    let mut router = Router::new();

    for route in table.routes() {
        let filter = method_filter(&route.method).ok_or_else(|| RouteError::RouteConflict {
            method: route.method.clone(),
            pattern: route.pattern.clone(),
        })?;
        let path = axum_path(&route.pattern);

        let pipeline = pipeline.clone();
        let route: Arc<Route> = route.clone();
        router = router.route(
            &path,
            on(
                filter,
                move |ConnectInfo(client_addr): ConnectInfo<SocketAddr>,
                      Path(params): Path<HashMap<String, String>>,
                      request: Request<Body>| {
                    let pipeline = pipeline.clone();
                    let route = route.clone();
                    async move {
                        pipeline
                            .handle(&route, request, params, Some(client_addr))
                            .await
                    }
                },
            ),
        );
    }

    Ok(router.fallback(|| async {
        (
            StatusCode::NOT_FOUND,
            [(CONTENT_TYPE, "application/json")],
            json!({ "error": "Not Found" }).to_string(),
        )
            .into_response()
    }))
}

/// `{name}` placeholders become axum `:name` captures.
fn axum_path(pattern: &str) -> String {
    pattern
        .split('/')
        .map(|segment| {
            segment
                .strip_prefix('{')
                .and_then(|rest| rest.strip_suffix('}'))
                .map(|name| format!(":{name}"))
                .unwrap_or_else(|| segment.to_string())
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn method_filter(method: &Method) -> Option<MethodFilter> {
    match *method {
        Method::GET => Some(MethodFilter::GET),
        Method::POST => Some(MethodFilter::POST),
        Method::PUT => Some(MethodFilter::PUT),
        Method::PATCH => Some(MethodFilter::PATCH),
        Method::DELETE => Some(MethodFilter::DELETE),
        _ => None,
    }
}

/// Application runner serving the route table over HTTP until the shutdown signal fires.
pub struct ServerRunner;

impl ApplicationRunner for ServerRunner {
    fn run(&self, runtime: Arc<Runtime>) -> BoxFuture<'_, Result<(), ErrorPtr>> {
        async move {
            let settings =
                ServerSettings::from_properties(runtime.properties()).map_err(convert_error)?;

            let table = RouteTable::from_container(
                runtime.container(),
                settings.ignore_trailing_slash,
            )
            .await
            .map_err(convert_error)?;

            let pipeline = Arc::new(
                RequestPipeline::new(
                    runtime.container().clone(),
                    PipelineSettings {
                        debug: settings.debug,
                        timeout: settings.request_timeout,
                    },
                )
                .await?,
            );

            let router = build_router(&table, pipeline).map_err(convert_error)?;
            let address: SocketAddr = format!("{}:{}", settings.host, settings.port)
                .parse()
                .map_err(convert_error)?;

            info!(%address, routes = table.len(), "Starting web server.");

            let mut shutdown = runtime.shutdown_receiver();
            axum::Server::try_bind(&address)
                .map_err(convert_error)?
                .serve(router.into_make_service_with_connect_info::<SocketAddr>())
                .with_graceful_shutdown(async move {
                    let _ = shutdown.changed().await;
                })
                .await
                .map_err(convert_error)?;

            info!("Web server stopped.");

            Ok(())
        }
        .boxed()
    }
}

/// Descriptor for the built-in server runner, submitted statically below.
pub fn server_runner_component() -> ComponentDescriptor {
    ComponentDescriptor::new::<ServerRunner>("ServerRunner", ComponentKind::Generic)
        .with_alias::<ApplicationRunnerPtr>(alias_cast!(ServerRunner => ApplicationRunnerPtr))
        .with_factory(|_| async { Ok(ServerRunner) })
}

mitsuki_di::submit_component!(server_runner_component);
