//! A small layered blog application: repository -> service -> controller, plus a scheduled
//! cleanup task. Run with `MITSUKI_SERVER_PORT` unset to serve on 127.0.0.1:8000.

use mitsuki::application::Application;
use mitsuki::scheduler::trigger::Trigger;
use mitsuki::scheduler::{ScheduledTask, TaskRegistry};
use mitsuki_di::alias_cast;
use mitsuki_di::component::ComponentKind;
use mitsuki_di::descriptor::{ComponentDescriptor, DependencyDescriptor};
use mitsuki_di::instance_provider::ComponentInstancePtr;
use mitsuki_di::registry::ComponentRegistry;
use mitsuki_web::controller::Controller;
use mitsuki_web::response::ResponseEntity;
use mitsuki_web::route::{handler, ParamBinding, RouteDescriptor, ValueType};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

#[derive(Clone, Serialize, Deserialize)]
struct Post {
    id: i64,
    title: String,
    content: String,
}

#[derive(Serialize, Deserialize)]
struct CreatePost {
    title: String,
    content: String,
}

struct PostRepository {
    posts: Mutex<HashMap<i64, Post>>,
    next_id: AtomicI64,
}

impl PostRepository {
    fn save(&self, title: String, content: String) -> Post {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let post = Post { id, title, content };
        self.posts.lock().unwrap().insert(id, post.clone());
        post
    }

    fn find(&self, id: i64) -> Option<Post> {
        self.posts.lock().unwrap().get(&id).cloned()
    }

    fn count(&self) -> usize {
        self.posts.lock().unwrap().len()
    }
}

struct PostService {
    repository: ComponentInstancePtr<PostRepository>,
}

struct PostController {
    service: ComponentInstancePtr<PostService>,
}

impl Controller for PostController {
    fn base_path(&self) -> Option<String> {
        Some("/api/posts".to_string())
    }

    fn routes(&self) -> Vec<RouteDescriptor> {
        vec![
            RouteDescriptor::post("")
                .named("create_post")
                .with_param(ParamBinding::body())
                .consumes::<CreatePost>()
                .with_handler(handler::<PostController, _, _>(|controller, args| {
                    async move {
                        let request: CreatePost = args.get("body")?;
                        let post = controller
                            .service
                            .repository
                            .save(request.title, request.content);
                        ResponseEntity::created().body(&post)
                    }
                })),
            RouteDescriptor::get("/{id}")
                .named("get_post")
                .with_param(ParamBinding::path("id", ValueType::Integer))
                .produces::<Post>()
                .with_handler(handler::<PostController, _, _>(|controller, args| {
                    async move {
                        let id: i64 = args.get("id")?;
                        match controller.service.repository.find(id) {
                            Some(post) => ResponseEntity::of(&post),
                            None => Ok(ResponseEntity::not_found()
                                .json_value(json!({ "error": "no such post" }))),
                        }
                    }
                })),
        ]
    }
}

fn registry() -> ComponentRegistry {
    let mut registry = ComponentRegistry::with_submitted();
    registry.register(
        ComponentDescriptor::new::<PostRepository>("PostRepository", ComponentKind::Repository)
            .with_factory(|_| async {
                Ok(PostRepository {
                    posts: Mutex::new(HashMap::new()),
                    next_id: AtomicI64::new(1),
                })
            }),
    );
    registry.register(
        ComponentDescriptor::new::<PostService>("PostService", ComponentKind::Service)
            .with_dependency(DependencyDescriptor::by_type::<PostRepository>("repository"))
            .with_factory(|deps| async move {
                Ok(PostService {
                    repository: deps.instance::<PostRepository>("repository")?,
                })
            }),
    );
    registry.register(
        ComponentDescriptor::new::<PostController>("PostController", ComponentKind::Controller)
            .with_alias::<dyn Controller + Send + Sync>(
                alias_cast!(PostController => dyn Controller + Send + Sync),
            )
            .with_dependency(DependencyDescriptor::by_type::<PostService>("service"))
            .with_factory(|deps| async move {
                Ok(PostController {
                    service: deps.instance::<PostService>("service")?,
                })
            }),
    );
    registry
}

fn tasks() -> TaskRegistry {
    let mut tasks = TaskRegistry::new();
    tasks.register(ScheduledTask::new::<PostRepository, _, _>(
        "PostRepository",
        "report_size",
        Trigger::fixed_rate(30_000).expect("valid trigger"),
        |repository| async move {
            println!("currently storing {} posts", repository.count());
            Ok(())
        },
    ));
    tasks
}

#[tokio::main]
async fn main() {
    if let Err(error) = Application::new()
        .with_registry(registry())
        .with_tasks(tasks())
        .run()
        .await
    {
        eprintln!("application error: {error}");
        std::process::exit(1);
    }
}
