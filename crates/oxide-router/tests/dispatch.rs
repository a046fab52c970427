//! End-to-end dispatch through the application.

mod common;

use std::sync::Arc;

use serde_json::json;

use common::*;
use oxide_router::app::{CURRENT_PATH_ATTRIBUTE, ROUTE_ATTRIBUTE};
use oxide_router::container::BODY_PARSING_MIDDLEWARE;
use oxide_router::{
    Application, Container, FnHandler, MemoryCache, MemoryRouteLoader, Method, Request,
    RouteDescriptor, RouteKind, Router,
};

fn blog_loader() -> MemoryRouteLoader {
    MemoryRouteLoader::new()
        .route(RouteDescriptor::new(
            Method::Get,
            RouteKind::Page,
            "/blog/{year:\\d{4}}/{slug}",
            "Blog",
            "show",
        ))
        .route(RouteDescriptor::new(
            Method::Get,
            RouteKind::Page,
            "/blog/archive",
            "Blog",
            "archive",
        ))
        .route(RouteDescriptor::new(
            Method::Post,
            RouteKind::Page,
            "/blog/{id:\\d+}",
            "Blog",
            "update",
        ))
        .route(RouteDescriptor::new(
            Method::Get,
            RouteKind::Api,
            "/api/posts/{id:\\d+}",
            "Posts",
            "",
        ))
}

fn blog_app(log: &Log) -> Application {
    let container = Container::new()
        .handler("Blog", echo_handler("Blog", log))
        .handler("Posts", echo_handler("Posts", log));
    app(blog_loader(), container)
}

#[tokio::test]
async fn variable_page_route_binds_params_in_order() {
    let log = Log::default();
    let res = blog_app(&log)
        .handle(Request::get("/blog/2024/hello"), INSTALLED)
        .await
        .unwrap();

    assert_eq!(res.status, 200);
    let body = json_body(&res);
    assert_eq!(body["action"], "show");
    assert_eq!(body["params"], json!([["year", "2024"], ["slug", "hello"]]));
    assert_eq!(body["data"], json!({"year": "2024", "slug": "hello"}));
    assert_eq!(log.entries(), vec!["Blog:show"]);
}

#[tokio::test]
async fn static_route_dispatches() {
    let log = Log::default();
    let res = blog_app(&log)
        .handle(Request::get("/blog/archive"), INSTALLED)
        .await
        .unwrap();
    assert_eq!(json_body(&res)["action"], "archive");
}

#[tokio::test]
async fn empty_handler_method_uses_default_action() {
    let log = Log::default();
    let res = blog_app(&log)
        .handle(Request::get("/api/posts/7"), INSTALLED)
        .await
        .unwrap();
    assert_eq!(json_body(&res)["action"], "handle");
    assert_eq!(log.entries(), vec!["Posts:handle"]);
}

#[tokio::test]
async fn unmatched_path_renders_not_found() {
    let log = Log::default();
    let res = blog_app(&log)
        .handle(
            Request::get("/nowhere").header("Content-Type", "application/json"),
            INSTALLED,
        )
        .await
        .unwrap();

    assert_eq!(res.status, 404);
    assert_eq!(json_body(&res)["code"], 404);
    assert!(log.entries().is_empty());
}

#[tokio::test]
async fn wrong_method_lists_allowed_methods() {
    let log = Log::default();
    let app = blog_app(&log);

    let mut router = app.router().clone();
    router.load_routes(Method::Get, "/blog/1").await.unwrap();
    router.load_routes(Method::Post, "/blog/1").await.unwrap();
    let outcome = router.dispatch(Method::Get, "/blog/1").unwrap();
    assert_eq!(
        outcome,
        oxide_router::Dispatch::MethodNotAllowed(vec![Method::Post])
    );
}

#[tokio::test]
async fn method_not_allowed_sets_allow_header() {
    let log = Log::default();
    let container = Container::new().handler("Items", echo_handler("Items", &log));
    let mut app = Application::new(Router::new(""), container);
    app.add_route(Method::Post, "/items", "Items:create").unwrap();
    app.add_route(Method::Delete, "/items", "Items:clear").unwrap();

    let res = app.handle(Request::get("/items"), INSTALLED).await.unwrap();
    assert_eq!(res.status, 404);
    assert_eq!(res.get_header("Allow"), Some("POST, DELETE"));
    assert!(log.entries().is_empty());
}

#[tokio::test]
async fn head_uses_get_routes() {
    let log = Log::default();
    let res = blog_app(&log)
        .handle(Request::new(Method::Head, "/blog/archive"), INSTALLED)
        .await
        .unwrap();
    assert_eq!(res.status, 200);
    assert_eq!(log.entries(), vec!["Blog:archive"]);
}

#[tokio::test]
async fn parsed_body_overrides_path_params() {
    let log = Log::default();
    let mut app = blog_app(&log);
    app.add_middleware(BODY_PARSING_MIDDLEWARE);

    let req = Request::post("/blog/5")
        .header("Content-Type", "application/json")
        .body(r#"{"id": 99, "title": "Hi"}"#);
    let res = app.handle(req, INSTALLED).await.unwrap();

    let body = json_body(&res);
    assert_eq!(body["action"], "update");
    assert_eq!(body["data"], json!({"id": 99, "title": "Hi"}));
    assert_eq!(body["params"], json!([["id", "5"]]));
    assert_eq!(res.get_header("Content-Length"), Some(res.body.len().to_string().as_str()));
}

#[tokio::test]
async fn handler_sees_route_attributes() {
    let loader = MemoryRouteLoader::new().route(
        RouteDescriptor::new(Method::Get, RouteKind::Page, "/account", "Account", "show")
            .uuid("account-route")
            .auth("session"),
    );
    let container = Container::new()
        .handler("Account", || {
            FnHandler::new(|_action, req, res, _validator| {
                let body = json!({
                    "route": req.attribute(ROUTE_ATTRIBUTE),
                    "path": req.attribute(CURRENT_PATH_ATTRIBUTE),
                });
                Ok(Some(res.body(body.to_string())))
            })
        })
        .auth_factory(RecordingAuthFactory::new(&Log::default()));

    let res = app(loader, container)
        .handle(Request::get("/account"), INSTALLED)
        .await
        .unwrap();

    let body = json_body(&res);
    assert_eq!(body["path"], "/account");
    assert_eq!(body["route"]["auth"], "session");
}

#[tokio::test]
async fn handler_falls_back_to_stored_response() {
    let container = Container::new().handler("Quiet", || {
        FnHandler::new(|_action, _req, _res, _validator| Ok(None))
    });
    let mut app = Application::new(Router::new(""), container);
    app.add_route(Method::Get, "/quiet", "Quiet:run").unwrap();

    let res = app.handle(Request::get("/quiet"), INSTALLED).await.unwrap();
    assert_eq!(res.status, 200);
    assert!(res.body.is_empty());
}

#[tokio::test]
async fn route_table_is_cached_per_category() {
    let log = Log::default();
    let cache = Arc::new(MemoryCache::new());
    let container = Container::new().handler("Blog", echo_handler("Blog", &log));
    let router = Router::new("/site")
        .loader(Arc::new(blog_loader()))
        .cache(cache.clone());
    let app = Application::new(router, container);

    app.handle(Request::get("/site/blog/archive"), INSTALLED)
        .await
        .unwrap();
    app.handle(Request::get("/site/blog/2023/again"), INSTALLED)
        .await
        .unwrap();

    assert_eq!(cache.keys(), vec!["routes.router@/site.GET.page".to_string()]);
    assert_eq!(log.entries(), vec!["Blog:archive", "Blog:show"]);
}

#[tokio::test]
async fn unknown_handler_renders_error() {
    let mut app = Application::new(Router::new(""), Container::new());
    app.add_route(Method::Get, "/ghost", "Ghost:boo").unwrap();

    let res = app
        .handle(
            Request::get("/ghost").header("Content-Type", "application/json"),
            INSTALLED,
        )
        .await
        .unwrap();
    assert_eq!(res.status, 400);
    let body = json_body(&res);
    assert_eq!(body["errors"][0], "cannot resolve route handler Ghost:boo");
}
