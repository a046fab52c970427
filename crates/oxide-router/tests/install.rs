//! Behavior before and after first-time setup.

mod common;

use common::*;
use oxide_router::{
    AppConfig, Application, Container, MemoryRouteLoader, Method, Request, RouteDescriptor,
    RouteKind,
};

fn page_loader() -> MemoryRouteLoader {
    MemoryRouteLoader::new()
        .route(RouteDescriptor::new(Method::Get, RouteKind::Page, "/about", "Page", "about"))
        .route(RouteDescriptor::new(Method::Get, RouteKind::Page, "/broken", "Broken", "show"))
}

fn install_app(log: &Log) -> Application {
    let container = Container::new()
        .handler("Page", echo_handler("Page", log))
        .handler("Broken", failing_handler("Broken", log))
        .handler("core.install_page", echo_handler("Install", log))
        .handler("core.install", echo_handler("InstallApi", log))
        .handler("core.session", echo_handler("Session", log));
    app(page_loader(), container)
}

#[tokio::test]
async fn unmatched_path_redirects_to_install_page() {
    let log = Log::default();
    let res = install_app(&log)
        .handle(Request::get("/nowhere"), NOT_INSTALLED)
        .await
        .unwrap();

    assert_eq!(res.status, 307);
    assert_eq!(res.get_header("Location"), Some("/admin/install"));
    assert_eq!(res.get_header("Cache-Control"), Some("no-cache, must-revalidate"));
    assert!(res.body.is_empty());
    assert!(log.entries().is_empty());
}

#[tokio::test]
async fn matched_page_still_served_before_install() {
    let log = Log::default();
    let res = install_app(&log)
        .handle(Request::get("/about"), NOT_INSTALLED)
        .await
        .unwrap();
    assert_eq!(res.status, 200);
    assert_eq!(log.entries(), vec!["Page:about"]);
}

#[tokio::test]
async fn install_page_is_served() {
    let log = Log::default();
    let res = install_app(&log)
        .handle(Request::get("/admin/install"), NOT_INSTALLED)
        .await
        .unwrap();
    assert_eq!(res.status, 200);
    assert_eq!(log.entries(), vec!["Install:load"]);
}

#[tokio::test]
async fn install_api_routes_are_served() {
    let log = Log::default();
    let app = install_app(&log);

    let res = app
        .handle(Request::get("/core/api/install/status"), NOT_INSTALLED)
        .await
        .unwrap();
    assert_eq!(res.status, 200);
    assert_eq!(json_body(&res)["action"], "status");

    let res = app
        .handle(
            Request::get("/core/api/install/unknown").header("Content-Type", "application/json"),
            NOT_INSTALLED,
        )
        .await
        .unwrap();
    assert_eq!(res.status, 404);
    assert_eq!(log.entries(), vec!["InstallApi:status"]);
}

#[tokio::test]
async fn system_api_routes_are_served_after_install() {
    let log = Log::default();
    let res = install_app(&log)
        .handle(Request::get("/core/api/session/"), INSTALLED)
        .await
        .unwrap();
    assert_eq!(res.status, 200);
    assert_eq!(log.entries(), vec!["Session:get"]);
}

#[tokio::test]
async fn failure_before_install_redirects() {
    let log = Log::default();
    let res = install_app(&log)
        .handle(Request::get("/broken"), NOT_INSTALLED)
        .await
        .unwrap();
    assert_eq!(res.status, 307);
    assert_eq!(log.entries(), vec!["Broken:show"]);
}

#[tokio::test]
async fn failure_after_install_renders_html() {
    let log = Log::default();
    let res = install_app(&log)
        .handle(Request::get("/broken"), INSTALLED)
        .await
        .unwrap();

    assert_eq!(res.status, 400);
    assert_eq!(res.get_header("Content-Type"), Some("text/html; charset=utf-8"));
    let body = res.body_string().unwrap();
    assert!(body.contains("handler failed"), "{body}");
}

#[tokio::test]
async fn failure_after_install_renders_json() {
    let log = Log::default();
    let res = install_app(&log)
        .handle(
            Request::get("/broken").header("Content-Type", "application/json"),
            INSTALLED,
        )
        .await
        .unwrap();

    assert_eq!(res.status, 400);
    let body = json_body(&res);
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], 400);
    assert_eq!(body["errors"][0], "handler failed");
}

#[tokio::test]
async fn failing_install_page_is_retried_once() {
    let log = Log::default();
    let container = Container::new().handler("core.install_page", failing_handler("Install", &log));
    let app = app(MemoryRouteLoader::new(), container);

    let res = app
        .handle(Request::get("/admin/install"), NOT_INSTALLED)
        .await
        .unwrap();
    assert_eq!(res.status, 200);
    assert_eq!(log.count("Install:load"), 2);

    let res = app
        .handle(Request::get("/admin/install"), INSTALLED)
        .await
        .unwrap();
    assert_eq!(res.status, 400);
    assert_eq!(log.count("Install:load"), 4);
}

#[tokio::test]
async fn redirect_honors_base_path_and_install_page() {
    let log = Log::default();
    let config = AppConfig::new().base_path("/shop").install_page("/setup");
    let container = Container::new()
        .handler("Page", echo_handler("Page", &log))
        .handler("core.install_page", echo_handler("Install", &log));
    let app = Application::new(config.router(), container);

    let res = app
        .handle(Request::get("/shop/catalog"), config.state())
        .await
        .unwrap();
    assert_eq!(res.status, 307);
    assert_eq!(res.get_header("Location"), Some("/shop/setup"));

    let res = app
        .handle(Request::get("/shop/setup"), config.state())
        .await
        .unwrap();
    assert_eq!(res.status, 200);
    assert_eq!(log.entries(), vec!["Install:load"]);
}
