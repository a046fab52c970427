//! Middleware ordering, short-circuiting and auth injection.

mod common;

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::json;

use common::*;
use oxide_router::middleware::AUTH_USER_ATTRIBUTE;
use oxide_router::{
    AppResult, Application, Container, FnHandler, MemoryRouteLoader, Method, Middleware,
    MiddlewareRef, Outcome, ProviderAuthFactory, Request, Response, RouteDescriptor, RouteKind,
    Router, SessionProvider, TokenProvider,
};

fn recording_container(log: &Log) -> Container {
    let (a, b, c) = (log.clone(), log.clone(), log.clone());
    Container::new()
        .handler("Page", echo_handler("Page", log))
        .middleware("a", move |_| Ok(Record::new("A", &a)))
        .middleware("b", move |_| Ok(Record::new("B", &b)))
        .middleware("c", move |_| Ok(Record::new("C", &c)))
}

fn guarded_loader() -> MemoryRouteLoader {
    MemoryRouteLoader::new().route(
        RouteDescriptor::new(Method::Get, RouteKind::Page, "/members", "Page", "members")
            .uuid("members")
            .auth("session")
            .middleware("c"),
    )
}

#[tokio::test]
async fn global_then_auth_then_route_then_handler() {
    let log = Log::default();
    let factory = RecordingAuthFactory::new(&log);
    let container = recording_container(&log).auth_factory(factory.clone());

    let mut app = app(guarded_loader(), container);
    app.add_middleware("a");
    app.add_middleware("b");

    let res = app.handle(Request::get("/members"), INSTALLED).await.unwrap();
    assert_eq!(res.status, 200);
    assert_eq!(
        log.entries(),
        vec!["A", "B", "auth:session", "C", "Page:members"]
    );
}

#[tokio::test]
async fn auth_runs_before_middleware_added_in_code() {
    let log = Log::default();
    let container = recording_container(&log).auth_factory(RecordingAuthFactory::new(&log));

    let mut app = app(guarded_loader(), container);
    app.add_route_middleware(Method::Get, "Page:members", "b");

    app.handle(Request::get("/members"), INSTALLED).await.unwrap();
    assert_eq!(log.entries(), vec!["auth:session", "C", "B", "Page:members"]);
}

#[tokio::test]
async fn user_providers_registered_before_auth_middleware() {
    let log = Log::default();
    let factory = RecordingAuthFactory::new(&log);
    let container = recording_container(&log)
        .auth_factory(factory.clone())
        .user_provider("session", Arc::new(SessionProvider::new(|_| None)))
        .user_provider("token", Arc::new(TokenProvider::new(|_| None)));

    app(guarded_loader(), container)
        .handle(Request::get("/members"), INSTALLED)
        .await
        .unwrap();
    assert_eq!(factory.provider_kinds(), vec!["session", "token"]);
}

#[tokio::test]
async fn short_circuit_skips_the_rest() {
    let log = Log::default();
    let halt_log = log.clone();
    let container = recording_container(&log)
        .middleware("halt", move |_| Ok(Halt::new("halt", &halt_log, 429)))
        .auth_factory(RecordingAuthFactory::new(&log));

    let mut app = app(guarded_loader(), container);
    app.add_middleware("a");
    app.add_middleware("halt");
    app.add_middleware("b");

    let res = app.handle(Request::get("/members"), INSTALLED).await.unwrap();
    assert_eq!(res.status, 429);
    assert_eq!(log.entries(), vec!["A", "halt"]);
}

#[tokio::test]
async fn route_middleware_can_short_circuit() {
    let log = Log::default();
    let container = recording_container(&log);
    let mut app = Application::new(Router::new(""), container);
    app.add_route(Method::Get, "/stop", "Page:stop").unwrap();
    app.add_route_middleware(
        Method::Get,
        "Page:stop",
        MiddlewareRef::from(Halt::new("route-halt", &log, 403)),
    );

    let res = app.handle(Request::get("/stop"), INSTALLED).await.unwrap();
    assert_eq!(res.status, 403);
    assert_eq!(log.entries(), vec!["route-halt"]);
}

#[tokio::test]
async fn duplicate_route_middleware_runs_twice() {
    let log = Log::default();
    let mut app = Application::new(Router::new(""), recording_container(&log));
    app.add_route(Method::Get, "/twice", "Page:twice").unwrap();
    app.add_route_middleware(Method::Get, "Page:twice", "c");
    app.add_route_middleware(Method::Get, "Page:twice", "c");

    app.handle(Request::get("/twice"), INSTALLED).await.unwrap();
    assert_eq!(log.entries(), vec!["C", "C", "Page:twice"]);
}

#[tokio::test]
async fn unknown_middleware_key_is_an_error() {
    let log = Log::default();
    let mut app = Application::new(Router::new(""), recording_container(&log));
    app.add_route(Method::Get, "/x", "Page:x").unwrap();
    app.add_route_middleware(Method::Get, "Page:x", "missing");

    let res = app
        .handle(
            Request::get("/x").header("Content-Type", "application/json"),
            INSTALLED,
        )
        .await
        .unwrap();
    assert_eq!(res.status, 400);
    assert_eq!(
        json_body(&res)["errors"][0],
        "not valid route middleware missing"
    );
    assert!(log.entries().is_empty());
}

fn profile_route() -> RouteDescriptor {
    RouteDescriptor::new(Method::Get, RouteKind::Page, "/profile", "Me", "show").auth("session")
}

fn session_app(redirect: Option<&str>) -> Application {
    let mut route = profile_route().uuid("profile");
    route.redirect_url = redirect.map(str::to_string);
    session_app_with(route)
}

fn session_app_with(route: RouteDescriptor) -> Application {

    let container = Container::new()
        .handler("Me", || {
            FnHandler::new(|_action, req, res, _validator| {
                let user = req.attribute(AUTH_USER_ATTRIBUTE).cloned();
                Ok(Some(res.body(json!({ "user": user }).to_string())))
            })
        })
        .auth_factory(Arc::new(ProviderAuthFactory::new()))
        .user_provider(
            "session",
            Arc::new(SessionProvider::new(|id| {
                (id == "abc").then(|| json!({"name": "ada"}))
            })),
        );
    app(MemoryRouteLoader::new().route(route), container)
}

#[tokio::test]
async fn authenticated_user_reaches_handler() {
    let res = session_app(None)
        .handle(Request::get("/profile").header("Cookie", "session=abc"), INSTALLED)
        .await
        .unwrap();
    assert_eq!(json_body(&res)["user"]["name"], "ada");
}

#[tokio::test]
async fn auth_applies_to_routes_without_id() {
    let app = session_app_with(profile_route());

    let res = app
        .handle(Request::get("/profile").header("Cookie", "session=abc"), INSTALLED)
        .await
        .unwrap();
    assert_eq!(res.status, 200);
    assert_eq!(json_body(&res)["user"]["name"], "ada");

    let res = app
        .handle(
            Request::get("/profile").header("Content-Type", "application/json"),
            INSTALLED,
        )
        .await
        .unwrap();
    assert_eq!(res.status, 400);
}

#[tokio::test]
async fn anonymous_user_is_denied() {
    let res = session_app(None)
        .handle(
            Request::get("/profile").header("Content-Type", "application/json"),
            INSTALLED,
        )
        .await
        .unwrap();
    assert_eq!(res.status, 400);
    assert_eq!(json_body(&res)["errors"][0], "access denied: Access denied");
}

#[tokio::test]
async fn anonymous_user_is_redirected_when_configured() {
    let res = session_app(Some("/login"))
        .handle(Request::get("/profile"), INSTALLED)
        .await
        .unwrap();
    assert_eq!(res.status, 302);
    assert_eq!(res.get_header("Location"), Some("/login"));
}

struct Explode;

impl Middleware for Explode {
    fn process(&self, _req: Request, _res: Response) -> BoxFuture<'_, AppResult<Outcome>> {
        Box::pin(async move {
            let fail = true;
            if fail {
                panic!("middleware exploded");
            }
            Ok(Outcome::ShortCircuit(Response::ok()))
        })
    }
}

#[tokio::test]
async fn panicking_middleware_is_rendered() {
    let log = Log::default();
    let mut app = Application::new(Router::new(""), recording_container(&log));
    app.add_route(Method::Get, "/boom", "Page:boom").unwrap();
    app.add_middleware(MiddlewareRef::from(Arc::new(Explode) as Arc<dyn Middleware>));

    let res = app
        .handle(
            Request::get("/boom").header("Content-Type", "application/json"),
            INSTALLED,
        )
        .await
        .unwrap();
    assert_eq!(res.status, 400);
    let message = json_body(&res)["errors"][0].as_str().unwrap_or_default().to_string();
    assert!(message.contains("middleware exploded"), "{message}");
    assert!(log.entries().is_empty());
}
