#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use serde_json::Value;

use oxide_router::{
    AppResult, AppState, Application, AuthFactory, Container, FnHandler, MemoryRouteLoader,
    Middleware, Outcome, Request, Response, RouteOptions, Router, UserProvider,
};

pub const INSTALLED: AppState = AppState { installed: true };
pub const NOT_INSTALLED: AppState = AppState { installed: false };

/// Shared record of what ran, in order.
#[derive(Clone, Default)]
pub struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| *e == entry).count()
    }
}

/// Middleware that records its name and continues.
pub struct Record {
    name: String,
    log: Log,
}

impl Record {
    pub fn new(name: &str, log: &Log) -> Arc<dyn Middleware> {
        Arc::new(Self {
            name: name.to_string(),
            log: log.clone(),
        })
    }
}

impl Middleware for Record {
    fn process(&self, req: Request, res: Response) -> BoxFuture<'_, AppResult<Outcome>> {
        Box::pin(async move {
            self.log.push(self.name.as_str());
            Ok(Outcome::Continue(req, res))
        })
    }
}

/// Middleware that records its name and answers on its own.
pub struct Halt {
    name: String,
    log: Log,
    status: u16,
}

impl Halt {
    pub fn new(name: &str, log: &Log, status: u16) -> Arc<dyn Middleware> {
        Arc::new(Self {
            name: name.to_string(),
            log: log.clone(),
            status,
        })
    }
}

impl Middleware for Halt {
    fn process(&self, _req: Request, _res: Response) -> BoxFuture<'_, AppResult<Outcome>> {
        Box::pin(async move {
            self.log.push(self.name.as_str());
            Ok(Outcome::ShortCircuit(Response::new(self.status)))
        })
    }
}

/// Auth factory that builds recording middleware named after the spec.
#[derive(Default)]
pub struct RecordingAuthFactory {
    pub log: Log,
    pub providers: Mutex<Vec<String>>,
}

impl RecordingAuthFactory {
    pub fn new(log: &Log) -> Arc<Self> {
        Arc::new(Self {
            log: log.clone(),
            providers: Mutex::new(Vec::new()),
        })
    }

    pub fn provider_kinds(&self) -> Vec<String> {
        self.providers.lock().unwrap().clone()
    }
}

impl AuthFactory for RecordingAuthFactory {
    fn set_user_provider(&self, kind: &str, _provider: Arc<dyn UserProvider>) {
        self.providers.lock().unwrap().push(kind.to_string());
    }

    fn create_middleware(
        &self,
        auth_spec: &str,
        _options: &RouteOptions,
    ) -> AppResult<Arc<dyn Middleware>> {
        Ok(Record::new(&format!("auth:{auth_spec}"), &self.log))
    }
}

/// Handler that records each call and echoes its action.
pub fn echo_handler(name: &str, log: &Log) -> impl Fn() -> FnHandler + Send + Sync + 'static {
    let name = name.to_string();
    let log = log.clone();
    move || {
        let name = name.clone();
        let log = log.clone();
        FnHandler::new(move |action, req, res, validator| {
            log.push(format!("{name}:{action}"));
            let body = serde_json::json!({
                "action": action,
                "params": req.params.iter().map(|(k, v)| [k, v]).collect::<Vec<_>>(),
                "data": Value::Object(validator.data().clone()),
            });
            Ok(Some(res.body(body.to_string())))
        })
    }
}

/// Handler that records each call and fails.
pub fn failing_handler(name: &str, log: &Log) -> impl Fn() -> FnHandler + Send + Sync + 'static {
    let name = name.to_string();
    let log = log.clone();
    move || {
        let name = name.clone();
        let log = log.clone();
        FnHandler::new(move |action, _req, _res, _validator| {
            log.push(format!("{name}:{action}"));
            Err(oxide_router::AppError::application("handler failed"))
        })
    }
}

pub fn app(loader: MemoryRouteLoader, container: Container) -> Application {
    Application::new(Router::new("").loader(Arc::new(loader)), container)
}

pub fn json_body(res: &Response) -> Value {
    serde_json::from_slice(&res.body)
        .unwrap_or_else(|e| panic!("Expected JSON body: {e}\n{:?}", res.body_string()))
}
