//! oxide-dispatch CLI
//!
//! Builds one request from the command line, runs it through the dispatch
//! pipeline and writes the HTTP response to stdout.

use std::collections::BTreeSet;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use serde_json::{json, Value};
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_router::container::{BODY_PARSING_MIDDLEWARE, CLIENT_IP_MIDDLEWARE};
use oxide_router::system::{CONTROL_PANEL_HANDLER, INSTALL_PAGE_HANDLER};
use oxide_router::{
    AppConfig, Application, Container, FnHandler, MemoryCache, MemoryRouteLoader, Method,
    ProviderAuthFactory, Request, ResponseEmitter, SessionProvider, TokenProvider,
};

/// Handler classes of the code-defined system routes.
const SYSTEM_CLASSES: [&str; 3] = ["core.install", "core.session", "core.user"];

/// Dispatch a single request through oxide-router.
#[derive(Parser)]
#[command(name = "oxide-dispatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// HTTP method.
    method: String,

    /// Request path, optionally with a query string.
    path: String,

    /// JSON configuration file.
    #[arg(short, long, env = "OXIDE_CONFIG")]
    config: Option<PathBuf>,

    /// JSON file with route definitions.
    #[arg(short, long, env = "OXIDE_ROUTES")]
    routes: Option<PathBuf>,

    /// Base path, overriding the configuration.
    #[arg(short, long)]
    base_path: Option<String>,

    /// Treat the application as installed.
    #[arg(short, long)]
    installed: bool,

    /// Request header as `Name: value`.
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Request body.
    #[arg(short = 'd', long)]
    data: Option<String>,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            AppConfig::from_json(&text)?
        }
        None => AppConfig::default(),
    };
    if let Some(base_path) = &cli.base_path {
        config = config.base_path(base_path.as_str());
    }
    if cli.installed {
        config = config.installed(true);
    }

    let loader = match &cli.routes {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading routes {}", path.display()))?;
            MemoryRouteLoader::from_json(&text)?
        }
        None => MemoryRouteLoader::new(),
    };
    info!(routes = loader.routes().len(), base_path = %config.base_path, "loaded configuration");

    let classes: BTreeSet<String> = loader
        .routes()
        .iter()
        .map(|r| r.handler_class.clone())
        .collect();
    let container = container(&classes);

    let router = config
        .router()
        .loader(Arc::new(loader))
        .cache(Arc::new(MemoryCache::new()));
    let mut app = Application::new(router, container);
    app.add_middleware(CLIENT_IP_MIDDLEWARE);
    app.add_middleware(BODY_PARSING_MIDDLEWARE);

    let req = build_request(&cli)?;
    debug!(method = %req.method, path = %req.path, "dispatching");
    let res = app.handle(req, config.state()).await?;

    let stdout = io::stdout();
    ResponseEmitter::new().emit(&res, &mut stdout.lock())?;
    Ok(())
}

/// Registers an echoing handler for every known class plus demo auth.
fn container(classes: &BTreeSet<String>) -> Container {
    let system = [CONTROL_PANEL_HANDLER, INSTALL_PAGE_HANDLER]
        .into_iter()
        .filter_map(|r| r.split_once(':').map(|(class, _)| class))
        .chain(SYSTEM_CLASSES);

    let mut container = Container::new()
        .auth_factory(Arc::new(ProviderAuthFactory::new()))
        .user_provider(
            "session",
            Arc::new(SessionProvider::new(|id| Some(json!({ "session": id })))),
        )
        .user_provider(
            "token",
            Arc::new(TokenProvider::new(|token| Some(json!({ "token": token })))),
        );

    for class in classes.iter().map(String::as_str).chain(system) {
        let name = class.to_string();
        container = container.handler(class, move || echo(name.clone()));
    }
    container
}

fn echo(class: String) -> FnHandler {
    FnHandler::new(move |action, req, res, validator| {
        let params: Vec<[&str; 2]> = req.params.iter().map(|(k, v)| [k, v]).collect();
        let body = json!({
            "handler": format!("{class}:{action}"),
            "params": params,
            "data": Value::Object(validator.data().clone()),
        });
        Ok(Some(
            res.header("Content-Type", "application/json")
                .body(body.to_string()),
        ))
    })
}

fn build_request(cli: &Cli) -> anyhow::Result<Request> {
    let Some(method) = Method::from_str(&cli.method.to_uppercase()) else {
        bail!("unsupported method {}", cli.method);
    };

    let (path, query) = match cli.path.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (cli.path.as_str(), None),
    };

    let mut req = Request::new(method, path).remote_addr([127, 0, 0, 1].into());
    if let Some(query) = query {
        for (key, value) in Request::parse_query_string(query) {
            req = req.query_param(key, value);
        }
    }
    for header in &cli.headers {
        let Some((name, value)) = header.split_once(':') else {
            bail!("invalid header {header:?}, expected `Name: value`");
        };
        req = req.header(name.trim(), value.trim());
    }
    if let Some(data) = &cli.data {
        req = req.body(data.as_str());
    }
    Ok(req)
}
