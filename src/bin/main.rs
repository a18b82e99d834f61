use reactor_httpd::config::{self, RouteKind, ServerConfig};
use reactor_httpd::db::{Pool, UserRepository};
use reactor_httpd::error::{ServerError, ServerResult};
use reactor_httpd::handlers::{login, register, static_files};
use reactor_httpd::http::Method;
use reactor_httpd::reactor::MainReactor;
use reactor_httpd::router::Router;
use std::path::Path;
use std::sync::Arc;

fn main() -> ServerResult<()> {
    proxy_log::init(proxy_log::Level::Info);

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.yaml".to_string());
    let app_config = config::load(Path::new(&config_path)).map_err(ServerError::Config)?;
    config::display::display_config(&app_config.servers);

    let users = Arc::new(UserRepository::new(Pool::new("server.db", 8)?)?);

    let routers: Vec<Arc<Router>> = app_config
        .servers
        .iter()
        .map(|server_cfg| Arc::new(build_router(server_cfg, users.clone())))
        .collect();

    proxy_log::info!("starting reactor_httpd with {} server block(s)", app_config.servers.len());
    let reactor = MainReactor::new(&app_config, routers)?;
    reactor.run()
}

/// Builds one server block's routing table straight from its `routes` list:
/// each `RouteConfig` names a handler kind, and every kind maps to exactly
/// one GET or POST entry.
fn build_router(server_cfg: &ServerConfig, users: Arc<UserRepository>) -> Router {
    let mut router = Router::new();
    for route in &server_cfg.routes {
        match route.handler {
            RouteKind::Static => {
                router.add_route(&route.path, Method::Get, Arc::new(static_files::handle));
            }
            RouteKind::Register => {
                router.add_route(&route.path, Method::Post, Arc::new(register::make_handler(users.clone())));
            }
            RouteKind::Login => {
                router.add_route(&route.path, Method::Post, Arc::new(login::make_handler(users.clone())));
            }
        }
    }
    router
}
