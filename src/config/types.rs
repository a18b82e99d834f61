use crate::config::parser::{ConfigError, ConfigParser, FromYaml, ParseResult};
use derive_yaml::FromYaml;
use std::collections::HashMap;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SERVER_NAME: &str = "_";
pub const DEFAULT_MAX_BODY_SIZE: usize = 1_048_576; // 1MB
pub const DEFAULT_ROUTE_PATH: &str = "/";
pub const DEFAULT_ROOT: &str = "./www";
pub const DEFAULT_FILE: &str = "index.html";
pub const DEFAULT_NUM_SUB_REACTOR: u32 = 4;
pub const DEFAULT_TIMEOUT_MS: u32 = 15_000;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 65_536;

/// What a route dispatches to. Parsed from the route's `handler:` field
/// (`static`, `register`, `login`); anything else is a configuration error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteKind {
    Static,
    Register,
    Login,
}

impl Default for RouteKind {
    fn default() -> Self {
        RouteKind::Static
    }
}

impl FromYaml for RouteKind {
    fn from_yaml(parser: &mut ConfigParser, min_indent: usize) -> ParseResult<Self> {
        let loc = parser.peek_loc();
        let raw = String::from_yaml(parser, min_indent)?;
        match raw.as_str() {
            "static" => Ok(RouteKind::Static),
            "register" => Ok(RouteKind::Register),
            "login" => Ok(RouteKind::Login),
            other => Err(ConfigError {
                message: format!(
                    "unknown route handler '{}', expected static, register or login",
                    other
                ),
                loc,
                context: vec![],
            }),
        }
    }
}

#[derive(Debug, Clone, FromYaml)]
pub struct RouteConfig {
    pub path: String,
    pub methods: Vec<String>,
    pub handler: RouteKind,
    pub root: String,
    pub default_file: String,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_ROUTE_PATH.to_string(),
            methods: vec!["GET".to_string()],
            handler: RouteKind::Static,
            root: DEFAULT_ROOT.to_string(),
            default_file: DEFAULT_FILE.to_string(),
        }
    }
}

#[derive(Debug, Clone, FromYaml)]
pub struct AppConfig {
    pub servers: Vec<ServerConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self { servers: Vec::new() }
    }
}

#[derive(Debug, Clone, FromYaml)]
pub struct ServerConfig {
    pub host: String,
    pub ports: Vec<u16>,
    pub server_name: String,
    pub default_server: bool,
    pub error_pages: HashMap<u16, String>,
    pub client_max_body_size: usize,
    pub num_sub_reactor: u32,
    pub use_sendfile: bool,
    pub use_thread_pool: bool,
    pub timeout_ms: u32,
    pub max_connections: u32,
    pub routes: Vec<RouteConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            ports: vec![DEFAULT_PORT],
            server_name: DEFAULT_SERVER_NAME.to_string(),
            default_server: false,
            error_pages: HashMap::new(),
            client_max_body_size: DEFAULT_MAX_BODY_SIZE,
            num_sub_reactor: DEFAULT_NUM_SUB_REACTOR,
            use_sendfile: false,
            use_thread_pool: false,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            routes: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Finds the first route whose pattern matches `path`, per the
    /// exact -> suffix-glob -> prefix-glob precedence documented on `Router`.
    pub fn find_route(&self, path: &str) -> Option<&RouteConfig> {
        if let Some(route) = self.routes.iter().find(|r| r.path == path) {
            return Some(route);
        }
        self.routes.iter().find(|r| {
            if let Some(ext) = r.path.strip_prefix('*') {
                path.ends_with(ext)
            } else if let Some(prefix) = r.path.strip_suffix('*') {
                path.starts_with(prefix)
            } else {
                false
            }
        })
    }
}
