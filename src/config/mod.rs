pub mod display;
pub mod lexer;
pub mod parser;
pub mod types;
pub mod validate;

pub use parser::{ConfigError, ConfigParser, FromYaml, ParseResult};
pub use types::{AppConfig, RouteConfig, RouteKind, ServerConfig};

use std::fs;
use std::path::Path;

/// Loads and validates the server configuration from a YAML file on disk.
pub fn load(path: &Path) -> Result<AppConfig, ConfigError> {
    let text = fs::read_to_string(path).map_err(|e| ConfigError {
        message: format!("could not read config file '{}': {e}", path.display()),
        loc: None,
        context: vec![],
    })?;

    let mut cfg = AppConfig::from_str(&text)?;
    cfg.servers = validate::validate_configs(cfg.servers);
    Ok(cfg)
}
