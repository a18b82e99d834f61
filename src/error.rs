use crate::config::ConfigError;
use thiserror::Error;

/// Top-level error type for everything that can fail inside the server.
/// Connection-scoped failures are translated to an error response before
/// they ever reach this type; `ServerError` carries only startup and
/// reactor-scoped failures that justify process-level handling.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("failed to bind listener on {host}:{port}: {source}")]
    Bind {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("no server blocks survived configuration validation")]
    NoServers,

    #[error("sub-reactor {index} failed to start: {source}")]
    ReactorSpawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },
}

pub type ServerResult<T> = Result<T, ServerError>;
