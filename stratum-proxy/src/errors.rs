use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("handshake timed out waiting for subscribe/authorize")]
    HandshakeTimeout,

    #[error("idle timeout: no traffic for 600s")]
    IdleTimeout,

    #[error("line exceeded 64 KiB")]
    LineTooLong,

    #[error("worker id '{0}' not found or order is not paid|active")]
    UnknownWorker(String),

    #[error("failed to connect to destination pool {host}:{port}: {source}")]
    PoolConnect {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("control-plane request failed: {0}")]
    ControlPlane(#[from] reqwest::Error),

    #[error(transparent)]
    Dialect(#[from] DialectError),
}

#[derive(Error, Debug)]
pub enum DialectError {
    #[error("malformed login field '{0}': expected '<worker_id>.<worker_name>'")]
    MalformedLogin(String),

    #[error("unrecognized dialect for method '{0}'")]
    UnknownDialect(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
