use std::io;

/// Error kinds surfaced by the core, per the error handling design.
///
/// Parse/protocol faults are recovered locally (a placeholder response is substituted
/// and the connection closed); only `Io` propagates as a hard failure that terminates
/// the affected session without touching the rest of the engine.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("malformed request/response prefix")]
    Parse,

    #[error("name resolution failed for {host}")]
    Resolve { host: String },

    #[error("connect to origin timed out")]
    ConnectTimeout,

    #[error("origin disconnected before response was complete")]
    Origin,

    #[error("inbound connection idle for too long")]
    IdleTimeout,

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ProxyError>;
