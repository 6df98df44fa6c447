//! Server startup errors.
//!
//! Once a connection is accepted nothing in the transport fails upward;
//! per-connection faults end that session and are logged.

use thiserror::Error;

/// Errors raised while bringing the server up.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },
    /// Other socket-level failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The global metrics recorder could not be installed.
    #[error("failed to install metrics recorder: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
}
