//! Server error types.

use keystamp_core::KeyLoadError;
use keystamp_crypto::KeyGuardError;
use thiserror::Error;

use crate::storage::StorageError;

/// Errors that stop the server or a CLI command.
///
/// Request-level failures never surface here; they become signed error
/// envelopes (see [`Reply`](crate::Reply)).
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration error (missing password, unreadable key file, etc.).
    ///
    /// Fatal - fix configuration and restart.
    #[error("configuration error: {0}")]
    Config(String),

    /// CA key could not be loaded.
    ///
    /// Usually a wrong `KEYSTAMP_CA_PASSWORD`. Fatal.
    #[error("CA key: {0}")]
    KeyLoad(#[from] KeyLoadError),

    /// Key wrapping failed (`init-key`, `wrap-key`).
    #[error("key wrapping: {0}")]
    KeyGuard(#[from] KeyGuardError),

    /// Ledger could not be opened.
    #[error("ledger: {0}")]
    Storage(#[from] StorageError),

    /// Transport/network error (bind failure, I/O error, etc.).
    ///
    /// May be transient (network issues) or fatal (bind address in use).
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}
