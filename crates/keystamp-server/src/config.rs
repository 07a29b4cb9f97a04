//! Runtime settings.
//!
//! Defaults here match the CLI defaults in `main.rs`.

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use keystamp_core::{CaIdentity, DEFAULT_FRESHNESS_WINDOW};

/// Settings of the [`Authority`](crate::Authority).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityConfig {
    /// Accepted distance between client timestamps and the server clock
    pub freshness_window: Duration,
    /// Attempts per ledger read, including the first (minimum 1)
    pub read_attempts: u32,
    /// Backoff before the second read attempt; doubles afterwards
    pub read_backoff: Duration,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            freshness_window: DEFAULT_FRESHNESS_WINDOW,
            read_attempts: 3,
            read_backoff: Duration::from_millis(50),
        }
    }
}

/// Where principals and revocations are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerBackend {
    /// Redb database file
    Redb(PathBuf),
    /// Lost on exit
    InMemory,
}

/// Settings of the HTTP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_address: SocketAddr,
    /// Bound on each core operation, storage included
    pub storage_timeout: Duration,
    /// Ledger location
    pub backend: LedgerBackend,
    /// Naming of the CA and its subjects
    pub identity: CaIdentity,
    /// Protocol settings
    pub authority: AuthorityConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8000)),
            storage_timeout: Duration::from_secs(5),
            backend: LedgerBackend::Redb(PathBuf::from("keystamp.redb")),
            identity: CaIdentity::default(),
            authority: AuthorityConfig::default(),
        }
    }
}
