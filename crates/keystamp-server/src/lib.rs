//! Keystamp certificate authority server.
//!
//! Production glue around [`keystamp_core`]: the principal and revocation
//! ledger, the [`Authority`] that orchestrates the six core operations, the
//! signed-reply layer and the axum HTTP surface.
//!
//! # Components
//!
//! - [`Authority`]: register, lookup, revoke and revocation queries over a
//!   [`Ledger`], with per-uid locking and read retries
//! - [`storage`]: [`MemoryLedger`], [`RedbLedger`] and [`ChaoticLedger`]
//! - [`Reply`]: every response sealed by the CA key
//! - [`http::router`]: routes, CORS and request tracing
//! - [`Server`]: binds a listener and serves with the configured backend
//! - [`SystemEnv`]: production environment (real clock, OS RNG)

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod authority;
mod config;
mod error;
pub mod http;
pub mod keys;
mod locks;
pub mod reply;
pub mod storage;
mod system_env;

use std::{net::SocketAddr, sync::Arc};

pub use authority::Authority;
pub use config::{AuthorityConfig, LedgerBackend, ServerConfig};
pub use error::ServerError;
pub use http::{AppState, router};
use keystamp_core::CaKey;
pub use locks::UidLocks;
pub use reply::Reply;
pub use storage::{ChaoticLedger, Ledger, MemoryLedger, RedbLedger, StorageError};
pub use system_env::SystemEnv;
use tokio::net::TcpListener;

/// Production keystamp server.
///
/// Owns the bound listener and the CA key; the ledger is opened in
/// [`Server::run`].
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    ca: Arc<CaKey>,
    env: SystemEnv,
}

impl Server {
    /// Bind the listening socket.
    pub async fn bind(config: ServerConfig, ca: CaKey) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.bind_address).await?;
        Ok(Self { listener, config, ca: Arc::new(ca), env: SystemEnv::new() })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Open the ledger and serve until the process is stopped.
    pub async fn run(self) -> Result<(), ServerError> {
        match self.config.backend.clone() {
            LedgerBackend::Redb(path) => {
                tracing::info!(path = %path.display(), "opening ledger");
                let ledger = RedbLedger::open(&path)?;
                self.serve(ledger).await
            },
            LedgerBackend::InMemory => {
                tracing::warn!("in-memory ledger: principals and revocations are lost on exit");
                self.serve(MemoryLedger::new()).await
            },
        }
    }

    async fn serve<L: Ledger>(self, ledger: L) -> Result<(), ServerError> {
        let authority = Authority::new(self.env, ledger, self.ca, self.config.authority);
        let state = AppState { authority, storage_timeout: self.config.storage_timeout };

        tracing::info!("Server listening on {}", self.listener.local_addr()?);

        axum::serve(self.listener, router(state)).await?;

        Ok(())
    }
}
