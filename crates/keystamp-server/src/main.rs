//! Keystamp server binary.
//!
//! # Usage
//!
//! ```bash
//! # Create a protected CA key
//! KEYSTAMP_CA_PASSWORD=secret keystamp-server init-key --out ca.key
//!
//! # Protect an existing PKCS#8 key
//! KEYSTAMP_CA_PASSWORD=secret keystamp-server wrap-key --input plain.pem --out ca.key
//!
//! # Serve
//! KEYSTAMP_CA_PASSWORD=secret keystamp-server serve --ca-key ca.key --db keystamp.redb
//! ```

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{Args, Parser, Subcommand};
use keystamp_core::{CaIdentity, Environment};
use keystamp_server::{AuthorityConfig, LedgerBackend, Server, ServerConfig, SystemEnv, keys};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Keystamp certificate authority
///
/// Commands touching the CA key read its password from `KEYSTAMP_CA_PASSWORD`.
#[derive(Parser, Debug)]
#[command(name = "keystamp-server")]
#[command(about = "Minimal certificate authority with signed responses")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API
    Serve(ServeArgs),
    /// Generate a new protected CA key
    InitKey {
        /// Output path
        #[arg(long)]
        out: PathBuf,
    },
    /// Protect an existing cleartext PKCS#8 key
    WrapKey {
        /// Cleartext PKCS#8 PEM
        #[arg(long)]
        input: PathBuf,

        /// Output path
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to bind to
    #[arg(short, long, default_value = "127.0.0.1:8000")]
    bind: SocketAddr,

    /// Protected CA key file
    #[arg(long, default_value = "ca.key")]
    ca_key: PathBuf,

    /// Ledger database file
    #[arg(long, default_value = "keystamp.redb", conflicts_with = "in_memory")]
    db: PathBuf,

    /// Keep the ledger in memory only
    #[arg(long)]
    in_memory: bool,

    /// Accepted client clock skew, seconds
    #[arg(long, default_value = "30")]
    freshness_window_secs: u64,

    /// Bound on each operation, milliseconds
    #[arg(long, default_value = "5000")]
    storage_timeout_ms: u64,

    /// Attempts per ledger read
    #[arg(long, default_value = "3")]
    read_attempts: u32,

    /// Backoff before the first read retry, milliseconds
    #[arg(long, default_value = "50")]
    read_backoff_ms: u64,

    /// CA country (C)
    #[arg(long, default_value = "CN")]
    ca_country: String,

    /// CA state or province (ST)
    #[arg(long, default_value = "HL")]
    ca_state: String,

    /// CA locality (L)
    #[arg(long, default_value = "Harbin")]
    ca_locality: String,

    /// CA organization (O)
    #[arg(long, default_value = "Cryptography Experiment")]
    ca_organization: String,

    /// CA common name (CN)
    #[arg(long, default_value = "CA")]
    ca_common_name: String,
}

impl ServeArgs {
    fn config(&self) -> ServerConfig {
        let backend = if self.in_memory {
            LedgerBackend::InMemory
        } else {
            LedgerBackend::Redb(self.db.clone())
        };

        ServerConfig {
            bind_address: self.bind,
            storage_timeout: Duration::from_millis(self.storage_timeout_ms),
            backend,
            identity: CaIdentity {
                country: self.ca_country.clone(),
                state: self.ca_state.clone(),
                locality: self.ca_locality.clone(),
                organization: self.ca_organization.clone(),
                common_name: self.ca_common_name.clone(),
            },
            authority: AuthorityConfig {
                freshness_window: Duration::from_secs(self.freshness_window_secs),
                read_attempts: self.read_attempts.max(1),
                read_backoff: Duration::from_millis(self.read_backoff_ms),
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let env = SystemEnv::new();

    match cli.command {
        Command::Serve(args) => {
            tracing::info!("Keystamp server starting");
            tracing::info!("Binding to {}", args.bind);

            let config = args.config();
            let identity = config.identity.clone();
            let password = keys::password_from_env()?;
            let ca = keys::load_ca_key(&args.ca_key, &password, identity, &env)?;
            tracing::info!(
                key = %args.ca_key.display(),
                now = env.wall_clock_millis(),
                "CA key loaded, certificate regenerated"
            );

            let server = Server::bind(config, ca).await?;
            server.run().await?;
        },
        Command::InitKey { out } => {
            let password = keys::password_from_env()?;
            let blob = keys::generate_protected_key(&env, &password)?;
            write_new_file(&out, &blob)?;
            tracing::info!(path = %out.display(), "protected CA key written");
        },
        Command::WrapKey { input, out } => {
            let password = keys::password_from_env()?;
            let clear = std::fs::read_to_string(&input)?;
            let blob = keys::wrap_existing_key(&clear, &password)?;
            write_new_file(&out, &blob)?;
            tracing::info!(path = %out.display(), "protected CA key written");
        },
    }

    Ok(())
}

/// Refuse to overwrite an existing key.
fn write_new_file(path: &Path, contents: &str) -> std::io::Result<()> {
    use std::io::Write;

    let mut file = std::fs::OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(contents.as_bytes())
}
