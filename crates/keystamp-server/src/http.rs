//! HTTP routes.
//!
//! Thin axum glue over [`Authority`]. Each handler parses its own input so
//! that malformed requests still receive a signed `invalid request.`
//! envelope, runs the operation on a blocking thread under a timeout, and
//! wraps the outcome with [`Reply::from_result`]. Unknown paths and wrong
//! methods get signed 404 and 405 envelopes from the router's fallbacks.

use std::time::Duration;

use axum::{
    Router,
    body::Bytes,
    extract::{
        Query, State,
        rejection::{BytesRejection, QueryRejection},
    },
    routing::get,
};
use keystamp_core::{AuthorityError, Environment, RequestSignature};
use serde::Deserialize;
use serde_json::{Map, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    authority::Authority,
    reply::{
        Reply, ca_payload, certificate_payload, revocation_check_payload, revocations_payload,
        revoked_payload, uids_payload, users_payload,
    },
    storage::Ledger,
};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState<E: Environment, L: Ledger> {
    /// Core operations
    pub authority: Authority<E, L>,
    /// Bound on each operation, storage included
    pub storage_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct UidQuery {
    uid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PubkeyQuery {
    pubkey: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DigestQuery {
    digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RegisterBody {
    sig: RequestSignature,
    pubkey: String,
}

#[derive(Debug, Deserialize)]
struct RevokeBody {
    sig: RequestSignature,
}

/// Every route, with permissive CORS and request tracing.
pub fn router<E: Environment, L: Ledger>(state: AppState<E, L>) -> Router {
    Router::new()
        .route("/user", get(lookup::<E, L>).post(register::<E, L>).delete(revoke::<E, L>))
        .route("/user/pubkey", get(lookup_by_pubkey::<E, L>))
        .route("/revoke", get(list_revocations::<E, L>))
        .route("/revoke/check", get(check_revoked::<E, L>))
        .route("/ca", get(ca_material::<E, L>))
        .fallback(not_found::<E, L>)
        .method_not_allowed_fallback(method_not_allowed::<E, L>)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn register<E: Environment, L: Ledger>(
    State(state): State<AppState<E, L>>,
    query: Result<Query<UidQuery>, QueryRejection>,
    body: Result<Bytes, BytesRejection>,
) -> Reply {
    let parsed = required(query.map(|Query(q)| q.uid), "uid")
        .and_then(|uid| parse_body::<RegisterBody>(body).map(|body| (uid, body)));

    match parsed {
        Ok((uid, body)) => {
            run(&state, move |authority| {
                let issued = authority.register(&uid, &body.pubkey, &body.sig)?;
                Ok(certificate_payload(&issued))
            })
            .await
        },
        Err(error) => reject(&state, &error),
    }
}

async fn lookup<E: Environment, L: Ledger>(
    State(state): State<AppState<E, L>>,
    query: Result<Query<UidQuery>, QueryRejection>,
) -> Reply {
    match query {
        Ok(Query(UidQuery { uid })) => {
            run(&state, move |authority| {
                let principals = authority.lookup(uid.as_deref())?;
                Ok(users_payload(&principals))
            })
            .await
        },
        Err(rejection) => reject(&state, &malformed(&rejection)),
    }
}

async fn revoke<E: Environment, L: Ledger>(
    State(state): State<AppState<E, L>>,
    query: Result<Query<UidQuery>, QueryRejection>,
    body: Result<Bytes, BytesRejection>,
) -> Reply {
    let parsed = required(query.map(|Query(q)| q.uid), "uid")
        .and_then(|uid| parse_body::<RevokeBody>(body).map(|body| (uid, body)));

    match parsed {
        Ok((uid, body)) => {
            run(&state, move |authority| {
                authority.revoke(&uid, &body.sig)?;
                Ok(revoked_payload())
            })
            .await
        },
        Err(error) => reject(&state, &error),
    }
}

async fn lookup_by_pubkey<E: Environment, L: Ledger>(
    State(state): State<AppState<E, L>>,
    query: Result<Query<PubkeyQuery>, QueryRejection>,
) -> Reply {
    match required(query.map(|Query(q)| q.pubkey), "pubkey") {
        Ok(pubkey) => {
            run(&state, move |authority| {
                let uids = authority.lookup_by_pubkey(&pubkey)?;
                Ok(uids_payload(&uids))
            })
            .await
        },
        Err(error) => reject(&state, &error),
    }
}

async fn list_revocations<E: Environment, L: Ledger>(
    State(state): State<AppState<E, L>>,
) -> Reply {
    run(&state, |authority| {
        let revocations = authority.list_revocations()?;
        Ok(revocations_payload(&revocations))
    })
    .await
}

async fn check_revoked<E: Environment, L: Ledger>(
    State(state): State<AppState<E, L>>,
    query: Result<Query<DigestQuery>, QueryRejection>,
) -> Reply {
    match required(query.map(|Query(q)| q.digest), "digest") {
        Ok(digest) => {
            run(&state, move |authority| {
                let revoked = authority.check_revoked(&digest)?;
                Ok(revocation_check_payload(revoked))
            })
            .await
        },
        Err(error) => reject(&state, &error),
    }
}

async fn ca_material<E: Environment, L: Ledger>(State(state): State<AppState<E, L>>) -> Reply {
    let authority = &state.authority;
    let now = authority.env().wall_clock_millis();
    Reply::success(authority.ca(), ca_payload(authority.ca()), now)
}

async fn not_found<E: Environment, L: Ledger>(State(state): State<AppState<E, L>>) -> Reply {
    let now = state.authority.env().wall_clock_millis();
    Reply::not_found(state.authority.ca(), now)
}

async fn method_not_allowed<E: Environment, L: Ledger>(
    State(state): State<AppState<E, L>>,
) -> Reply {
    let now = state.authority.env().wall_clock_millis();
    Reply::method_not_allowed(state.authority.ca(), now)
}

/// Run `op` on a blocking thread, bounded by the storage timeout.
///
/// A timed-out operation keeps running in the background; its outcome is
/// discarded.
async fn run<E, L, F>(state: &AppState<E, L>, op: F) -> Reply
where
    E: Environment,
    L: Ledger,
    F: FnOnce(&Authority<E, L>) -> Result<Map<String, Value>, AuthorityError> + Send + 'static,
{
    let authority = state.authority.clone();
    let task = tokio::task::spawn_blocking(move || {
        let result = op(&authority);
        let now = authority.env().wall_clock_millis();
        Reply::from_result(authority.ca(), result, now)
    });

    match tokio::time::timeout(state.storage_timeout, task).await {
        Ok(Ok(reply)) => reply,
        Ok(Err(join_error)) => {
            tracing::error!(error = %join_error, "operation task failed");
            reject(state, &AuthorityError::StorageUnavailable(join_error.to_string()))
        },
        Err(_) => {
            tracing::warn!(timeout = ?state.storage_timeout, "operation timed out");
            reject(state, &AuthorityError::StorageUnavailable("timed out".to_string()))
        },
    }
}

fn reject<E: Environment, L: Ledger>(state: &AppState<E, L>, error: &AuthorityError) -> Reply {
    if error.is_domain() {
        tracing::debug!(error = %error, "request rejected");
    }
    let now = state.authority.env().wall_clock_millis();
    Reply::failure(state.authority.ca(), error, now)
}

fn required(
    value: Result<Option<String>, QueryRejection>,
    name: &str,
) -> Result<String, AuthorityError> {
    value
        .map_err(|rejection| malformed(&rejection))?
        .ok_or_else(|| AuthorityError::MalformedRequest(format!("missing {name}")))
}

/// Oversized or unreadable bodies are malformed requests like bad JSON.
fn parse_body<T: serde::de::DeserializeOwned>(
    body: Result<Bytes, BytesRejection>,
) -> Result<T, AuthorityError> {
    let body = body.map_err(|rejection| AuthorityError::MalformedRequest(rejection.body_text()))?;
    serde_json::from_slice(&body).map_err(|e| AuthorityError::MalformedRequest(e.to_string()))
}

fn malformed(rejection: &QueryRejection) -> AuthorityError {
    AuthorityError::MalformedRequest(rejection.body_text())
}
