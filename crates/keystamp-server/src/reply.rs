//! Response wrapping.
//!
//! Every outcome, success or failure, leaves the server as a
//! [`SignedEnvelope`]. Handlers build a payload (or an error) and call
//! [`Reply::from_result`]; nothing is signed implicitly.
//!
//! # Status codes
//!
//! - Success and domain errors: 200 (the `result` field tells them apart)
//! - `StorageUnavailable`: 503
//! - `Issuance`, `PartialRevocation`: 500
//! - Unknown route: 404
//! - Known route, wrong method: 405

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use keystamp_core::{
    AuthorityError, CaKey, IssuedCertificate, Principal, RESULT_FAILED, RESULT_OK, Revocation,
    SignedEnvelope, seal,
};
use serde_json::{Map, Value, json};

/// A sealed response and its transport status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// HTTP status
    pub status: StatusCode,
    /// Signed body
    pub envelope: SignedEnvelope,
}

impl Reply {
    /// Seal the outcome of a core operation.
    pub fn from_result(
        ca: &CaKey,
        result: Result<Map<String, Value>, AuthorityError>,
        now_ms: i64,
    ) -> Self {
        match result {
            Ok(payload) => Self::success(ca, payload, now_ms),
            Err(error) => Self::failure(ca, &error, now_ms),
        }
    }

    /// `result = 0` plus `payload`.
    pub fn success(ca: &CaKey, mut payload: Map<String, Value>, now_ms: i64) -> Self {
        payload.insert("result".to_string(), Value::from(RESULT_OK));
        Self { status: StatusCode::OK, envelope: seal(ca, payload, now_ms) }
    }

    /// `result = 1` with the error's client message.
    pub fn failure(ca: &CaKey, error: &AuthorityError, now_ms: i64) -> Self {
        Self::message(ca, status_for(error), error.message(), now_ms)
    }

    /// Signed 404 for unknown routes.
    pub fn not_found(ca: &CaKey, now_ms: i64) -> Self {
        Self::message(ca, StatusCode::NOT_FOUND, "not found.", now_ms)
    }

    /// Signed 405 for a known route hit with the wrong method.
    pub fn method_not_allowed(ca: &CaKey, now_ms: i64) -> Self {
        Self::message(ca, StatusCode::METHOD_NOT_ALLOWED, "method not allowed.", now_ms)
    }

    fn message(ca: &CaKey, status: StatusCode, msg: &str, now_ms: i64) -> Self {
        let payload = object(json!({ "result": RESULT_FAILED, "msg": msg }));
        Self { status, envelope: seal(ca, payload, now_ms) }
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        (self.status, Json(self.envelope)).into_response()
    }
}

/// Transport status for an error.
pub fn status_for(error: &AuthorityError) -> StatusCode {
    match error {
        AuthorityError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        AuthorityError::Issuance(_) | AuthorityError::PartialRevocation { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        },
        _ => StatusCode::OK,
    }
}

/// `{cert}` for a registration.
pub fn certificate_payload(issued: &IssuedCertificate) -> Map<String, Value> {
    object(json!({ "cert": issued.pem }))
}

/// `{users}` for a lookup.
pub fn users_payload(principals: &[Principal]) -> Map<String, Value> {
    object(json!({ "users": principals }))
}

/// `{list}` for a lookup by public key.
pub fn uids_payload(uids: &[String]) -> Map<String, Value> {
    object(json!({ "list": uids }))
}

/// Empty payload for a revocation.
pub fn revoked_payload() -> Map<String, Value> {
    Map::new()
}

/// `{revoke}` for the revocation list.
pub fn revocations_payload(revocations: &[Revocation]) -> Map<String, Value> {
    object(json!({ "revoke": revocations }))
}

/// `{revoked, msg}` for a revocation check.
pub fn revocation_check_payload(revoked: bool) -> Map<String, Value> {
    let msg = if revoked { "cert revoked." } else { "cert not in revoke list." };
    object(json!({ "revoked": revoked, "msg": msg }))
}

/// `{pubkey, cert}` describing the CA itself.
pub fn ca_payload(ca: &CaKey) -> Map<String, Value> {
    object(json!({ "pubkey": ca.public_key_pem(), "cert": ca.certificate_pem() }))
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
