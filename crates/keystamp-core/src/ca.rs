//! CA key material.
//!
//! One P-256 key, loaded once at startup and shared read-only (behind an
//! `Arc`) by every request. The same key signs response envelopes (through
//! `p256`) and certificates (through `rcgen`).

use keystamp_crypto::{public_key_pem, unwrap_private_key_pem};
use p256::{
    ecdsa::{Signature, SigningKey, VerifyingKey, signature::Signer},
    pkcs8::DecodePrivateKey,
};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    KeyUsagePurpose,
};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::error::KeyLoadError;

/// Validity of the self-signed CA certificate.
pub const CA_CERT_VALIDITY_DAYS: i64 = 3650;

/// Distinguished name attributes shared by the issuer and every subject.
///
/// Subjects reuse all attributes except the common name, which becomes the
/// principal's uid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaIdentity {
    /// `C`
    pub country: String,
    /// `ST`
    pub state: String,
    /// `L`
    pub locality: String,
    /// `O`
    pub organization: String,
    /// `CN` of the CA itself
    pub common_name: String,
}

impl Default for CaIdentity {
    fn default() -> Self {
        Self {
            country: "CN".to_string(),
            state: "HL".to_string(),
            locality: "Harbin".to_string(),
            organization: "Cryptography Experiment".to_string(),
            common_name: "CA".to_string(),
        }
    }
}

impl CaIdentity {
    /// Distinguished name with the given common name.
    pub fn distinguished_name(&self, common_name: &str) -> DistinguishedName {
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CountryName, self.country.as_str());
        dn.push(DnType::StateOrProvinceName, self.state.as_str());
        dn.push(DnType::LocalityName, self.locality.as_str());
        dn.push(DnType::OrganizationName, self.organization.as_str());
        dn.push(DnType::CommonName, common_name);
        dn
    }
}

/// The CA's signing key plus its self-signed certificate.
pub struct CaKey {
    signing_key: SigningKey,
    key_pair: KeyPair,
    params: CertificateParams,
    certificate_pem: String,
    identity: CaIdentity,
}

impl std::fmt::Debug for CaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaKey").field("identity", &self.identity).finish_non_exhaustive()
    }
}

impl CaKey {
    /// Load from a KeyGuard-protected PEM blob.
    ///
    /// A wrong password surfaces as [`KeyLoadError::InvalidKey`]: the
    /// unmasked bytes do not parse.
    pub fn from_protected_pem(
        blob: &str,
        password: &str,
        identity: CaIdentity,
        now_ms: i64,
    ) -> Result<Self, KeyLoadError> {
        let clear = unwrap_private_key_pem(blob, password)?;
        Self::from_pkcs8_pem(&clear, identity, now_ms)
    }

    /// Load from a cleartext PKCS#8 PEM.
    ///
    /// Builds the self-signed CA certificate valid from `now_ms`.
    pub fn from_pkcs8_pem(
        pem: &str,
        identity: CaIdentity,
        now_ms: i64,
    ) -> Result<Self, KeyLoadError> {
        let signing_key = SigningKey::from_pkcs8_pem(pem).map_err(|_| KeyLoadError::InvalidKey)?;
        let key_pair = KeyPair::from_pem(pem).map_err(|_| KeyLoadError::InvalidKey)?;

        let not_before = offset_date_time(now_ms)
            .ok_or_else(|| KeyLoadError::Certificate(format!("clock out of range: {now_ms}")))?;

        let mut params = CertificateParams::new(Vec::<String>::new())
            .map_err(|e| KeyLoadError::Certificate(e.to_string()))?;
        params.distinguished_name = identity.distinguished_name(&identity.common_name);
        params.not_before = not_before;
        params.not_after = not_before + Duration::days(CA_CERT_VALIDITY_DAYS);
        params.is_ca = IsCa::Ca(BasicConstraints::Constrained(0));
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];

        let certificate = params
            .clone()
            .self_signed(&key_pair)
            .map_err(|e| KeyLoadError::Certificate(e.to_string()))?;

        Ok(Self {
            signing_key,
            key_pair,
            params,
            certificate_pem: certificate.pem(),
            identity,
        })
    }

    /// Sign `message` with ECDSA P-256 over SHA-256.
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    /// Public half, for envelope verification.
    pub fn verifying_key(&self) -> &VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Public key as SubjectPublicKeyInfo PEM.
    pub fn public_key_pem(&self) -> String {
        public_key_pem(self.verifying_key())
    }

    /// Self-signed CA certificate, PEM.
    pub fn certificate_pem(&self) -> &str {
        &self.certificate_pem
    }

    /// Issuer and subject naming.
    pub fn identity(&self) -> &CaIdentity {
        &self.identity
    }

    pub(crate) fn params(&self) -> &CertificateParams {
        &self.params
    }

    pub(crate) fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }
}

/// Milliseconds since the epoch as a UTC date-time.
pub(crate) fn offset_date_time(millis: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
}
