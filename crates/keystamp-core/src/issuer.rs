//! Certificate issuance.
//!
//! Builds a leaf certificate for a principal's already-authenticated public
//! key, signed by the CA. Only the public half of the subject key is known,
//! so it is handed to `rcgen` through [`PrincipalPublicKey`].

use keystamp_crypto::sha256_hex;
use p256::ecdsa::VerifyingKey;
use rcgen::{
    CertificateParams, IsCa, Issuer, KeyUsagePurpose, PKCS_ECDSA_P256_SHA256, PublicKeyData,
    SerialNumber, SignatureAlgorithm,
};
use time::Duration;

use crate::{
    ca::{CaKey, offset_date_time},
    env::Environment,
    error::AuthorityError,
};

/// Validity of issued certificates.
pub const CERT_VALIDITY_DAYS: i64 = 365;

/// Length of generated serial numbers in bytes.
pub const SERIAL_LEN: usize = 16;

/// A freshly signed certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCertificate {
    /// PEM encoding, returned to the client
    pub pem: String,
    /// DER encoding
    pub der: Vec<u8>,
    /// SHA-256 (hex) of `der`; the principal's `cert_digest`
    pub fingerprint: String,
    /// Serial number (hex)
    pub serial: String,
}

/// Subject public key for `rcgen`: the uncompressed SEC1 point.
struct PrincipalPublicKey {
    point: Vec<u8>,
}

impl PublicKeyData for PrincipalPublicKey {
    fn der_bytes(&self) -> &[u8] {
        &self.point
    }

    fn algorithm(&self) -> &'static SignatureAlgorithm {
        &PKCS_ECDSA_P256_SHA256
    }
}

/// Issue a certificate for `uid` over `subject_key`.
///
/// Issuer is the CA identity; subject is the same name with `CN=uid`.
/// Valid from now for [`CERT_VALIDITY_DAYS`], random serial from `env`.
pub fn issue_certificate<E: Environment>(
    ca: &CaKey,
    uid: &str,
    subject_key: &VerifyingKey,
    env: &E,
) -> Result<IssuedCertificate, AuthorityError> {
    let now_ms = env.wall_clock_millis();
    let not_before = offset_date_time(now_ms)
        .ok_or_else(|| AuthorityError::Issuance(format!("clock out of range: {now_ms}")))?;

    let serial = random_serial(env);

    let mut params = CertificateParams::new(Vec::<String>::new())
        .map_err(|e| AuthorityError::Issuance(e.to_string()))?;
    params.distinguished_name = ca.identity().distinguished_name(uid);
    params.not_before = not_before;
    params.not_after = not_before + Duration::days(CERT_VALIDITY_DAYS);
    params.serial_number = Some(SerialNumber::from(serial.to_vec()));
    params.is_ca = IsCa::NoCa;
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    params.use_authority_key_identifier_extension = true;

    let point = subject_key.to_encoded_point(false);
    let subject = PrincipalPublicKey { point: point.as_bytes().to_vec() };
    let issuer = Issuer::from_params(ca.params(), ca.key_pair());

    let certificate = params
        .signed_by(&subject, &issuer)
        .map_err(|e| AuthorityError::Issuance(e.to_string()))?;

    let der = certificate.der().to_vec();
    Ok(IssuedCertificate {
        pem: certificate.pem(),
        fingerprint: sha256_hex(&der),
        der,
        serial: hex::encode_upper(serial),
    })
}

/// Positive, non-zero serial: top bit cleared, low bit forced if all zero.
fn random_serial<E: Environment>(env: &E) -> [u8; SERIAL_LEN] {
    let mut serial = [0u8; SERIAL_LEN];
    env.random_bytes(&mut serial);
    serial[0] &= 0x7f;
    if serial.iter().all(|&b| b == 0) {
        serial[SERIAL_LEN - 1] = 1;
    }
    serial
}
