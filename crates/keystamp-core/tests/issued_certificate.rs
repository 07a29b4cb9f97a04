//! Inspects issued certificates with an independent X.509 parser.
//!
//! Verifies the fields clients and auditors depend on:
//! - Subject carries the CA's attributes with `CN=uid`
//! - Issuer is the CA's own name
//! - Validity starts at the issuance clock and lasts 365 days
//! - The subject key is exactly the submitted key
//! - The CA key signed the to-be-signed bytes

use keystamp_core::{
    CaIdentity, CaKey, Environment,
    env::test_utils::{MOCK_EPOCH_MS, MockEnv},
    issue_certificate,
    issuer::CERT_VALIDITY_DAYS,
};
use keystamp_crypto::{sha256_hex, verify_signature};
use p256::{
    ecdsa::{Signature, SigningKey},
    pkcs8::{EncodePrivateKey, LineEnding},
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use x509_parser::{certificate::X509Certificate, parse_x509_certificate, x509::X509Name};

fn ca(env: &MockEnv) -> CaKey {
    let key = SigningKey::random(&mut ChaCha8Rng::seed_from_u64(2024));
    let pem = key.to_pkcs8_pem(LineEnding::LF).unwrap();
    CaKey::from_pkcs8_pem(&pem, CaIdentity::default(), env.wall_clock_millis()).unwrap()
}

fn common_name(name: &X509Name<'_>) -> String {
    name.iter_common_name().next().unwrap().as_str().unwrap().to_string()
}

fn parse(der: &[u8]) -> X509Certificate<'_> {
    let (rest, cert) = parse_x509_certificate(der).unwrap();
    assert!(rest.is_empty());
    cert
}

#[test]
fn subject_and_issuer_names() {
    let env = MockEnv::new();
    let ca = ca(&env);
    let subject = SigningKey::random(&mut ChaCha8Rng::seed_from_u64(1));

    let issued = issue_certificate(&ca, "alice", subject.verifying_key(), &env).unwrap();
    let cert = parse(&issued.der);

    assert_eq!(common_name(cert.subject()), "alice");
    assert_eq!(common_name(cert.issuer()), "CA");

    let organization = cert.subject().iter_organization().next().unwrap().as_str().unwrap();
    assert_eq!(organization, "Cryptography Experiment");
    let locality = cert.issuer().iter_locality().next().unwrap().as_str().unwrap();
    assert_eq!(locality, "Harbin");
}

#[test]
fn validity_period() {
    let env = MockEnv::new();
    let ca = ca(&env);
    let subject = SigningKey::random(&mut ChaCha8Rng::seed_from_u64(2));

    let issued = issue_certificate(&ca, "bob", subject.verifying_key(), &env).unwrap();
    let cert = parse(&issued.der);

    let not_before = cert.validity().not_before.timestamp();
    let not_after = cert.validity().not_after.timestamp();
    assert_eq!(not_before, MOCK_EPOCH_MS / 1000);
    assert_eq!(not_after - not_before, CERT_VALIDITY_DAYS * 86_400);
}

#[test]
fn subject_key_and_ca_signature() {
    let env = MockEnv::new();
    let ca = ca(&env);
    let subject = SigningKey::random(&mut ChaCha8Rng::seed_from_u64(3));

    let issued = issue_certificate(&ca, "carol", subject.verifying_key(), &env).unwrap();
    let cert = parse(&issued.der);

    let point = subject.verifying_key().to_encoded_point(false);
    assert_eq!(&*cert.public_key().subject_public_key.data, point.as_bytes());

    let signature = Signature::from_der(&cert.signature_value.data).unwrap();
    let tbs: &[u8] = cert.tbs_certificate.as_ref();
    assert!(verify_signature(ca.verifying_key(), tbs, &signature).is_ok());

    assert_eq!(issued.fingerprint, sha256_hex(&issued.der));
    assert!(!cert.is_ca());
}

#[test]
fn serials_differ_between_issuances() {
    let env = MockEnv::new();
    let ca = ca(&env);
    let subject = SigningKey::random(&mut ChaCha8Rng::seed_from_u64(4));

    let first = issue_certificate(&ca, "dave", subject.verifying_key(), &env).unwrap();
    let second = issue_certificate(&ca, "dave", subject.verifying_key(), &env).unwrap();

    assert_ne!(first.serial, second.serial);
    assert_ne!(first.fingerprint, second.fingerprint);
    // Positive INTEGER: no sign bit on the leading byte
    assert_eq!(parse(&first.der).raw_serial()[0] & 0x80, 0);
}

#[test]
fn ca_certificate_is_a_ca() {
    let env = MockEnv::new();
    let ca = ca(&env);

    let (_, pem) = x509_parser::pem::parse_x509_pem(ca.certificate_pem().as_bytes()).unwrap();
    let cert = parse(&pem.contents);
    assert!(cert.is_ca());
    assert_eq!(common_name(cert.subject()), common_name(cert.issuer()));
}
