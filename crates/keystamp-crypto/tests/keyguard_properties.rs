//! Property tests for KeyGuard wrapping.

use keystamp_crypto::{unwrap_private_key_pem, wrap_private_key_pem};
use p256::{
    ecdsa::SigningKey,
    pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding},
};
use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

#[test]
fn prop_wrap_then_unwrap_recovers_key() {
    proptest!(ProptestConfig::with_cases(64), |(
        seed in any::<u64>(),
        password in ".{0,40}",
    )| {
        let key = SigningKey::random(&mut ChaCha8Rng::seed_from_u64(seed));
        let clear = key.to_pkcs8_pem(LineEnding::LF).unwrap();

        let wrapped = wrap_private_key_pem(&clear, &password).unwrap();
        let unwrapped = unwrap_private_key_pem(&wrapped, &password).unwrap();

        // ORACLE: unwrap(wrap(key, pw), pw) is the same key
        let recovered = SigningKey::from_pkcs8_pem(&unwrapped).unwrap();
        prop_assert_eq!(recovered.to_bytes(), key.to_bytes());
    });
}

#[test]
fn prop_wrapped_form_never_parses_as_cleartext() {
    proptest!(ProptestConfig::with_cases(32), |(
        seed in any::<u64>(),
        password in "[a-zA-Z0-9]{1,24}",
    )| {
        let key = SigningKey::random(&mut ChaCha8Rng::seed_from_u64(seed));
        let clear = key.to_pkcs8_pem(LineEnding::LF).unwrap();

        let wrapped = wrap_private_key_pem(&clear, &password).unwrap();

        // ORACLE: the on-disk form is not a usable key without the password
        prop_assert!(SigningKey::from_pkcs8_pem(&wrapped).is_err());
    });
}
