mod common;

use common::{draft, instant_config};
use txgate_flow_adapters::{crypto, FlowAdapterConfig, VaultPasswordAdapter};
use txgate_flow_core::{AuthError, PasswordPort};

#[tokio::test(flavor = "multi_thread")]
async fn correct_password_unseals_and_signs_the_bundle() {
    let adapter = VaultPasswordAdapter::provision("hunter2", b"signing-secret", &instant_config())
        .expect("provision vault");
    let drafts = vec![draft(100), draft(200)];

    let signed = adapter
        .verify_and_sign("hunter2", &drafts)
        .await
        .expect("correct password must sign");

    assert_eq!(signed.tx_hash, crypto::bundle_digest(&drafts));
    let expected_tag = crypto::authorization_tag(b"signing-secret", signed.tx_hash).expect("tag");
    assert_eq!(signed.raw.as_ref(), expected_tag.as_slice());
}

#[tokio::test(flavor = "multi_thread")]
async fn wrong_password_fails_aead_authentication() {
    let adapter = VaultPasswordAdapter::provision("hunter2", b"signing-secret", &instant_config())
        .expect("provision vault");

    let err = adapter
        .verify_and_sign("hunter3", &[draft(1)])
        .await
        .expect_err("wrong password must fail");
    assert_eq!(err, AuthError::InvalidPassword);

    // The vault is not burned by a failure.
    adapter
        .verify_and_sign("hunter2", &[draft(1)])
        .await
        .expect("correct password still works");
}

#[tokio::test(flavor = "multi_thread")]
async fn repeated_failures_trip_the_rate_limiter() {
    let config = FlowAdapterConfig {
        max_password_failures: 2,
        password_failure_window_ms: 60_000,
        ..instant_config()
    };
    let adapter = VaultPasswordAdapter::provision("hunter2", b"signing-secret", &config)
        .expect("provision vault");

    for _ in 0..2 {
        let err = adapter
            .verify_and_sign("nope", &[draft(1)])
            .await
            .expect_err("wrong password");
        assert_eq!(err, AuthError::InvalidPassword);
    }

    // Window full: even the correct password is refused before the KDF runs.
    match adapter
        .verify_and_sign("hunter2", &[draft(1)])
        .await
        .expect_err("rate limited")
    {
        AuthError::RateLimited { retry_after_ms } => {
            assert!(retry_after_ms <= 60_000, "retry hint within the window");
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn success_resets_the_failure_window() {
    let config = FlowAdapterConfig {
        max_password_failures: 2,
        ..instant_config()
    };
    let adapter = VaultPasswordAdapter::provision("hunter2", b"signing-secret", &config)
        .expect("provision vault");

    adapter
        .verify_and_sign("nope", &[draft(1)])
        .await
        .expect_err("wrong password");
    adapter
        .verify_and_sign("hunter2", &[draft(1)])
        .await
        .expect("correct password");

    // A single failure after the reset does not trip the limiter.
    let err = adapter
        .verify_and_sign("nope", &[draft(1)])
        .await
        .expect_err("wrong password");
    assert_eq!(err, AuthError::InvalidPassword);
}

#[test]
fn sealed_secret_round_trips_through_the_recorded_kdf() {
    let sealed = crypto::seal_secret(b"passphrase", b"the-secret").expect("seal");
    let opened = crypto::open_secret(b"passphrase", &sealed).expect("open");
    assert_eq!(opened, b"the-secret");

    assert!(matches!(
        crypto::open_secret(b"wrong", &sealed),
        Err(crypto::CryptoError::Unseal)
    ));
}
