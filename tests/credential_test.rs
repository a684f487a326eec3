//! Credential registry: per-user cap and counter monotonicity

mod common;

use keepsake::db;
use keepsake::AuthError;

#[tokio::test]
async fn register_then_get_round_trips() {
    let ctx = common::test_context().await;
    let user = db::ensure_user(&ctx.db, "adas").await.unwrap();

    ctx.credentials
        .register("cred-1", user.id, b"public-key", 0, &["internal".to_string()])
        .await
        .unwrap();

    let stored = ctx
        .credentials
        .get("cred-1")
        .await
        .unwrap()
        .expect("credential should exist");

    assert_eq!(stored.user_id, user.id);
    assert_eq!(stored.counter, 0);
    assert_eq!(stored.public_key, b"public-key");
    assert_eq!(stored.transport_list(), vec!["internal".to_string()]);
}

#[tokio::test]
async fn unknown_credential_is_none() {
    let ctx = common::test_context().await;

    assert!(ctx.credentials.get("no-such-cred").await.unwrap().is_none());
}

#[tokio::test]
async fn descriptors_carry_ids_and_transports() {
    let ctx = common::test_context().await;
    let user = db::ensure_user(&ctx.db, "adas").await.unwrap();

    ctx.credentials
        .register("cred-1", user.id, b"pk1", 0, &["usb".to_string()])
        .await
        .unwrap();
    ctx.credentials
        .register("cred-2", user.id, b"pk2", 0, &[])
        .await
        .unwrap();

    let mut descriptors = ctx.credentials.descriptors_for_user(user.id).await.unwrap();
    descriptors.sort_by(|a, b| a.id.cmp(&b.id));

    assert_eq!(descriptors.len(), 2);
    assert_eq!(descriptors[0].id, "cred-1");
    assert_eq!(descriptors[0].transports, vec!["usb".to_string()]);
    assert!(descriptors[1].transports.is_empty());
}

#[tokio::test]
async fn fourth_passkey_is_rejected_and_registry_unchanged() {
    let ctx = common::test_context().await;
    let user = db::ensure_user(&ctx.db, "adas").await.unwrap();

    for i in 0..3 {
        ctx.credentials
            .register(&format!("cred-{i}"), user.id, b"pk", 0, &[])
            .await
            .unwrap();
    }

    let result = ctx
        .credentials
        .register("cred-overflow", user.id, b"pk", 0, &[])
        .await;

    assert_error_matches!(result, AuthError::CapacityExceeded);
    assert_eq!(ctx.credentials.count_for_user(user.id).await.unwrap(), 3);
    assert!(ctx
        .credentials
        .get("cred-overflow")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn cap_is_per_user() {
    let ctx = common::test_context().await;
    let adas = db::ensure_user(&ctx.db, "adas").await.unwrap();
    let roksanka = db::ensure_user(&ctx.db, "roksanka").await.unwrap();

    for i in 0..3 {
        ctx.credentials
            .register(&format!("adas-{i}"), adas.id, b"pk", 0, &[])
            .await
            .unwrap();
    }

    // The other account still has the full allowance.
    ctx.credentials
        .register("roksanka-0", roksanka.id, b"pk", 0, &[])
        .await
        .unwrap();
}

#[tokio::test]
async fn counter_advances_and_holds() {
    let ctx = common::test_context().await;
    let user = db::ensure_user(&ctx.db, "adas").await.unwrap();

    ctx.credentials
        .register("cred-1", user.id, b"pk", 0, &[])
        .await
        .unwrap();

    ctx.credentials.update_counter("cred-1", 1).await.unwrap();
    ctx.credentials.update_counter("cred-1", 7).await.unwrap();

    // Equal is allowed: the invariant is non-decreasing, not strictly rising.
    ctx.credentials.update_counter("cred-1", 7).await.unwrap();

    let stored = ctx.credentials.get("cred-1").await.unwrap().unwrap();
    assert_eq!(stored.counter, 7);
}

#[tokio::test]
async fn counter_regression_is_rejected_without_mutation() {
    let ctx = common::test_context().await;
    let user = db::ensure_user(&ctx.db, "adas").await.unwrap();

    ctx.credentials
        .register("cred-1", user.id, b"pk", 5, &[])
        .await
        .unwrap();

    let result = ctx.credentials.update_counter("cred-1", 3).await;

    assert_error_matches!(result, AuthError::CounterRegression);

    let stored = ctx.credentials.get("cred-1").await.unwrap().unwrap();
    assert_eq!(stored.counter, 5, "regression must never clamp or write");
}

#[tokio::test]
async fn counter_update_for_unknown_credential_fails() {
    let ctx = common::test_context().await;

    let result = ctx.credentials.update_counter("ghost", 1).await;

    assert_error_matches!(result, AuthError::CredentialNotFound);
}
