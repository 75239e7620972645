mod common;

use common::{degree_request, degree_type, setup, HOLDER, ISSUER};
use credvault::models::{Credential, StorageType};
use credvault::{BlobStore, CredentialError};
use std::sync::atomic::Ordering;
use std::time::Duration;

/// Poll the store until the credential's chain block ref lands or the
/// deadline passes. The finality watcher runs on a background task.
async fn wait_for_block_ref(ctx: &common::TestContext, credential_id: &str) -> Credential {
    for _ in 0..50 {
        let credential = ctx.credentials.get_credential(credential_id).await.unwrap();
        if credential.chain_block_ref.is_some() {
            return credential;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("chain block ref never recorded for {}", credential_id);
}

#[tokio::test]
async fn hybrid_write_keeps_local_copy_and_blob() {
    let ctx = setup().await;
    let type_id = degree_type(&ctx).await;

    let credential = ctx
        .hybrid
        .create_credential(ISSUER, HOLDER, &degree_request(&type_id, StorageType::Hybrid, false))
        .await
        .unwrap();

    assert_eq!(credential.storage_type, StorageType::Hybrid);
    assert!(credential.credential_data.is_some());
    let blob_hash = credential.blob_hash.as_deref().unwrap();
    assert!(ctx.blob.contains(blob_hash));

    // Blob and local copies hold the same envelope.
    let stored = ctx.blob.fetch(blob_hash).await.unwrap();
    assert_eq!(
        String::from_utf8(stored).unwrap(),
        credential.credential_data.clone().unwrap()
    );

    let data = ctx.hybrid.get_credential_data(&credential.id).await.unwrap();
    assert_eq!(data["degree"], "BSc Computer Science");
}

#[tokio::test]
async fn blob_write_offloads_ciphertext() {
    let ctx = setup().await;
    let type_id = degree_type(&ctx).await;

    let credential = ctx
        .hybrid
        .create_credential(ISSUER, HOLDER, &degree_request(&type_id, StorageType::Blob, false))
        .await
        .unwrap();

    assert_eq!(credential.storage_type, StorageType::Blob);
    assert!(credential.credential_data.is_none());
    assert!(credential.blob_hash.is_some());

    let data = ctx.hybrid.get_credential_data(&credential.id).await.unwrap();
    assert_eq!(data["institution"], "Example University");
}

#[tokio::test]
async fn blob_failure_degrades_to_local() {
    let ctx = setup().await;
    let type_id = degree_type(&ctx).await;
    ctx.blob.fail_uploads.store(true, Ordering::SeqCst);

    let credential = ctx
        .hybrid
        .create_credential(ISSUER, HOLDER, &degree_request(&type_id, StorageType::Hybrid, false))
        .await
        .unwrap();

    // The write survives; the credential just lands one tier lower.
    assert_eq!(credential.storage_type, StorageType::Local);
    assert!(credential.blob_hash.is_none());
    assert!(credential.credential_data.is_some());

    let data = ctx.hybrid.get_credential_data(&credential.id).await.unwrap();
    assert_eq!(data["degree"], "BSc Computer Science");
}

#[tokio::test]
async fn blob_fetch_failure_falls_back_to_local() {
    let ctx = setup().await;
    let type_id = degree_type(&ctx).await;

    let credential = ctx
        .hybrid
        .create_credential(ISSUER, HOLDER, &degree_request(&type_id, StorageType::Hybrid, false))
        .await
        .unwrap();

    ctx.blob.fail_fetches.store(true, Ordering::SeqCst);
    let data = ctx.hybrid.get_credential_data(&credential.id).await.unwrap();
    assert_eq!(data["degree"], "BSc Computer Science");
}

#[tokio::test]
async fn tier_exhaustion_is_an_error() {
    let ctx = setup().await;
    let type_id = degree_type(&ctx).await;

    // Blob-only: no local ciphertext to fall back on.
    let credential = ctx
        .hybrid
        .create_credential(ISSUER, HOLDER, &degree_request(&type_id, StorageType::Blob, false))
        .await
        .unwrap();

    ctx.blob.fail_fetches.store(true, Ordering::SeqCst);
    let err = ctx.hybrid.get_credential_data(&credential.id).await.unwrap_err();
    assert!(matches!(err, CredentialError::Storage(_)));
}

#[tokio::test]
async fn anchored_write_records_chain_refs() {
    let ctx = setup().await;
    let type_id = degree_type(&ctx).await;

    let credential = ctx
        .hybrid
        .create_credential(ISSUER, HOLDER, &degree_request(&type_id, StorageType::Hybrid, true))
        .await
        .unwrap();

    assert!(credential.chain_extrinsic_ref.is_some());

    let anchored = wait_for_block_ref(&ctx, &credential.id).await;
    assert!(anchored.chain_block_ref.as_deref().unwrap().starts_with("0xblock"));
    assert_eq!(ctx.chain.submitted_count(), 1);
}

#[tokio::test]
async fn anchor_failure_leaves_blob_backed_credential() {
    let ctx = setup().await;
    let type_id = degree_type(&ctx).await;
    ctx.chain.fail_submissions.store(true, Ordering::SeqCst);

    let credential = ctx
        .hybrid
        .create_credential(ISSUER, HOLDER, &degree_request(&type_id, StorageType::Hybrid, true))
        .await
        .unwrap();

    // Anchoring degrades, the storage tiers stay intact.
    assert_eq!(credential.storage_type, StorageType::Hybrid);
    assert!(credential.blob_hash.is_some());
    assert!(credential.chain_extrinsic_ref.is_none());
}

#[tokio::test]
async fn hash_is_stable_across_tiers() {
    let ctx = setup().await;
    let type_id = degree_type(&ctx).await;

    let local = ctx
        .hybrid
        .create_credential(ISSUER, HOLDER, &degree_request(&type_id, StorageType::Local, false))
        .await
        .unwrap();
    let hybrid = ctx
        .hybrid
        .create_credential(ISSUER, HOLDER, &degree_request(&type_id, StorageType::Hybrid, false))
        .await
        .unwrap();
    let blob = ctx
        .hybrid
        .create_credential(ISSUER, HOLDER, &degree_request(&type_id, StorageType::Blob, false))
        .await
        .unwrap();

    // Same plaintext hashes the same regardless of where it lives.
    assert_eq!(local.credential_hash, hybrid.credential_hash);
    assert_eq!(hybrid.credential_hash, blob.credential_hash);
}

#[tokio::test]
async fn migrate_to_ipfs_is_one_way() {
    let ctx = setup().await;
    let type_id = degree_type(&ctx).await;

    let credential = ctx
        .hybrid
        .create_credential(ISSUER, HOLDER, &degree_request(&type_id, StorageType::Local, false))
        .await
        .unwrap();
    assert!(credential.blob_hash.is_none());

    let migrated = ctx.hybrid.migrate_to_ipfs(&credential.id).await.unwrap();
    assert_eq!(migrated.storage_type, StorageType::Hybrid);
    let blob_hash = migrated.blob_hash.as_deref().unwrap();
    assert!(ctx.blob.contains(blob_hash));

    // Data still decrypts to the original payload.
    let data = ctx.hybrid.get_credential_data(&credential.id).await.unwrap();
    assert_eq!(data["degree"], "BSc Computer Science");

    // Already migrated: rejected.
    assert!(matches!(
        ctx.hybrid.migrate_to_ipfs(&credential.id).await,
        Err(CredentialError::Validation(_))
    ));
}

#[tokio::test]
async fn anchor_existing_requires_blob_and_no_prior_anchor() {
    let ctx = setup().await;
    let type_id = degree_type(&ctx).await;

    // Local-only credential cannot be anchored.
    let local = ctx
        .hybrid
        .create_credential(ISSUER, HOLDER, &degree_request(&type_id, StorageType::Local, false))
        .await
        .unwrap();
    assert!(matches!(
        ctx.hybrid.anchor_existing(&local.id).await,
        Err(CredentialError::Validation(_))
    ));

    // Blob-backed, unanchored credential can.
    let hybrid = ctx
        .hybrid
        .create_credential(ISSUER, HOLDER, &degree_request(&type_id, StorageType::Hybrid, false))
        .await
        .unwrap();
    let anchored = ctx.hybrid.anchor_existing(&hybrid.id).await.unwrap();
    assert!(anchored.chain_extrinsic_ref.is_some());

    // But only once.
    assert!(matches!(
        ctx.hybrid.anchor_existing(&hybrid.id).await,
        Err(CredentialError::Validation(_))
    ));
}

#[tokio::test]
async fn storage_stats_count_each_tier() {
    let ctx = setup().await;
    let type_id = degree_type(&ctx).await;

    ctx.hybrid
        .create_credential(ISSUER, HOLDER, &degree_request(&type_id, StorageType::Local, false))
        .await
        .unwrap();
    ctx.hybrid
        .create_credential(ISSUER, HOLDER, &degree_request(&type_id, StorageType::Hybrid, false))
        .await
        .unwrap();
    ctx.hybrid
        .create_credential(ISSUER, HOLDER, &degree_request(&type_id, StorageType::Blob, true))
        .await
        .unwrap();

    let stats = ctx.hybrid.get_storage_stats().await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.local, 1);
    assert_eq!(stats.hybrid, 1);
    assert_eq!(stats.blob, 1);
    assert_eq!(stats.with_blob_hash, 2);
    assert_eq!(stats.chain_anchored, 1);
}
