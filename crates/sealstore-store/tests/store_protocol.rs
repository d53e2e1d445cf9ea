//! End-to-end protocol tests over the in-memory backend.

use std::sync::Arc;

use rand::RngCore;

use sealstore_blob::{DataWithMetadata, Location, MemoryBackend, Metadata, SnapshotId};
use sealstore_codec::{
    CompressionAlgorithm, Compressor, EncryptionAlgorithm, EncryptionKey, Encryptor,
};
use sealstore_store::{
    MemoryQueue, RangeIdGenerator, SaveOptions, SecureStore, StoreError,
};

fn key() -> EncryptionKey {
    EncryptionKey([0x5a; 32])
}

struct Fixture {
    backend: Arc<MemoryBackend>,
    backup: Arc<MemoryQueue>,
    index: Arc<MemoryQueue>,
    store: SecureStore,
}

fn fixture() -> Fixture {
    let backend = Arc::new(MemoryBackend::new());
    let backup = Arc::new(MemoryQueue::new());
    let index = Arc::new(MemoryQueue::new());
    let store = SecureStore::builder(backend.clone())
        .compressor(Compressor::new(CompressionAlgorithm::Lz4))
        .encryptor(Encryptor::new(key(), EncryptionAlgorithm::AesGcm256))
        .id_generator(RangeIdGenerator::new(
            backend.clone(),
            Location::new("system", "ids"),
        ))
        .backup_queue(backup.clone())
        .index_queue(index.clone())
        .build();
    Fixture {
        backend,
        backup,
        index,
        store,
    }
}

fn payload(bytes: Vec<u8>) -> DataWithMetadata {
    DataWithMetadata::from_bytes(bytes, Metadata::new())
}

#[tokio::test]
async fn compressed_encrypted_megabyte_roundtrip() {
    let f = fixture();
    let loc = Location::new("docs", "blob");
    let mut input = vec![0u8; 1 << 20];
    rand::thread_rng().fill_bytes(&mut input);

    let receipt = f
        .store
        .save_data(
            &loc,
            payload(input.clone()),
            SaveOptions::COMPRESS | SaveOptions::ENCRYPT,
        )
        .await
        .unwrap();
    assert_eq!(receipt.metadata.compression(), Some("lz4"));
    assert_eq!(receipt.metadata.encryption(), Some("aes256-gcm"));

    // The stored bytes are the encoded pipeline output, not the input.
    let stored = f.backend.raw_bytes(&loc).unwrap();
    assert_ne!(stored, input);

    let (bytes, metadata) = f
        .store
        .load_data(&loc, None)
        .await
        .unwrap()
        .unwrap()
        .read_to_end()
        .await
        .unwrap();
    assert_eq!(bytes, input);
    assert_eq!(metadata.compression(), Some("lz4"));
    assert_eq!(metadata.encryption(), Some("aes256-gcm"));
}

#[tokio::test]
async fn user_metadata_survives_the_pipeline() {
    let f = fixture();
    let loc = Location::new("docs", "tagged");
    let mut meta = Metadata::new();
    meta.set("tenant", "acme");
    meta.set("origin", "import");

    f.store
        .save_data(
            &loc,
            DataWithMetadata::from_bytes(b"payload".to_vec(), meta),
            SaveOptions::ENCRYPT,
        )
        .await
        .unwrap();

    let (_, metadata) = f
        .store
        .load_data(&loc, None)
        .await
        .unwrap()
        .unwrap()
        .read_to_end()
        .await
        .unwrap();
    assert_eq!(metadata.get("tenant"), Some("acme"));
    assert_eq!(metadata.get("origin"), Some("import"));
    assert!(metadata.compression().is_none());
    assert_eq!(metadata.encryption(), Some("aes256-gcm"));
}

#[tokio::test]
async fn optimistic_conflict_second_writer_loses() {
    let f = fixture();
    let loc = Location::new("docs", "contended");
    let saved = f
        .store
        .save_data(&loc, payload(b"base".to_vec()), SaveOptions::NONE)
        .await
        .unwrap();
    let etag = saved.metadata.etag().unwrap().to_string();

    let mut first_meta = Metadata::new();
    first_meta.set_etag(etag.clone());
    let first = f
        .store
        .save_with_etag(
            &loc,
            DataWithMetadata::from_bytes(b"writer-1".to_vec(), first_meta),
            SaveOptions::NONE,
        )
        .await
        .unwrap();
    assert!(first.ok);
    let new_etag = first.receipt.unwrap().metadata.etag().unwrap().to_string();
    assert_ne!(new_etag, etag);

    let mut second_meta = Metadata::new();
    second_meta.set_etag(etag);
    let second = f
        .store
        .save_with_etag(
            &loc,
            DataWithMetadata::from_bytes(b"writer-2".to_vec(), second_meta),
            SaveOptions::NONE,
        )
        .await
        .unwrap();
    assert!(!second.ok);
    assert!(second.receipt.is_none());

    let (bytes, _) = f
        .store
        .load_data(&loc, None)
        .await
        .unwrap()
        .unwrap()
        .read_to_end()
        .await
        .unwrap();
    assert_eq!(bytes, b"writer-1");
}

#[tokio::test]
async fn optimistic_write_boundaries() {
    let f = fixture();
    let loc = Location::new("docs", "boundaries");

    // Create-if-absent succeeds on a missing object.
    let created = f
        .store
        .save_with_etag(&loc, payload(b"v1".to_vec()), SaveOptions::NONE)
        .await
        .unwrap();
    assert!(created.ok);

    // No etag against an existing object loses.
    let no_etag = f
        .store
        .save_with_etag(&loc, payload(b"v2".to_vec()), SaveOptions::NONE)
        .await
        .unwrap();
    assert!(!no_etag.ok);

    // A stale etag loses.
    let mut stale = Metadata::new();
    stale.set_etag("stale-token");
    let stale_write = f
        .store
        .save_with_etag(
            &loc,
            DataWithMetadata::from_bytes(b"v3".to_vec(), stale),
            SaveOptions::NONE,
        )
        .await
        .unwrap();
    assert!(!stale_write.ok);
}

#[tokio::test]
async fn soft_delete_hides_object_but_keeps_snapshot() {
    let f = fixture();
    let loc = Location::new("docs", "soft");
    f.store
        .save_data(&loc, payload(b"version-a".to_vec()), SaveOptions::NONE)
        .await
        .unwrap();
    let receipt = f
        .store
        .save_data(&loc, payload(b"version-b".to_vec()), SaveOptions::NONE)
        .await
        .unwrap();
    let snapshot = SnapshotId::new(receipt.metadata.snapshot().unwrap());

    let deleted = f
        .store
        .delete(&loc, SaveOptions::KEEP_DELETES)
        .await
        .unwrap();
    assert!(deleted);

    // The tombstoned object loads as absent even though its bytes exist.
    assert!(f.backend.raw_bytes(&loc).is_some());
    assert!(f.store.load_data(&loc, None).await.unwrap().is_none());

    // Snapshot loads ignore the tombstone.
    let (bytes, _) = f
        .store
        .load_data(&loc, Some(&snapshot))
        .await
        .unwrap()
        .unwrap()
        .read_to_end()
        .await
        .unwrap();
    assert_eq!(bytes, b"version-a");
}

#[tokio::test]
async fn permanent_delete_removes_snapshots_too() {
    let f = fixture();
    let loc = Location::new("docs", "hard");
    f.store
        .save_data(&loc, payload(b"v1".to_vec()), SaveOptions::NONE)
        .await
        .unwrap();
    f.store
        .save_data(&loc, payload(b"v2".to_vec()), SaveOptions::NONE)
        .await
        .unwrap();

    f.store.delete(&loc, SaveOptions::NONE).await.unwrap();
    assert!(f.store.load_data(&loc, None).await.unwrap().is_none());
    let mut rx = f.store.find_snapshots(&loc).await.unwrap();
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn delete_of_missing_object_is_noop() {
    let f = fixture();
    let deleted = f
        .store
        .delete(&Location::new("docs", "ghost"), SaveOptions::ALL)
        .await
        .unwrap();
    assert!(!deleted);
    assert!(f.backup.is_empty());
    assert!(f.index.is_empty());
}

#[tokio::test]
async fn resave_with_options_cleared_strips_codec_keys() {
    let f = fixture();
    let loc = Location::new("docs", "strip");
    f.store
        .save_data(
            &loc,
            payload(b"secret".to_vec()),
            SaveOptions::COMPRESS | SaveOptions::ENCRYPT,
        )
        .await
        .unwrap();

    f.store
        .save_data(&loc, payload(b"plain".to_vec()), SaveOptions::NONE)
        .await
        .unwrap();

    let metadata = f.store.get_metadata(&loc, None).await.unwrap().unwrap();
    assert!(metadata.compression().is_none());
    assert!(metadata.encryption().is_none());

    let (bytes, _) = f
        .store
        .load_data(&loc, None)
        .await
        .unwrap()
        .unwrap()
        .read_to_end()
        .await
        .unwrap();
    assert_eq!(bytes, b"plain");
}

#[tokio::test]
async fn lock_excludes_writers_until_released() {
    let f = fixture();
    let loc = Location::new("docs", "locked");
    f.store
        .save_data(&loc, payload(b"v1".to_vec()), SaveOptions::NONE)
        .await
        .unwrap();

    let lease = f.store.lock(&loc).await.unwrap().unwrap();
    assert!(f.store.lock(&loc).await.unwrap().is_none());

    let err = f
        .store
        .save_data(&loc, payload(b"v2".to_vec()), SaveOptions::NONE)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Backend(sealstore_blob::BackendError::Locked(_))
    ));

    lease.release();
    f.store
        .save_data(&loc, payload(b"v2".to_vec()), SaveOptions::NONE)
        .await
        .unwrap();

    // And the location can be leased again.
    assert!(f.store.lock(&loc).await.unwrap().is_some());
}

#[tokio::test]
async fn save_fans_out_to_both_queues() {
    let f = fixture();
    let loc = Location::new("docs", "notify");
    let receipt = f
        .store
        .save_data(
            &loc,
            payload(b"x".to_vec()),
            SaveOptions::ENCRYPT
                | SaveOptions::GENERATE_ID
                | SaveOptions::BACKUP
                | SaveOptions::INDEX,
        )
        .await
        .unwrap();

    let id = receipt.location.id().unwrap();
    assert!(id >= 1);

    for queue in [&f.backup, &f.index] {
        let sent = queue.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].container, "docs");
        assert_eq!(sent[0].base_path, "notify");
        assert_eq!(sent[0].id, Some(id));
        assert_eq!(sent[0].metadata.encryption(), Some("aes256-gcm"));
    }
}

#[tokio::test]
async fn lost_optimistic_write_enqueues_nothing() {
    let f = fixture();
    let loc = Location::new("docs", "silent");
    f.store
        .save_data(&loc, payload(b"v1".to_vec()), SaveOptions::NONE)
        .await
        .unwrap();

    let outcome = f
        .store
        .save_with_etag(
            &loc,
            payload(b"v2".to_vec()),
            SaveOptions::BACKUP | SaveOptions::INDEX,
        )
        .await
        .unwrap();
    assert!(!outcome.ok);
    assert!(f.backup.is_empty());
    assert!(f.index.is_empty());
}

#[tokio::test]
async fn queue_failure_aborts_save_after_backend_ack() {
    let backend = Arc::new(MemoryBackend::new());
    let store = SecureStore::builder(backend.clone())
        .backup_queue(Arc::new(sealstore_store::queue::FailingQueue))
        .build();
    let loc = Location::new("docs", "unlucky");

    let err = store
        .save_data(&loc, payload(b"x".to_vec()), SaveOptions::BACKUP)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::QueueDispatch(_)));

    // The payload is durable regardless; only the notification failed.
    assert!(backend.raw_bytes(&loc).is_some());
}

#[tokio::test]
async fn typed_object_roundtrip_and_type_check() {
    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Widget {
        name: String,
        weight: u32,
    }

    let f = fixture();
    let loc = Location::new("docs", "widget");
    let widget = Widget {
        name: "flange".to_string(),
        weight: 12,
    };
    f.store
        .save_object(&loc, &widget, "app.Widget", Metadata::new(), SaveOptions::ENCRYPT)
        .await
        .unwrap();

    let loaded: Widget = f
        .store
        .load_object(&loc, "app.Widget")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded, widget);

    let mismatch = f.store.load_object::<Widget>(&loc, "app.Gadget").await;
    assert!(matches!(mismatch, Err(StoreError::InvariantViolation(_))));

    let missing: Option<Widget> = f
        .store
        .load_object(&Location::new("docs", "absent"), "app.Widget")
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn algorithm_mismatch_on_load_is_invariant_violation() {
    let backend = Arc::new(MemoryBackend::new());
    let loc = Location::new("docs", "mismatch");
    let writer = SecureStore::builder(backend.clone())
        .encryptor(Encryptor::new(key(), EncryptionAlgorithm::AesGcm256))
        .build();
    writer
        .save_data(&loc, payload(b"secret".to_vec()), SaveOptions::ENCRYPT)
        .await
        .unwrap();

    let reader = SecureStore::builder(backend)
        .encryptor(Encryptor::new(key(), EncryptionAlgorithm::ChaCha20Poly1305))
        .build();
    assert!(matches!(
        reader.load_data(&loc, None).await,
        Err(StoreError::InvariantViolation(_))
    ));
}

#[tokio::test]
async fn re_index_enqueues_one_message_per_listed_file() {
    let f = fixture();
    for name in ["items/1", "items/2", "other/1"] {
        f.store
            .save_data(
                &Location::new("docs", name),
                payload(b"x".to_vec()),
                SaveOptions::NONE,
            )
            .await
            .unwrap();
    }
    // Tombstoned entries the backend lists are re-indexed too.
    f.store
        .delete(&Location::new("docs", "items/2"), SaveOptions::KEEP_DELETES)
        .await
        .unwrap();

    let sent = f.store.re_index_all("docs", Some("items/")).await.unwrap();
    assert_eq!(sent, 2);
    let messages = f.index.sent();
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| m.container == "docs"));
    assert!(messages.iter().any(|m| m.metadata.is_tombstoned()));
}

#[tokio::test]
async fn backup_all_covers_whole_container() {
    let f = fixture();
    for name in ["a", "b", "c"] {
        f.store
            .save_data(
                &Location::new("docs", name),
                payload(b"x".to_vec()),
                SaveOptions::NONE,
            )
            .await
            .unwrap();
    }
    let sent = f.store.backup_all("docs", None).await.unwrap();
    assert_eq!(sent, 3);
    assert_eq!(f.backup.len(), 3);
}

#[tokio::test]
async fn stats_track_the_protocol() {
    let f = fixture();
    let loc = Location::new("docs", "counted");
    f.store
        .save_data(&loc, payload(b"v1".to_vec()), SaveOptions::NONE)
        .await
        .unwrap();
    f.store.load_data(&loc, None).await.unwrap().unwrap();
    f.store
        .delete(&loc, SaveOptions::KEEP_DELETES)
        .await
        .unwrap();
    assert!(f.store.load_data(&loc, None).await.unwrap().is_none());

    let stats = f.store.stats();
    assert_eq!(stats.saves, 1);
    assert_eq!(stats.loads, 1);
    assert_eq!(stats.deletes, 1);
    assert_eq!(stats.tombstones_filtered, 1);
}
