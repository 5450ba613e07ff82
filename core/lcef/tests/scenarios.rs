//! End-to-end vault and exchange scenarios.

use std::io::Cursor;
use std::sync::Arc;

use lifechest_common::Error;
use lifechest_lcef::{export_file, import_containers, is_lcef, Container};
use lifechest_storage::{ContentStore, LocalStore, MemoryStore};
use lifechest_vault::{
    FileImport, SoftwareSecureElement, StaticCredentials, UnlockContext, UnlockMechanism,
    VaultManager, VaultPolicy, VaultState,
};
use tempfile::TempDir;

#[tokio::test]
async fn pin_vault_survives_reopen() {
    let temp = TempDir::new().unwrap();
    let manager = VaultManager::new(Arc::new(LocalStore::new(temp.path()).unwrap()));
    let pin = StaticCredentials::new("9317");
    let ctx = UnlockContext::new(&pin);

    let mut session = manager
        .create_vault(VaultPolicy::new("Test", UnlockMechanism::Pin), &ctx)
        .await
        .unwrap();
    let root = session.tree().unwrap().root_id().to_string();
    session
        .operations()
        .unwrap()
        .import_file(&root, FileImport::new("a.txt", "text/plain"), &b"0123456789"[..])
        .unwrap();
    let id = session.vault_id().clone();
    session.close();

    let reopened = manager.open_vault(&id, &ctx).await.unwrap();
    let files = reopened.tree().unwrap().list_files();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].name, "a.txt");
    assert_eq!(files[0].size, 10);

    let wrong = StaticCredentials::new("1234");
    let mut locked = manager.load_vault(&id).unwrap();
    let result = locked.unlock(&UnlockContext::new(&wrong)).await;
    assert!(matches!(result, Err(Error::Credential(_))));
    assert_eq!(locked.state(), VaultState::Locked);
    assert!(locked.tree().is_err());
}

#[tokio::test]
async fn random_access_on_five_megabytes() {
    let manager = VaultManager::new(Arc::new(MemoryStore::new()));
    let credentials = StaticCredentials::new("Correct-Horse-42");
    let ctx = UnlockContext::new(&credentials);
    let data: Vec<u8> = (0..5 * 1024 * 1024u32).map(|i| i as u8).collect();

    let mut session = manager
        .create_vault(VaultPolicy::new("Media", UnlockMechanism::Password), &ctx)
        .await
        .unwrap();
    let root = session.tree().unwrap().root_id().to_string();
    let node = session
        .operations()
        .unwrap()
        .import_file(&root, FileImport::new("big.bin", "application/octet-stream"), &data[..])
        .unwrap();

    let ops = session.operations().unwrap();
    let range = ops.read_range(node.id(), 1_048_576, 4096).unwrap();
    assert_eq!(range, data[1_048_576..1_052_672]);

    let resolver = session.content_resolver().unwrap();
    let mut handle = resolver.open(session.vault_id(), node.id()).unwrap();
    assert_eq!(handle.size(), data.len() as u64);
    assert_eq!(handle.read_range(3_000_001, 33).unwrap(), data[3_000_001..3_000_034]);
}

#[tokio::test]
async fn exported_file_imports_into_another_vault() {
    let store = Arc::new(MemoryStore::new());
    let manager = VaultManager::new(store.clone());
    let source_pin = StaticCredentials::new("9317");
    let dest_pin = StaticCredentials::new("2580");

    let mut source = manager
        .create_vault(
            VaultPolicy::new("Source", UnlockMechanism::Pin),
            &UnlockContext::new(&source_pin),
        )
        .await
        .unwrap();
    let root = source.tree().unwrap().root_id().to_string();
    let body: Vec<u8> = (0..40_000u32).map(|i| (i * 31 % 256) as u8).collect();
    let original = source
        .operations()
        .unwrap()
        .import_file(
            &root,
            FileImport::new("holiday.jpg", "image/jpeg").with_thumbnail(vec![42; 64]),
            &body[..],
        )
        .unwrap();

    let mut container = Vec::new();
    export_file(&source, original.id(), &mut container).unwrap();
    assert!(is_lcef(&mut Cursor::new(&container)).unwrap());

    let raw_body = {
        let mut reader = store.open_blob(source.vault_id(), original.id()).unwrap();
        let mut bytes = Vec::new();
        std::io::Read::read_to_end(&mut reader, &mut bytes).unwrap();
        bytes
    };
    assert!(container.ends_with(&raw_body));

    let mut dest = manager
        .create_vault(
            VaultPolicy::new("Dest", UnlockMechanism::Pin),
            &UnlockContext::new(&dest_pin),
        )
        .await
        .unwrap();
    let dest_root = dest.tree().unwrap().root_id().to_string();

    let opened = Container::open(Cursor::new(container.clone())).unwrap();
    let imported = import_containers(
        &mut dest,
        &dest_root,
        vec![opened],
        &UnlockContext::new(&source_pin),
    )
    .await
    .unwrap();
    assert_eq!(imported.len(), 1);

    let copy = &imported[0];
    assert_ne!(copy.id(), original.id());
    assert_eq!(copy.name, "holiday.jpg");
    assert_eq!(copy.mime_type, "image/jpeg");
    assert_eq!(copy.size, original.size);
    assert_eq!(
        copy.creation_date.timestamp_millis(),
        original.creation_date.timestamp_millis()
    );

    let ops = dest.operations().unwrap();
    assert_eq!(ops.read_file(copy.id()).unwrap(), body);
    assert_eq!(ops.read_thumbnail(copy.id()).unwrap(), Some(vec![42; 64]));

    let dest_id = dest.vault_id().clone();
    drop(dest);
    let reopened = manager
        .open_vault(&dest_id, &UnlockContext::new(&dest_pin))
        .await
        .unwrap();
    assert!(reopened.tree().unwrap().contains(copy.id()));
}

#[tokio::test]
async fn import_with_wrong_credentials_inserts_nothing() {
    let store = Arc::new(MemoryStore::new());
    let manager = VaultManager::new(store.clone());
    let source_pin = StaticCredentials::new("9317");

    let mut source = manager
        .create_vault(
            VaultPolicy::new("Source", UnlockMechanism::Pin),
            &UnlockContext::new(&source_pin),
        )
        .await
        .unwrap();
    let root = source.tree().unwrap().root_id().to_string();
    let node = source
        .operations()
        .unwrap()
        .import_file(&root, FileImport::new("x", "text/plain"), &b"x"[..])
        .unwrap();
    let mut container = Vec::new();
    export_file(&source, node.id(), &mut container).unwrap();

    let mut dest = manager
        .create_vault(
            VaultPolicy::new("Dest", UnlockMechanism::Pin),
            &UnlockContext::new(&source_pin),
        )
        .await
        .unwrap();
    let dest_root = dest.tree().unwrap().root_id().to_string();

    let wrong = StaticCredentials::new("1234");
    let result = import_containers(
        &mut dest,
        &dest_root,
        vec![Container::open(Cursor::new(container)).unwrap()],
        &UnlockContext::new(&wrong),
    )
    .await;

    assert!(matches!(result, Err(Error::Credential(_))));
    assert_eq!(dest.tree().unwrap().count(), 0);
    assert!(store.list_blobs(dest.vault_id()).unwrap().is_empty());
}

#[tokio::test]
async fn biometric_vaults_refuse_export() {
    let manager = VaultManager::new(Arc::new(MemoryStore::new()));
    let credentials = StaticCredentials::refusing();
    let element = SoftwareSecureElement::new();
    let ctx = UnlockContext::new(&credentials).with_secure_element(&element);

    let mut session = manager
        .create_vault(VaultPolicy::new("Bio", UnlockMechanism::Biometric), &ctx)
        .await
        .unwrap();
    let root = session.tree().unwrap().root_id().to_string();
    let node = session
        .operations()
        .unwrap()
        .import_file(&root, FileImport::new("f", "text/plain"), &b"f"[..])
        .unwrap();

    let mut out = Vec::new();
    let result = export_file(&session, node.id(), &mut out);
    assert!(matches!(result, Err(Error::NotPermitted(_))));
    assert!(out.is_empty());
}

#[test]
fn garbage_is_not_a_container() {
    let result = Container::open(Cursor::new(b"PK\x03\x04 not a container".to_vec()));
    assert!(matches!(result, Err(Error::UnsupportedFormat(_))));
}
