//! End-to-end tests for the vault service: startup, owner lifecycle, admin
//! operations, autosave and shutdown.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use vaultkeep::access::{Identity, VAULT_WILDCARD};
use vaultkeep::config::Config;
use vaultkeep::model::Item;
use vaultkeep::service::{VaultService, VaultStats};
use vaultkeep::session::{OpenOutcome, SessionHandle};

use common::{CountingBackend, stored_record};

// ============================================================================
// Helpers
// ============================================================================

fn config(yaml: &str) -> Config {
    Config::parse(yaml).unwrap()
}

async fn start(temp_dir: &TempDir, yaml: &str) -> (VaultService, Arc<CountingBackend>) {
    let backend = Arc::new(CountingBackend::new(temp_dir.path()));
    let service = VaultService::start(backend.clone(), &config(yaml)).await;
    (service, backend)
}

async fn open(service: &VaultService, identity: &Identity, vault: u32) -> SessionHandle {
    service
        .open_vault(identity, vault)
        .await
        .unwrap()
        .handle()
        .unwrap()
}

const NO_AUTOSAVE: &str = "
storage:
  save_interval_seconds: 0
";

// ============================================================================
// Owner lifecycle
// ============================================================================

#[tokio::test]
async fn disconnect_persists_and_evicts() {
    let temp_dir = TempDir::new().unwrap();
    let (service, _backend) = start(&temp_dir, NO_AUTOSAVE).await;

    service.owner_connected("alice");
    service.background().drain().await;
    assert!(service.cache().is_cached("alice"));

    let handle = open(&service, &Identity::new("alice"), 1).await;
    handle.set_slot(3, Some(Item::new("lantern", 1))).await.unwrap();

    service.owner_disconnected("alice");
    service.background().drain().await;

    assert!(!service.cache().is_cached("alice"));
    assert!(service.active_session("alice").is_none());
    assert!(handle.is_closed());

    let stored = stored_record(temp_dir.path(), "alice").await.unwrap();
    assert_eq!(stored.get_item(1, 3).map(Item::id), Some("lantern"));
}

#[tokio::test]
async fn direct_edit_on_open_vault_reaches_the_session() {
    let temp_dir = TempDir::new().unwrap();
    let (service, _backend) = start(&temp_dir, NO_AUTOSAVE).await;

    let handle = open(&service, &Identity::new("alice"), 1).await;
    assert!(service.set_item("alice", 1, 0, Some(Item::new("map", 1))).await.unwrap());

    assert_eq!(handle.get_slot(0).await.unwrap().map(|i| i.id().to_string()), Some("map".to_string()));
    assert_eq!(service.get_item("alice", 1, 0).await.map(|i| i.quantity()), Some(1));

    service.close_vault("alice").await.unwrap();
    let stored = stored_record(temp_dir.path(), "alice").await.unwrap();
    assert_eq!(stored.get_item(1, 0).map(Item::id), Some("map"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn quick_reconnect_keeps_one_record() {
    let temp_dir = TempDir::new().unwrap();
    let (service, _backend) = start(&temp_dir, NO_AUTOSAVE).await;

    for round in 0..50 {
        let owner = format!("owner_{round}");
        let identity = Identity::new(owner.as_str());

        let handle = open(&service, &identity, 1).await;
        handle.set_slot(0, Some(Item::new("sword", 1))).await.unwrap();

        service.owner_disconnected(&owner);
        tokio::task::yield_now().await;
        let _reopened = open(&service, &identity, 1).await;
        service.set_item(&owner, 2, 0, Some(Item::new("gem", 1))).await.unwrap();
        service.background().drain().await;

        // A live session always mirrors into the resident record.
        if service.active_session(&owner).is_some() {
            assert!(service.cache().is_attached(&owner), "{owner}: session on an evicted record");
        }

        service.close_vault(&owner).await.unwrap();
        service.background().drain().await;

        let stored = stored_record(temp_dir.path(), &owner).await.unwrap();
        assert_eq!(stored.get_item(1, 0).map(Item::id), Some("sword"), "{owner}");
        assert_eq!(stored.get_item(2, 0).map(Item::id), Some("gem"), "{owner}");
    }
}

#[tokio::test]
async fn unload_leaves_open_session_record_resident() {
    let temp_dir = TempDir::new().unwrap();
    let (service, _backend) = start(&temp_dir, NO_AUTOSAVE).await;

    let handle = open(&service, &Identity::new("alice"), 1).await;
    handle.set_slot(0, Some(Item::new("sword", 1))).await.unwrap();

    assert!(!service.cache().unload("alice").await.unwrap());
    assert!(service.cache().is_cached("alice"));

    service.set_item("alice", 2, 0, Some(Item::new("gem", 1))).await.unwrap();
    service.close_vault("alice").await.unwrap();
    service.background().drain().await;

    let stored = stored_record(temp_dir.path(), "alice").await.unwrap();
    assert_eq!(stored.get_item(1, 0).map(Item::id), Some("sword"));
    assert_eq!(stored.get_item(2, 0).map(Item::id), Some("gem"));

    // Nothing attached any more.
    assert!(service.cache().unload("alice").await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn direct_edit_racing_an_open_is_kept() {
    let temp_dir = TempDir::new().unwrap();
    let (service, _backend) = start(&temp_dir, NO_AUTOSAVE).await;

    for round in 0..50 {
        let owner = format!("owner_{round}");
        let identity = Identity::new(owner.as_str());

        let (edited, opened) = tokio::join!(
            service.set_item(&owner, 1, 5, Some(Item::new("map", 1))),
            service.open_vault(&identity, 1),
        );
        assert!(edited.unwrap());
        assert!(opened.unwrap().handle().is_some());

        service.close_vault(&owner).await.unwrap();
        service.background().drain().await;

        let stored = stored_record(temp_dir.path(), &owner).await.unwrap();
        assert_eq!(stored.get_item(1, 5).map(Item::id), Some("map"), "{owner}");
    }
}

#[tokio::test]
async fn direct_edit_rejects_unusable_vault_numbers() {
    let temp_dir = TempDir::new().unwrap();
    let (service, backend) = start(
        &temp_dir,
        "
vault:
  max_vaults: 4
storage:
  save_interval_seconds: 0
",
    )
    .await;

    for vault in [0, 5, u32::MAX] {
        assert!(!service.set_item("alice", vault, 0, Some(Item::new("gem", 1))).await.unwrap());
    }
    service.background().drain().await;
    assert_eq!(backend.saves(), 0);
    assert_eq!(service.total_items("alice").await, 0);

    assert!(service.set_item("alice", 4, 0, Some(Item::new("gem", 1))).await.unwrap());
    service.background().drain().await;
    let stored = stored_record(temp_dir.path(), "alice").await.unwrap();
    assert_eq!(stored.get_item(4, 0).map(Item::id), Some("gem"));
}

// ============================================================================
// Admin
// ============================================================================

#[tokio::test]
async fn clear_all_empties_every_vault() {
    let temp_dir = TempDir::new().unwrap();
    let (service, _backend) = start(&temp_dir, NO_AUTOSAVE).await;

    service.set_item("alice", 1, 0, Some(Item::new("coal", 64))).await.unwrap();
    service.set_item("alice", 4, 10, Some(Item::new("iron", 8))).await.unwrap();
    let handle = open(&service, &Identity::new("alice").with_capability(VAULT_WILDCARD), 4).await;
    assert_eq!(service.total_items("alice").await, 2);

    service.clear_all("alice").await.unwrap();

    assert!(handle.is_closed());
    assert_eq!(service.total_items("alice").await, 0);
    let stored = stored_record(temp_dir.path(), "alice").await.unwrap();
    assert_eq!(stored.total_items(), 0);
}

#[tokio::test]
async fn blacklist_applies_to_direct_edits() {
    let temp_dir = TempDir::new().unwrap();
    let (service, _backend) = start(
        &temp_dir,
        "
vault:
  blacklist: [Bedrock]
storage:
  save_interval_seconds: 0
",
    )
    .await;

    assert!(service.set_item("alice", 1, 0, Some(Item::new("bedrock", 1))).await.is_err());
    assert!(service.get_item("alice", 1, 0).await.is_none());
}

#[tokio::test]
async fn reload_changes_capacity_and_access() {
    let temp_dir = TempDir::new().unwrap();
    let (service, _backend) = start(
        &temp_dir,
        "
vault:
  max_vaults: 3
  slots_per_vault: 9
storage:
  save_interval_seconds: 0
",
    )
    .await;
    let admin = Identity::new("alice").with_capability(VAULT_WILDCARD);

    assert_eq!(open(&service, &admin, 1).await.capacity(), 9);
    assert!(matches!(
        service.open_vault(&admin, 5).await.unwrap(),
        OpenOutcome::Denied { max_accessible: 3, .. }
    ));

    service.reload(&config(
        "
vault:
  max_pages: 6
  slots_per_page: 27
storage:
  save_interval_seconds: 0
",
    ));

    assert_eq!(service.cache().default_capacity(), 27);
    // Existing pages keep the capacity they were created with.
    assert_eq!(open(&service, &admin, 1).await.capacity(), 9);
    assert_eq!(open(&service, &admin, 5).await.capacity(), 27);
}

#[tokio::test]
async fn stats_summarize_usage() {
    let temp_dir = TempDir::new().unwrap();
    let (service, _backend) = start(
        &temp_dir,
        "
vault:
  max_vaults: 5
  slots_per_vault: 54
  slot_tiers: [9, 27, 54]
storage:
  save_interval_seconds: 0
",
    )
    .await;
    let member = Identity::new("alice")
        .with_capability("vaultkeep.vault.2")
        .with_capability("vaultkeep.slots.27");

    service.set_item("alice", 1, 0, Some(Item::new("apple", 5))).await.unwrap();
    service.set_item("alice", 1, 1, Some(Item::new("pear", 2))).await.unwrap();
    open(&service, &member, 2).await;

    let stats = service.stats(&member).await;
    assert_eq!(
        stats,
        VaultStats {
            pages_used: 1,
            items_stored: 2,
            accessible_vaults: 2,
            total_slots: 54,
        }
    );
}

// ============================================================================
// Autosave
// ============================================================================

#[tokio::test]
async fn non_positive_interval_disables_autosave() {
    let temp_dir = TempDir::new().unwrap();
    let (service, _backend) = start(
        &temp_dir,
        "
storage:
  save_interval_seconds: -5
",
    )
    .await;
    assert!(!service.autosave_running());

    service.reload(&config(
        "
storage:
  save_interval_seconds: 60
",
    ));
    assert!(service.autosave_running());
}

#[tokio::test]
async fn autosave_persists_untracked_edits() {
    let temp_dir = TempDir::new().unwrap();
    let (service, backend) = start(
        &temp_dir,
        "
storage:
  save_interval_seconds: 1
",
    )
    .await;
    assert!(service.autosave_running());

    // Edit the record directly so only the autosave sweep can write it.
    let vault = service.cache().get("alice").await;
    vault
        .lock()
        .await
        .set_item(2, 0, Some(Item::new("diamond", 3)), 54);
    assert_eq!(backend.saves(), 0);

    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert!(backend.saves() >= 1);
    assert!(!vault.lock().await.is_dirty());
    let stored = stored_record(temp_dir.path(), "alice").await.unwrap();
    assert_eq!(stored.get_item(2, 0).map(Item::quantity), Some(3));
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn shutdown_flushes_open_sessions() {
    let temp_dir = TempDir::new().unwrap();
    let (service, _backend) = start(&temp_dir, NO_AUTOSAVE).await;

    let alice = open(&service, &Identity::new("alice"), 1).await;
    alice.set_slot(0, Some(Item::new("sword", 1))).await.unwrap();
    let bob = open(&service, &Identity::new("bob"), 1).await;
    bob.set_slot(1, Some(Item::new("shield", 1))).await.unwrap();

    let report = service.shutdown().await;
    assert!(report.is_ok());
    assert!(service.sessions().is_empty());
    assert_eq!(service.background().pending_count(), 0);

    let stored = stored_record(temp_dir.path(), "alice").await.unwrap();
    assert_eq!(stored.get_item(1, 0).map(Item::id), Some("sword"));
    let stored = stored_record(temp_dir.path(), "bob").await.unwrap();
    assert_eq!(stored.get_item(1, 1).map(Item::id), Some("shield"));
}

#[tokio::test]
async fn shutdown_reports_failed_saves() {
    let temp_dir = TempDir::new().unwrap();
    let (service, backend) = start(&temp_dir, NO_AUTOSAVE).await;

    let vault = service.cache().get("alice").await;
    vault
        .lock()
        .await
        .set_item(1, 0, Some(Item::new("sword", 1)), 54);
    backend.fail_saves(true);

    let report = service.shutdown().await;
    assert!(!report.is_ok());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "alice");
}
