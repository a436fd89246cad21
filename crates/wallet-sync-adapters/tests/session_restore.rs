mod common;

use std::sync::Arc;

use wallet_sync_adapters::{Eip1193Adapter, FileStorage, MemoryStorage};
use wallet_sync_core::domain::AnnouncedWalletInfo;
use wallet_sync_core::{
    Announcement, ConnectionStatus, EngineConfig, EngineError, KeyValuePort, Namespace,
    ProviderRpcError,
};

use common::{engine_config, harness, owner_address, persisted_id, record_log, HarnessBuilder};

fn announcement(name: &str, rdns: &str, wallet: &Eip1193Adapter) -> Announcement {
    Announcement {
        info: AnnouncedWalletInfo {
            uuid: format!("uuid-{rdns}"),
            name: name.to_owned(),
            icon: Some("data:image/svg+xml;base64,AAAA".to_owned()),
            rdns: Some(rdns.to_owned()),
        },
        provider: Arc::new(wallet.clone()),
    }
}

#[tokio::test]
async fn reload_restores_the_same_record_without_prompting() {
    let storage = MemoryStorage::new();
    let first = HarnessBuilder::new().storage(storage.clone()).build();
    let connected = first.engine.connect("injected").await.expect("connect");

    // Next page load: a fresh engine over the same storage, wallet still authorized.
    let wallet = Eip1193Adapter::deterministic().pre_authorized();
    let second = HarnessBuilder::new()
        .storage(storage.clone())
        .wallet(wallet.clone())
        .build();
    let restored = second
        .engine
        .reconnect()
        .await
        .expect("reconnect")
        .expect("persisted session");

    assert_eq!(restored, connected);
    assert_eq!(wallet.request_log().expect("log"), vec!["eth_accounts", "eth_chainId"]);
    assert_eq!(persisted_id(&storage), Some("injected".to_owned()));
}

#[tokio::test]
async fn nothing_persisted_means_nothing_to_restore() {
    let h = harness();
    assert_eq!(h.engine.reconnect().await.expect("reconnect"), None);
    assert!(h.engine.connection_record().is_cleared());
    assert!(h.wallet.request_log().expect("log").is_empty());
}

#[tokio::test]
async fn revoked_wallet_clears_the_stale_session() {
    let storage = MemoryStorage::new();
    storage.set_item("WALLET_ID", "injected").expect("seed id");
    storage.set_item("WALLET_NAME", "Browser Wallet").expect("seed name");
    let h = HarnessBuilder::new().storage(storage).build();
    let log = record_log(&h.engine);

    let err = h.engine.reconnect().await.expect_err("revoked");
    assert!(matches!(err, EngineError::Unauthenticated));
    assert_eq!(persisted_id(&h.storage), None);
    assert_eq!(h.engine.connection_record().status, ConnectionStatus::Disconnected);

    let statuses: Vec<_> = log
        .lock()
        .expect("log lock")
        .iter()
        .map(|r| r.status)
        .collect();
    assert_eq!(
        statuses,
        vec![ConnectionStatus::Connecting, ConnectionStatus::Disconnected]
    );
}

#[tokio::test]
async fn missing_connector_keeps_the_session_until_it_announces() {
    let storage = MemoryStorage::new();
    storage.set_item("WALLET_ID", "io.rabby").expect("seed id");
    storage.set_item("WALLET_NAME", "Rabby").expect("seed name");
    let h = HarnessBuilder::new().storage(storage).build();

    let err = h.engine.reconnect().await.expect_err("not announced yet");
    assert!(matches!(err, EngineError::ProviderUnavailable(id) if id == "io.rabby"));
    assert_eq!(persisted_id(&h.storage), Some("io.rabby".to_owned()));
    assert!(h.engine.connection_record().is_cleared());

    let rabby = Eip1193Adapter::deterministic().pre_authorized();
    h.discovery
        .announce(announcement("Rabby", "io.rabby", &rabby))
        .expect("announce");

    let record = h
        .engine
        .reconnect()
        .await
        .expect("reconnect")
        .expect("session");
    assert_eq!(record.active_connector_id.as_deref(), Some("io.rabby"));
    assert_eq!(record.address, Some(owner_address()));
    assert_eq!(rabby.listener_count().expect("listeners"), 3);
}

#[tokio::test]
async fn persisted_display_name_finds_a_renamed_connector() {
    let storage = MemoryStorage::new();
    storage.set_item("WALLET_ID", "trust-legacy").expect("seed id");
    storage.set_item("WALLET_NAME", "Trust Wallet").expect("seed name");
    let h = HarnessBuilder::new().storage(storage).build();

    let trust = Eip1193Adapter::deterministic().pre_authorized();
    h.discovery
        .announce(announcement("Trust", "com.trustwallet.app", &trust))
        .expect("announce");

    let record = h
        .engine
        .reconnect()
        .await
        .expect("reconnect")
        .expect("session");
    assert_eq!(record.active_connector_id.as_deref(), Some("com.trustwallet.app"));
    assert_eq!(persisted_id(&h.storage), Some("com.trustwallet.app".to_owned()));
}

#[tokio::test]
async fn disconnect_is_idempotent() {
    let h = harness();
    h.engine.disconnect().await;
    h.engine.connect("injected").await.expect("connect");
    let log = record_log(&h.engine);

    h.engine.disconnect().await;
    h.engine.disconnect().await;

    assert_eq!(log.lock().expect("log lock").len(), 1);
    assert!(h.engine.connection_record().is_cleared());
    assert_eq!(persisted_id(&h.storage), None);
    assert_eq!(h.engine.reconnect().await.expect("reconnect"), None);
}

#[tokio::test]
async fn injected_disconnect_revokes_account_permissions() {
    let h = harness();
    h.engine.connect("injected").await.expect("connect");
    h.engine.disconnect().await;

    let log = h.wallet.request_log().expect("log");
    assert!(log.ends_with(&[
        "wallet_getPermissions".to_owned(),
        "wallet_revokePermissions".to_owned()
    ]));
    assert!(!h.wallet.is_authorized().expect("authorized"));
}

#[tokio::test]
async fn revocation_can_be_turned_off() {
    let h = HarnessBuilder::new()
        .config(EngineConfig {
            revoke_permissions_on_disconnect: false,
            ..engine_config()
        })
        .build();
    h.engine.connect("injected").await.expect("connect");
    h.engine.disconnect().await;

    assert!(h
        .wallet
        .requests_for("wallet_getPermissions")
        .expect("log")
        .is_empty());
    assert!(h.wallet.is_authorized().expect("authorized"));
}

#[tokio::test]
async fn permission_read_failure_does_not_fail_disconnect() {
    let h = harness();
    h.engine.connect("injected").await.expect("connect");
    h.wallet
        .debug_fail_next(
            "wallet_getPermissions",
            ProviderRpcError::new(ProviderRpcError::UNSUPPORTED_METHOD, "not supported"),
        )
        .expect("inject failure");

    h.engine.disconnect().await;
    assert!(h.engine.connection_record().is_cleared());
    assert!(h
        .wallet
        .requests_for("wallet_revokePermissions")
        .expect("log")
        .is_empty());
}

#[tokio::test]
async fn relay_disconnect_ends_the_remote_session() {
    let h = harness();
    h.engine.connect("walletConnect").await.expect("connect");
    assert!(h.relay.is_active().expect("active"));

    h.engine.disconnect().await;
    assert!(!h.relay.is_active().expect("active"));
    assert!(h
        .relay
        .wallet()
        .requests_for("wallet_revokePermissions")
        .expect("log")
        .is_empty());
}

#[tokio::test]
async fn embedded_disconnect_signs_out() {
    let h = harness();
    h.engine.connect("auth").await.expect("connect");
    h.engine.disconnect().await;
    assert!(!h.embedded.is_signed_in().expect("signed in"));

    let err = h.engine.connect("auth").await.expect_err("signed out");
    assert!(matches!(err, EngineError::Provider(e) if e.code == ProviderRpcError::UNAUTHORIZED));
}

#[tokio::test]
async fn file_storage_survives_a_new_handle() {
    let path = std::env::temp_dir().join(format!(
        "wallet-sync-session-{}-{}.json",
        std::process::id(),
        line!()
    ));
    let _ = std::fs::remove_file(&path);

    let first = FileStorage::new(&path);
    let h = HarnessBuilder::new().build();
    let engine = wallet_sync_core::ConnectionEngine::new(
        engine_config(),
        h.registry.clone(),
        Arc::new(wallet_sync_adapters::ProviderDirectory::new(h.registry.clone())
            .with_injected(Arc::new(h.wallet.clone()))),
        Arc::new(first),
        wallet_sync_core::AccountProfileSynchronizer::new(),
    );
    engine.connect("injected").await.expect("connect");

    let reopened = FileStorage::new(&path);
    assert_eq!(
        reopened.get_item("WALLET_ID").expect("read"),
        Some("injected".to_owned())
    );
    assert_eq!(
        reopened.get_item("WALLET_NAME").expect("read"),
        Some("Browser Wallet".to_owned())
    );

    engine.disconnect().await;
    assert_eq!(reopened.get_item("WALLET_ID").expect("read"), None);
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn namespaces_keep_separate_sessions() {
    let storage = MemoryStorage::new();
    let evm = HarnessBuilder::new().storage(storage.clone()).build();
    evm.engine.connect("injected").await.expect("connect");

    let solana = HarnessBuilder::new()
        .storage(storage.clone())
        .config(EngineConfig {
            namespace: Namespace::Solana,
            ..engine_config()
        })
        .build();
    assert_eq!(solana.engine.reconnect().await.expect("reconnect"), None);

    let mut keys = storage.keys().expect("keys");
    keys.sort();
    assert_eq!(keys, vec!["WALLET_ID", "WALLET_NAME"]);
}
