mod common;

use std::sync::{Arc, Mutex};

use serde_json::json;

use wallet_sync_adapters::{Eip1193Adapter, EmbeddedAuthAdapter};
use wallet_sync_core::{AccountType, ConnectionRecord, ConnectionStatus, ProviderEventKind};

use common::{
    harness, owner_address, persisted_id, record_log, second_address, smart_account_address,
    HarnessBuilder,
};

#[tokio::test]
async fn accounts_changed_moves_the_active_address() {
    let h = harness();
    h.engine.connect("injected").await.expect("connect");

    h.wallet
        .debug_inject_accounts_changed(vec![second_address(), owner_address()])
        .expect("inject accounts");

    let record = h.engine.connection_record();
    assert_eq!(record.status, ConnectionStatus::Connected);
    assert_eq!(record.address, Some(second_address()));
    assert_eq!(record.all_accounts, vec![second_address(), owner_address()]);
    assert_eq!(record.chain_id, Some(1));
}

#[tokio::test]
async fn chain_changed_updates_only_the_chain() {
    let h = harness();
    h.engine.connect("injected").await.expect("connect");
    let log = record_log(&h.engine);

    h.wallet.debug_inject_chain_changed(8453).expect("inject chain");
    let record = h.engine.connection_record();
    assert_eq!(record.chain_id, Some(8453));
    assert_eq!(record.address, Some(owner_address()));

    // Same chain again publishes nothing.
    h.wallet.debug_inject_chain_changed(8453).expect("inject chain");
    assert_eq!(log.lock().expect("log lock").len(), 1);
}

#[tokio::test]
async fn empty_accounts_changed_disconnects_and_forgets_the_session() {
    let h = harness();
    h.engine.connect("injected").await.expect("connect");
    assert!(h.engine.session().load().expect("load").is_some());

    h.wallet
        .debug_inject_accounts_changed(Vec::new())
        .expect("inject lock");

    let record = h.engine.connection_record();
    assert_eq!(record.status, ConnectionStatus::Disconnected);
    assert!(record.is_cleared());
    assert_eq!(h.engine.session().load().expect("load"), None);
    assert_eq!(persisted_id(&h.storage), None);
    assert_eq!(h.wallet.listener_count().expect("listeners"), 0);
}

#[tokio::test]
async fn listeners_are_detached_before_observers_see_disconnected() {
    let h = harness();
    h.engine.connect("injected").await.expect("connect");

    let seen = Arc::new(Mutex::new(Vec::<(ConnectionStatus, usize)>::new()));
    let sink = Arc::clone(&seen);
    let wallet = h.wallet.clone();
    h.engine.subscribe(Arc::new(move |record: &ConnectionRecord| {
        let listeners = wallet.listener_count().expect("listener count");
        sink.lock().expect("seen lock").push((record.status, listeners));
    }));

    h.wallet.debug_inject_disconnect().expect("inject disconnect");

    let seen = seen.lock().expect("seen lock");
    assert_eq!(seen.as_slice(), &[(ConnectionStatus::Disconnected, 0)]);
    assert_eq!(persisted_id(&h.storage), None);
}

#[tokio::test]
async fn explicit_disconnect_detaches_before_notifying() {
    let h = harness();
    h.engine.connect("injected").await.expect("connect");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let wallet = h.wallet.clone();
    h.engine.subscribe(Arc::new(move |record: &ConnectionRecord| {
        let listeners = wallet.listener_count().expect("listener count");
        sink.lock().expect("seen lock").push((record.status, listeners));
    }));

    h.engine.disconnect().await;
    assert_eq!(
        seen.lock().expect("seen lock").as_slice(),
        &[(ConnectionStatus::Disconnected, 0)]
    );
}

#[tokio::test]
async fn events_after_disconnect_do_not_reach_the_record() {
    let h = harness();
    h.engine.connect("injected").await.expect("connect");
    h.engine.disconnect().await;
    let log = record_log(&h.engine);

    h.wallet.debug_inject_chain_changed(137).expect("inject chain");
    h.wallet
        .debug_inject_accounts_changed(vec![second_address()])
        .expect("inject accounts");

    assert!(h.engine.connection_record().is_cleared());
    assert!(log.lock().expect("log lock").is_empty());
}

#[tokio::test]
async fn account_change_clears_the_profile() {
    let h = harness();
    h.engine.connect("injected").await.expect("connect");

    h.wallet
        .debug_inject_accounts_changed(vec![second_address()])
        .expect("inject accounts");
    let profile = h.engine.profile();
    assert_eq!(profile.name, None);
    assert_eq!(profile.balance, None);
}

#[tokio::test]
async fn malformed_accounts_payload_keeps_the_connection() {
    let h = harness();
    h.engine.connect("injected").await.expect("connect");
    let log = record_log(&h.engine);

    h.wallet
        .debug_inject_raw_event(ProviderEventKind::AccountsChanged, json!(["not-an-address"]))
        .expect("inject malformed accounts");

    let record = h.engine.connection_record();
    assert_eq!(record.status, ConnectionStatus::Connected);
    assert_eq!(record.address, Some(owner_address()));
    assert_eq!(persisted_id(&h.storage), Some("injected".to_owned()));
    assert_eq!(h.wallet.listener_count().expect("listeners"), 3);
    assert!(log.lock().expect("log lock").is_empty());
}

#[tokio::test]
async fn embedded_account_change_rederives_the_account_type() {
    let embedded = EmbeddedAuthAdapter::new(Eip1193Adapter::deterministic())
        .with_smart_account(1, smart_account_address());
    let h = HarnessBuilder::new().embedded(embedded).build();

    let record = h.engine.connect("auth").await.expect("connect");
    assert_eq!(record.address, Some(smart_account_address()));
    assert_eq!(record.account_type, Some(AccountType::SmartAccount));

    h.embedded
        .wallet()
        .debug_inject_accounts_changed(vec![owner_address()])
        .expect("inject owner");
    let record = h.engine.connection_record();
    assert_eq!(record.address, Some(owner_address()));
    assert_eq!(record.account_type, Some(AccountType::Eoa));

    h.embedded
        .wallet()
        .debug_inject_accounts_changed(vec![smart_account_address()])
        .expect("inject smart account");
    let record = h.engine.connection_record();
    assert_eq!(record.address, Some(smart_account_address()));
    assert_eq!(record.account_type, Some(AccountType::SmartAccount));
}
