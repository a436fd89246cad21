mod common;

use std::sync::Arc;

use wallet_sync_adapters::{AnnouncementChannel, Eip1193Adapter};
use wallet_sync_core::domain::AnnouncedWalletInfo;
use wallet_sync_core::{Announcement, ConnectorKind, ConnectorRegistry, ProviderPort};

use common::{harness, second_address};

fn announcement(
    uuid: &str,
    name: &str,
    rdns: Option<&str>,
    provider: Arc<dyn ProviderPort>,
) -> Announcement {
    Announcement {
        info: AnnouncedWalletInfo {
            uuid: uuid.to_owned(),
            name: name.to_owned(),
            icon: None,
            rdns: rdns.map(str::to_owned),
        },
        provider,
    }
}

#[test]
fn hosted_sdk_wallet_announcing_itself_is_not_listed_twice() {
    let h = harness();
    let before = h.registry.len();

    h.discovery
        .announce(announcement(
            "uuid-cb",
            "Coinbase Wallet Extension",
            Some("com.coinbase.wallet"),
            Arc::new(Eip1193Adapter::deterministic()),
        ))
        .expect("announce");

    assert_eq!(h.registry.len(), before);
    assert!(h.registry.announced_provider("com.coinbase.wallet").is_none());
}

#[test]
fn registry_listens_once_and_hears_wallets_already_present() {
    let channel = AnnouncementChannel::new();
    channel
        .announce(announcement(
            "uuid-rabby",
            "Rabby",
            Some("io.rabby"),
            Arc::new(Eip1193Adapter::deterministic()),
        ))
        .expect("announce before listening");

    let registry = ConnectorRegistry::new();
    assert!(registry.listen(&channel));
    assert!(!registry.listen(&channel));
    assert_eq!(channel.listener_count().expect("listeners"), 1);
    assert_eq!(channel.request_count().expect("requests"), 1);

    let rabby = registry.find("io.rabby").expect("rabby registered");
    assert_eq!(rabby.kind, ConnectorKind::Announced);
    assert_eq!(rabby.display_name, "Rabby");
}

#[test]
fn repeated_announcements_keep_a_single_entry() {
    let h = harness();
    let wallet: Arc<dyn ProviderPort> = Arc::new(Eip1193Adapter::deterministic());
    for _ in 0..3 {
        h.discovery
            .announce(announcement(
                "uuid-zerion",
                "Zerion",
                Some("io.zerion.wallet"),
                Arc::clone(&wallet),
            ))
            .expect("announce");
    }
    let listed = h
        .registry
        .list()
        .into_iter()
        .filter(|c| c.id == "io.zerion.wallet")
        .count();
    assert_eq!(listed, 1);
}

#[test]
fn reset_forgets_announced_wallets() {
    let h = harness();
    h.discovery
        .announce(announcement(
            "uuid-rabby",
            "Rabby",
            Some("io.rabby"),
            Arc::new(Eip1193Adapter::deterministic()),
        ))
        .expect("announce");
    assert!(h.registry.announced_provider("io.rabby").is_some());

    h.registry.reset();
    assert!(h.registry.is_empty());
    assert!(h.registry.announced_provider("io.rabby").is_none());
}

#[tokio::test]
async fn connecting_an_announced_wallet_uses_its_own_provider() {
    let h = harness();
    let rabby = Eip1193Adapter::deterministic().with_accounts(vec![second_address()]);
    h.discovery
        .announce(announcement(
            "uuid-rabby",
            "Rabby",
            Some("io.rabby"),
            Arc::new(rabby.clone()),
        ))
        .expect("announce");

    let record = h.engine.connect("io.rabby").await.expect("connect");
    assert_eq!(record.address, Some(second_address()));
    assert_eq!(record.active_connector_id.as_deref(), Some("io.rabby"));
    assert_eq!(rabby.listener_count().expect("listeners"), 3);
    assert!(h.wallet.request_log().expect("injected log").is_empty());

    let session = h.engine.session().load().expect("load").expect("session");
    assert_eq!(session.connector_id, "io.rabby");
    assert_eq!(session.connector_display_name.as_deref(), Some("Rabby"));
}

#[tokio::test]
async fn announcement_without_rdns_gets_a_name_based_id() {
    let h = harness();
    h.discovery
        .announce(announcement(
            "uuid-frame",
            "Frame",
            None,
            Arc::new(Eip1193Adapter::deterministic()),
        ))
        .expect("announce");

    let connector = h.registry.find_by_name("Frame").expect("frame registered");
    assert_eq!(connector.id, "announced:Frame");
    h.engine.connect(&connector.id).await.expect("connect");
}
