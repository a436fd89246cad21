#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use alloy::primitives::Address;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;

use wallet_sync_adapters::{
    AnnouncementChannel, Eip1193Adapter, EmbeddedAuthAdapter, MemoryStorage, ProviderDirectory,
    RelaySessionAdapter,
};
use wallet_sync_core::ports::EventListener;
use wallet_sync_core::{
    AccountProfileSynchronizer, ConnectionEngine, ConnectionRecord, Connector, ConnectorRegistry,
    EngineConfig, KeyValuePort, ListenerId, Namespace, NetworkDescriptor, ProviderEventKind,
    ProviderPort, ProviderRpcError,
};

pub fn owner_address() -> Address {
    "0x1000000000000000000000000000000000000001"
        .parse()
        .expect("valid owner address")
}

pub fn second_address() -> Address {
    "0x2000000000000000000000000000000000000002"
        .parse()
        .expect("valid second address")
}

pub fn smart_account_address() -> Address {
    "0x5a00000000000000000000000000000000000005"
        .parse()
        .expect("valid smart account address")
}

pub fn mainnet() -> NetworkDescriptor {
    NetworkDescriptor::new(1, "Ethereum", "https://eth.example", "ETH")
        .with_explorer_url("https://etherscan.io")
}

pub fn polygon() -> NetworkDescriptor {
    NetworkDescriptor::new(137, "Polygon", "https://polygon.example", "POL")
        .with_explorer_url("https://polygonscan.com")
}

pub fn base() -> NetworkDescriptor {
    NetworkDescriptor::new(8453, "Base", "https://base.example", "ETH")
}

pub fn networks() -> Vec<NetworkDescriptor> {
    vec![mainnet(), polygon(), base()]
}

pub fn engine_config() -> EngineConfig {
    EngineConfig {
        namespace: Namespace::Eip155,
        networks: networks(),
        revoke_permissions_on_disconnect: true,
    }
}

/// Everything one page load needs: registry, wallets, storage and engine.
pub struct Harness {
    pub engine: ConnectionEngine,
    pub registry: ConnectorRegistry,
    pub wallet: Eip1193Adapter,
    pub relay: RelaySessionAdapter,
    pub embedded: EmbeddedAuthAdapter,
    pub storage: MemoryStorage,
    pub discovery: AnnouncementChannel,
}

pub struct HarnessBuilder {
    wallet: Eip1193Adapter,
    relay: Option<RelaySessionAdapter>,
    embedded: Option<EmbeddedAuthAdapter>,
    storage: MemoryStorage,
    injected: Option<Arc<dyn ProviderPort>>,
    profile_sync: Option<AccountProfileSynchronizer>,
    config: EngineConfig,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            wallet: Eip1193Adapter::deterministic(),
            relay: None,
            embedded: None,
            storage: MemoryStorage::new(),
            injected: None,
            profile_sync: None,
            config: engine_config(),
        }
    }

    pub fn wallet(mut self, wallet: Eip1193Adapter) -> Self {
        self.wallet = wallet;
        self
    }

    /// Injected connector served by `provider` instead of the wallet.
    pub fn injected_provider(mut self, provider: Arc<dyn ProviderPort>) -> Self {
        self.injected = Some(provider);
        self
    }

    pub fn relay(mut self, relay: RelaySessionAdapter) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn embedded(mut self, embedded: EmbeddedAuthAdapter) -> Self {
        self.embedded = Some(embedded);
        self
    }

    pub fn storage(mut self, storage: MemoryStorage) -> Self {
        self.storage = storage;
        self
    }

    pub fn profile_sync(mut self, profile_sync: AccountProfileSynchronizer) -> Self {
        self.profile_sync = Some(profile_sync);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Harness {
        let registry = ConnectorRegistry::new();
        registry.register(Connector::injected());
        registry.register(Connector::relay());
        registry.register(Connector::hosted_sdk("com.coinbase.wallet"));
        registry.register(Connector::embedded_auth());

        let relay = self
            .relay
            .unwrap_or_else(|| RelaySessionAdapter::new(Eip1193Adapter::deterministic(), vec![1]));
        let embedded = self
            .embedded
            .unwrap_or_else(|| EmbeddedAuthAdapter::new(Eip1193Adapter::deterministic()));
        let injected = self
            .injected
            .unwrap_or_else(|| Arc::new(self.wallet.clone()) as Arc<dyn ProviderPort>);

        let directory = ProviderDirectory::new(registry.clone())
            .with_injected(injected)
            .with_hosted_sdk(Arc::new(Eip1193Adapter::deterministic()))
            .with_relay(relay.clone())
            .with_embedded(embedded.clone());

        let engine = ConnectionEngine::new(
            self.config,
            registry.clone(),
            Arc::new(directory),
            Arc::new(self.storage.clone()),
            self.profile_sync.unwrap_or_default(),
        );

        let discovery = AnnouncementChannel::new();
        registry.listen(&discovery);

        Harness {
            engine,
            registry,
            wallet: self.wallet,
            relay,
            embedded,
            storage: self.storage,
            discovery,
        }
    }
}

pub fn harness() -> Harness {
    HarnessBuilder::new().build()
}

/// Collects every record the engine publishes.
pub fn record_log(engine: &ConnectionEngine) -> Arc<Mutex<Vec<ConnectionRecord>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    engine.subscribe(Arc::new(move |record: &ConnectionRecord| {
        sink.lock().expect("record log lock").push(record.clone());
    }));
    log
}

pub fn persisted_id(storage: &MemoryStorage) -> Option<String> {
    storage.get_item("WALLET_ID").expect("read WALLET_ID")
}

/// Wraps a provider and parks one method until the test opens the gate.
pub struct GatedProvider {
    inner: Eip1193Adapter,
    method: String,
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl GatedProvider {
    pub fn new(inner: Eip1193Adapter, method: &str) -> Arc<Self> {
        Arc::new(Self {
            inner,
            method: method.to_owned(),
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        })
    }

    /// Resolves once the gated method has been called.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn open(&self) {
        self.release.notify_one();
    }
}

#[async_trait(?Send)]
impl ProviderPort for GatedProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderRpcError> {
        if method == self.method {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.request(method, params).await
    }

    fn on(&self, kind: ProviderEventKind, listener: EventListener) -> ListenerId {
        self.inner.on(kind, listener)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.remove_listener(id)
    }
}
