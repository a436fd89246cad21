//! wallet-sync: headless driver for the wallet connection engine.
//!
//! Registers the built-in connectors, lets a wallet announce itself, connects,
//! switches network and restores the session the way a page reload would.
//!
//! Usage: `wallet-sync [connector-id] [--keep]`

#[cfg(not(target_arch = "wasm32"))]
use std::sync::Arc;

#[cfg(not(target_arch = "wasm32"))]
use eyre::WrapErr;

#[cfg(not(target_arch = "wasm32"))]
use wallet_sync_adapters::{
    AdapterConfig, AnnouncementChannel, Eip1193Adapter, EmbeddedAuthAdapter, FileStorage,
    IdentityApiAdapter, JsonRpcClient, MemoryStorage, ProviderDirectory, RelaySessionAdapter,
    RpcBalanceReader, RpcNameService,
};
#[cfg(not(target_arch = "wasm32"))]
use wallet_sync_core::domain::AnnouncedWalletInfo;
#[cfg(not(target_arch = "wasm32"))]
use wallet_sync_core::{
    AccountProfileSynchronizer, Announcement, ConnectionEngine, ConnectionRecord, Connector,
    ConnectorRegistry, EngineConfig, KeyValuePort, Namespace, NetworkDescriptor,
};

#[cfg(not(target_arch = "wasm32"))]
#[tokio::main(flavor = "current_thread")]
async fn main() -> eyre::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting wallet-sync");

    let mut connector_id = "injected".to_owned();
    let mut keep_session = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--keep" => keep_session = true,
            other => connector_id = other.to_owned(),
        }
    }

    let cfg = AdapterConfig::from_env();
    let storage: Arc<dyn KeyValuePort> = match &cfg.session_file {
        Some(path) => {
            tracing::info!(path = %path.display(), "persisting session to file");
            Arc::new(FileStorage::new(path))
        }
        None => Arc::new(MemoryStorage::new()),
    };

    let registry = ConnectorRegistry::new();
    registry.register(Connector::injected());
    registry.register(Connector::relay());
    registry.register(Connector::hosted_sdk("com.coinbase.wallet"));
    registry.register(Connector::embedded_auth());

    let injected = Eip1193Adapter::with_config(&cfg);
    let relay = RelaySessionAdapter::from_session(
        Eip1193Adapter::deterministic().with_known_chains([137]),
        &serde_json::json!({
            "namespaces": {
                "eip155": {
                    "chains": ["eip155:1", "eip155:137"],
                    "methods": ["eth_sendTransaction", "personal_sign", "wallet_switchEthereumChain"]
                }
            },
            "peer": {
                "metadata": { "name": "Rainbow", "icons": ["https://rainbow.me/icon.png"] }
            }
        }),
    )
    .wrap_err("invalid relay session")?;
    let embedded = EmbeddedAuthAdapter::new(Eip1193Adapter::deterministic()).with_smart_account(
        137,
        alloy::primitives::address!("0x5a00000000000000000000000000000000000005"),
    );
    let directory = ProviderDirectory::new(registry.clone())
        .with_injected(Arc::new(injected.clone()))
        .with_hosted_sdk(Arc::new(Eip1193Adapter::deterministic()))
        .with_relay(relay)
        .with_embedded(embedded);
    let directory = Arc::new(directory);

    let discovery = AnnouncementChannel::new();
    registry.listen(&discovery);
    discovery
        .announce(Announcement {
            info: AnnouncedWalletInfo {
                uuid: "4b6c1d38-0d5e-4c53-9d0d-6f0f4f0f2d11".to_owned(),
                name: "Rabby".to_owned(),
                icon: None,
                rdns: Some("io.rabby".to_owned()),
            },
            provider: Arc::new(Eip1193Adapter::deterministic()),
        })
        .wrap_err("wallet announcement failed")?;
    tracing::info!(connectors = registry.len(), "connectors registered");

    let rpc = JsonRpcClient::new(&cfg).wrap_err("rpc client")?;
    let engine_config = EngineConfig {
        namespace: Namespace::Eip155,
        networks: networks(&cfg),
        revoke_permissions_on_disconnect: true,
    };
    let build_engine = || {
        let mut profile_sync = AccountProfileSynchronizer::new()
            .with_name_service(Arc::new(RpcNameService::new(
                rpc.clone(),
                cfg.mainnet_rpc_url.clone(),
            )))
            .with_balance(Arc::new(RpcBalanceReader::new(rpc.clone())));
        if let Some(url) = &cfg.identity_api_url {
            profile_sync =
                profile_sync.with_identity(Arc::new(IdentityApiAdapter::new(url, rpc.clone())));
        }
        let engine = ConnectionEngine::new(
            engine_config.clone(),
            registry.clone(),
            directory.clone(),
            Arc::clone(&storage),
            profile_sync,
        );
        engine.subscribe(Arc::new(log_record));
        engine
    };

    let engine = build_engine();
    let record = match engine.reconnect().await {
        Ok(Some(record)) => {
            tracing::info!("restored persisted session");
            record
        }
        Ok(None) => engine
            .connect(&connector_id)
            .await
            .wrap_err_with(|| format!("connect via {connector_id}"))?,
        Err(e) => {
            tracing::warn!(error = %e, "silent reconnect failed, prompting");
            engine
                .connect(&connector_id)
                .await
                .wrap_err_with(|| format!("connect via {connector_id}"))?
        }
    };
    println!("{}", serde_json::to_string_pretty(&record)?);
    if let Some(caip) = engine.caip_address() {
        tracing::info!(%caip, "account");
    }
    if let Some(wallet) = engine.connected_wallet_info() {
        tracing::info!(name = %wallet.name, icon = ?wallet.icon, "connected wallet");
    }
    engine.refresh_profile().await;

    match engine.switch_network_by_id(137).await {
        Ok(()) => engine.refresh_balance().await,
        Err(e) => tracing::warn!(error = %e, "network switch failed"),
    }
    println!("{}", serde_json::to_string_pretty(&engine.profile())?);

    // Second engine over the same storage stands in for a page reload.
    drop(engine);
    let reloaded = build_engine();
    match reloaded.reconnect().await {
        Ok(Some(record)) => println!("{}", serde_json::to_string_pretty(&record)?),
        Ok(None) => tracing::info!("nothing to restore"),
        Err(e) => tracing::warn!(error = %e, "reload could not restore the session"),
    }

    if !keep_session {
        reloaded.disconnect().await;
    }
    Ok(())
}

#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
fn networks(cfg: &AdapterConfig) -> Vec<NetworkDescriptor> {
    vec![
        NetworkDescriptor::new(1, "Ethereum", cfg.mainnet_rpc_url.clone(), "ETH")
            .with_explorer_url("https://etherscan.io"),
        NetworkDescriptor::new(137, "Polygon", "https://polygon-rpc.com", "POL")
            .with_explorer_url("https://polygonscan.com"),
        NetworkDescriptor::new(8453, "Base", "https://mainnet.base.org", "ETH")
            .with_explorer_url("https://basescan.org"),
    ]
}

#[cfg(not(target_arch = "wasm32"))]
fn log_record(record: &ConnectionRecord) {
    tracing::info!(
        status = ?record.status,
        address = ?record.address,
        chain_id = ?record.chain_id,
        connector = ?record.active_connector_id,
        "connection record"
    );
}
