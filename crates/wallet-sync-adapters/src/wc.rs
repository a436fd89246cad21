use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use wallet_sync_core::domain::parse_chain_id_str;
use wallet_sync_core::network::{is_unrecognized_chain, ADD_CHAIN_METHOD, SWITCH_CHAIN_METHOD};
use wallet_sync_core::{
    ApprovedNetworks, ConnectedWalletInfo, NetworkDescriptor, PortError, ProviderPort,
    ProviderRpcError, RemoteAccount, RemoteSessionPort,
};

use crate::Eip1193Adapter;

/// Relay (WalletConnect-style) session on top of a paired wallet.
///
/// The session carries the chains the wallet approved at pairing time and
/// whether the wallet accepts `wallet_addEthereumChain` over the relay.
#[derive(Debug, Clone)]
pub struct RelaySessionAdapter {
    wallet: Eip1193Adapter,
    inner: Arc<Mutex<RelaySessionState>>,
}

#[derive(Debug, Default)]
struct RelaySessionState {
    approved_chain_ids: Vec<u64>,
    supports_add_chain: bool,
    active: bool,
    switch_log: Vec<u64>,
    peer: Option<ConnectedWalletInfo>,
}

impl RelaySessionAdapter {
    pub fn new(wallet: Eip1193Adapter, approved_chain_ids: Vec<u64>) -> Self {
        Self {
            wallet,
            inner: Arc::new(Mutex::new(RelaySessionState {
                approved_chain_ids,
                supports_add_chain: false,
                active: true,
                switch_log: Vec::new(),
                peer: None,
            })),
        }
    }

    /// Builds the session from the wallet's namespace approval, e.g.
    /// `{"eip155": {"chains": ["eip155:1"], "methods": ["wallet_addEthereumChain"]}}`.
    pub fn from_namespaces(wallet: Eip1193Adapter, namespaces: &Value) -> Result<Self, PortError> {
        let eip155 = namespaces
            .get("eip155")
            .ok_or_else(|| PortError::Validation("session has no eip155 namespace".to_owned()))?;
        let chains = eip155
            .get("chains")
            .and_then(Value::as_array)
            .map(|chains| {
                chains
                    .iter()
                    .filter_map(Value::as_str)
                    .filter_map(parse_chain_id_str)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let supports_add_chain = eip155
            .get("methods")
            .and_then(Value::as_array)
            .is_some_and(|methods| {
                methods
                    .iter()
                    .any(|m| m.as_str() == Some(ADD_CHAIN_METHOD))
            });
        Ok(Self::new(wallet, chains).with_add_chain_support(supports_add_chain))
    }

    /// Builds the session from a full session settlement carrying
    /// `namespaces` and the peer's `metadata` (`name`, `icons`).
    pub fn from_session(wallet: Eip1193Adapter, session: &Value) -> Result<Self, PortError> {
        let namespaces = session
            .get("namespaces")
            .ok_or_else(|| PortError::Validation("session has no namespaces".to_owned()))?;
        let relay = Self::from_namespaces(wallet, namespaces)?;
        let metadata = session.pointer("/peer/metadata");
        let name = metadata
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .filter(|name| !name.trim().is_empty());
        Ok(match name {
            Some(name) => {
                let icon = metadata
                    .and_then(|m| m.pointer("/icons/0"))
                    .and_then(Value::as_str)
                    .map(str::to_owned);
                relay.with_peer_metadata(name, icon)
            }
            None => relay,
        })
    }

    pub fn with_peer_metadata(self, name: impl Into<String>, icon: Option<String>) -> Self {
        if let Ok(mut g) = self.state() {
            g.peer = Some(ConnectedWalletInfo {
                name: name.into(),
                icon,
            });
        }
        self
    }

    pub fn with_add_chain_support(self, supported: bool) -> Self {
        if let Ok(mut g) = self.state() {
            g.supports_add_chain = supported;
        }
        self
    }

    pub fn wallet(&self) -> &Eip1193Adapter {
        &self.wallet
    }

    fn state(&self) -> Result<MutexGuard<'_, RelaySessionState>, PortError> {
        self.inner
            .lock()
            .map_err(|e| PortError::Transport(format!("relay session lock poisoned: {e}")))
    }

    pub fn is_active(&self) -> Result<bool, PortError> {
        Ok(self.state()?.active)
    }

    pub fn switch_log(&self) -> Result<Vec<u64>, PortError> {
        Ok(self.state()?.switch_log.clone())
    }
}

#[async_trait(?Send)]
impl RemoteSessionPort for RelaySessionAdapter {
    async fn switch_network(
        &self,
        target: &NetworkDescriptor,
    ) -> Result<Option<RemoteAccount>, ProviderRpcError> {
        let supports_add_chain = {
            let mut g = self
                .state()
                .map_err(|e| ProviderRpcError::internal(e.to_string()))?;
            if !g.active {
                return Err(ProviderRpcError::disconnected());
            }
            g.switch_log.push(target.chain_id);
            if !g.approved_chain_ids.contains(&target.chain_id) && !g.supports_add_chain {
                return Err(ProviderRpcError::new(
                    ProviderRpcError::RELAY_DEFAULT,
                    format!("Unsupported chain {} for this session", target.hex_chain_id()),
                )
                .with_data(serde_json::json!({ "chainId": target.hex_chain_id() })));
            }
            g.supports_add_chain
        };

        let params = serde_json::json!([{ "chainId": target.hex_chain_id() }]);
        match self.wallet.request(SWITCH_CHAIN_METHOD, params).await {
            Ok(_) => {}
            Err(err) if supports_add_chain && is_unrecognized_chain(&err) => {
                self.wallet
                    .request(ADD_CHAIN_METHOD, serde_json::json!([target.add_chain_payload()]))
                    .await?;
            }
            Err(err) => return Err(err),
        }

        if let Ok(mut g) = self.state() {
            if !g.approved_chain_ids.contains(&target.chain_id) {
                g.approved_chain_ids.push(target.chain_id);
            }
        }
        Ok(None)
    }

    async fn disconnect(&self) -> Result<(), ProviderRpcError> {
        {
            let mut g = self
                .state()
                .map_err(|e| ProviderRpcError::internal(e.to_string()))?;
            if !g.active {
                return Ok(());
            }
            g.active = false;
        }
        self.wallet
            .debug_set_authorized(false)
            .map_err(|e| ProviderRpcError::internal(e.to_string()))?;
        tracing::debug!("relay session closed");
        Ok(())
    }

    fn peer_info(&self) -> Option<ConnectedWalletInfo> {
        self.state().ok()?.peer.clone()
    }

    fn approved_networks(&self) -> ApprovedNetworks {
        match self.state() {
            Ok(g) => ApprovedNetworks {
                supports_all_networks: g.supports_add_chain,
                approved_chain_ids: Some(g.approved_chain_ids.clone()),
            },
            Err(e) => {
                tracing::warn!(error = %e, "relay session state unavailable");
                ApprovedNetworks::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaces_yield_approved_chains() {
        let session = RelaySessionAdapter::from_namespaces(
            Eip1193Adapter::deterministic(),
            &serde_json::json!({
                "eip155": {
                    "chains": ["eip155:1", "eip155:8453"],
                    "methods": ["eth_sendTransaction", "wallet_addEthereumChain"]
                }
            }),
        )
        .expect("session");
        let approved = session.approved_networks();
        assert!(approved.supports_all_networks);
        assert_eq!(approved.approved_chain_ids, Some(vec![1, 8453]));
    }

    #[test]
    fn settlement_carries_peer_metadata() {
        let session = RelaySessionAdapter::from_session(
            Eip1193Adapter::deterministic(),
            &serde_json::json!({
                "namespaces": { "eip155": { "chains": ["eip155:1"], "methods": [] } },
                "peer": {
                    "metadata": {
                        "name": "Rainbow",
                        "icons": ["https://rainbow.me/icon.png"]
                    }
                }
            }),
        )
        .expect("session");
        assert_eq!(
            session.peer_info(),
            Some(ConnectedWalletInfo {
                name: "Rainbow".to_owned(),
                icon: Some("https://rainbow.me/icon.png".to_owned()),
            })
        );
        assert_eq!(session.approved_networks().approved_chain_ids, Some(vec![1]));
    }

    #[test]
    fn missing_namespace_is_rejected() {
        let err = RelaySessionAdapter::from_namespaces(
            Eip1193Adapter::deterministic(),
            &serde_json::json!({ "solana": {} }),
        )
        .expect_err("must fail");
        assert!(matches!(err, PortError::Validation(_)));
    }
}
