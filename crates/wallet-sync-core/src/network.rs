use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::domain::{ConnectorKind, NetworkDescriptor};
use crate::ports::{ProviderHandle, ProviderPort, ProviderRpcError, RemoteAccount, RemoteSessionPort};

pub const SWITCH_CHAIN_METHOD: &str = "wallet_switchEthereumChain";
pub const ADD_CHAIN_METHOD: &str = "wallet_addEthereumChain";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwitchError {
    #[error("network switch rejected: {0}")]
    Rejected(String),
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("chain {0} is not supported by the wallet")]
    ChainNotSupported(u64),
    #[error("chain {0} is not a configured network")]
    NetworkNotConfigured(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOutcome {
    AlreadyActive,
    Switched,
    /// Chain had to be registered with the wallet first.
    AddedAndSwitched,
    /// Delegated to a remote session that also reported the account to use.
    SwitchedWithAccount(RemoteAccount),
}

/// Runs the two-phase switch protocol against the active provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkSwitcher;

impl NetworkSwitcher {
    pub async fn switch_network(
        &self,
        kind: ConnectorKind,
        handle: &ProviderHandle,
        current_chain_id: Option<u64>,
        target: &NetworkDescriptor,
    ) -> Result<SwitchOutcome, SwitchError> {
        if current_chain_id == Some(target.chain_id) {
            return Ok(SwitchOutcome::AlreadyActive);
        }
        match kind {
            ConnectorKind::Relay | ConnectorKind::EmbeddedAuth => {
                let session = handle.session().ok_or_else(|| {
                    SwitchError::ProviderUnavailable(format!("{kind:?} connection has no session"))
                })?;
                self.switch_via_session(session, target).await
            }
            ConnectorKind::Injected | ConnectorKind::Announced | ConnectorKind::HostedSdk => {
                self.switch_via_provider(handle.provider(), target).await
            }
        }
    }

    async fn switch_via_provider(
        &self,
        provider: &Arc<dyn ProviderPort>,
        target: &NetworkDescriptor,
    ) -> Result<SwitchOutcome, SwitchError> {
        let params = serde_json::json!([{ "chainId": target.hex_chain_id() }]);
        let err = match provider.request(SWITCH_CHAIN_METHOD, params).await {
            Ok(_) => return Ok(SwitchOutcome::Switched),
            Err(err) => err,
        };
        if !is_unrecognized_chain(&err) {
            return Err(classify(err));
        }

        tracing::info!(chain_id = target.chain_id, "chain unknown to wallet, adding it");
        match provider
            .request(ADD_CHAIN_METHOD, serde_json::json!([target.add_chain_payload()]))
            .await
        {
            Ok(_) => Ok(SwitchOutcome::AddedAndSwitched),
            Err(add_err) => {
                tracing::warn!(chain_id = target.chain_id, error = %add_err, "add-chain fallback failed");
                Err(SwitchError::ChainNotSupported(target.chain_id))
            }
        }
    }

    async fn switch_via_session(
        &self,
        session: &Arc<dyn RemoteSessionPort>,
        target: &NetworkDescriptor,
    ) -> Result<SwitchOutcome, SwitchError> {
        match session.switch_network(target).await {
            Ok(Some(account)) => Ok(SwitchOutcome::SwitchedWithAccount(account)),
            Ok(None) => Ok(SwitchOutcome::Switched),
            Err(err) if is_unrecognized_chain(&err) => {
                Err(SwitchError::ChainNotSupported(target.chain_id))
            }
            Err(err) => Err(classify(err)),
        }
    }
}

/// Whether a failed switch means "this chain is unknown to the wallet".
pub fn is_unrecognized_chain(err: &ProviderRpcError) -> bool {
    if err.code == ProviderRpcError::UNRECOGNIZED_CHAIN {
        return true;
    }
    if err.code == ProviderRpcError::RELAY_DEFAULT && mentions_chain(&err.message, err.data.as_ref()) {
        return true;
    }
    let Some(data) = err.data.as_ref() else {
        return false;
    };
    ["originalError", "innerError"].iter().any(|key| {
        data.get(key)
            .and_then(|inner| inner.get("code"))
            .and_then(Value::as_i64)
            == Some(ProviderRpcError::UNRECOGNIZED_CHAIN)
    })
}

fn mentions_chain(message: &str, data: Option<&Value>) -> bool {
    if message.to_ascii_lowercase().contains("chain") {
        return true;
    }
    data.is_some_and(|d| d.get("chainId").is_some() || d.to_string().to_ascii_lowercase().contains("chain"))
}

fn classify(err: ProviderRpcError) -> SwitchError {
    if err.is_disconnection() {
        SwitchError::ProviderUnavailable(err.message)
    } else {
        SwitchError::Rejected(err.message)
    }
}
