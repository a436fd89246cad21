use alloy::primitives::Address;
use async_trait::async_trait;
use reqwest::StatusCode;

use wallet_sync_core::ports::Identity;
use wallet_sync_core::{IdentityPort, PortError};

use crate::JsonRpcClient;

/// Hosted identity lookup: `GET <base>/v1/identity/<address>?chainId=<id>`.
#[derive(Debug, Clone)]
pub struct IdentityApiAdapter {
    base_url: String,
    rpc: JsonRpcClient,
}

impl IdentityApiAdapter {
    pub fn new(base_url: impl Into<String>, rpc: JsonRpcClient) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            rpc,
        }
    }

    fn url(&self, address: Address, chain_id: u64) -> String {
        format!("{}/v1/identity/{address}?chainId={chain_id}", self.base_url)
    }
}

#[async_trait(?Send)]
impl IdentityPort for IdentityApiAdapter {
    async fn lookup(&self, address: Address, chain_id: u64) -> Result<Option<Identity>, PortError> {
        let response = self
            .rpc
            .http()
            .get(self.url(address, chain_id))
            .send()
            .await
            .map_err(|e| PortError::Transport(format!("identity request failed: {e}")))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(PortError::Transport(format!("identity api status {status}")));
        }
        let identity: Identity = response
            .json()
            .await
            .map_err(|e| PortError::Validation(format!("identity json decode failed: {e}")))?;
        if identity.name.is_none() && identity.avatar.is_none() {
            return Ok(None);
        }
        Ok(Some(identity))
    }
}
