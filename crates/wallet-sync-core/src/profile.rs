use std::sync::Arc;

use alloy::primitives::{utils::format_ether, Address};

use crate::domain::{AccountProfile, Balance, NetworkDescriptor, NAME_SERVICE_CHAIN_ID};
use crate::ports::{BalancePort, IdentityPort, NameServicePort};

/// Resolves display identity and native balance for a connected address.
/// Every lookup failure is logged and yields an empty field.
#[derive(Clone, Default)]
pub struct AccountProfileSynchronizer {
    identity: Option<Arc<dyn IdentityPort>>,
    name_service: Option<Arc<dyn NameServicePort>>,
    balance: Option<Arc<dyn BalancePort>>,
}

impl AccountProfileSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity(mut self, identity: Arc<dyn IdentityPort>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_name_service(mut self, name_service: Arc<dyn NameServicePort>) -> Self {
        self.name_service = Some(name_service);
        self
    }

    pub fn with_balance(mut self, balance: Arc<dyn BalancePort>) -> Self {
        self.balance = Some(balance);
        self
    }

    pub async fn sync_profile(
        &self,
        address: Address,
        chain_id: u64,
        network: Option<&NetworkDescriptor>,
    ) -> AccountProfile {
        let (name, avatar) = self.resolve_identity(address, chain_id).await;
        let balance = match network {
            Some(network) => self.sync_balance(address, network).await,
            None => None,
        };
        AccountProfile {
            name,
            avatar,
            balance,
        }
    }

    async fn resolve_identity(&self, address: Address, chain_id: u64) -> (Option<String>, Option<String>) {
        if let Some(identity) = &self.identity {
            match identity.lookup(address, chain_id).await {
                Ok(Some(found)) if found.name.is_some() => return (found.name, found.avatar),
                Ok(_) => tracing::debug!(%address, "identity api returned no name"),
                Err(e) => tracing::warn!(%address, error = %e, "identity lookup failed"),
            }
        }

        if chain_id != NAME_SERVICE_CHAIN_ID {
            return (None, None);
        }
        let Some(name_service) = &self.name_service else {
            return (None, None);
        };
        let name = match name_service.lookup_address(address).await {
            Ok(Some(name)) => name,
            Ok(None) => return (None, None),
            Err(e) => {
                tracing::warn!(%address, error = %e, "reverse name lookup failed");
                return (None, None);
            }
        };
        let avatar = match name_service.avatar(&name).await {
            Ok(avatar) => avatar,
            Err(e) => {
                tracing::warn!(%name, error = %e, "avatar lookup failed");
                None
            }
        };
        (Some(name), avatar)
    }

    pub async fn sync_balance(&self, address: Address, network: &NetworkDescriptor) -> Option<Balance> {
        let balance = self.balance.as_ref()?;
        match balance.native_balance(address, network).await {
            Ok(value) => Some(Balance {
                value,
                formatted: format_ether(value),
                symbol: network.native_currency_symbol().to_owned(),
            }),
            Err(e) => {
                tracing::warn!(%address, chain_id = network.chain_id, error = %e, "balance lookup failed");
                None
            }
        }
    }
}

impl std::fmt::Debug for AccountProfileSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountProfileSynchronizer")
            .field("identity", &self.identity.is_some())
            .field("name_service", &self.name_service.is_some())
            .field("balance", &self.balance.is_some())
            .finish()
    }
}
