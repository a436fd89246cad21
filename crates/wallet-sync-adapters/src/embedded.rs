use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use alloy::primitives::Address;
use async_trait::async_trait;
use serde_json::Value;

use wallet_sync_core::domain::{chain_id_to_hex, parse_accounts};
use wallet_sync_core::network::{is_unrecognized_chain, ADD_CHAIN_METHOD, SWITCH_CHAIN_METHOD};
use wallet_sync_core::ports::EventListener;
use wallet_sync_core::{
    AccountType, ApprovedNetworks, ListenerId, NetworkDescriptor, PortError, ProviderEventKind,
    ProviderPort, ProviderRpcError, RemoteAccount, RemoteSessionPort,
};

use crate::Eip1193Adapter;

/// Email / social login wallet. Signs with an owner key held by the
/// embedded wallet and may expose a per-chain smart account instead.
#[derive(Debug, Clone)]
pub struct EmbeddedAuthAdapter {
    wallet: Eip1193Adapter,
    inner: Arc<Mutex<EmbeddedState>>,
}

#[derive(Debug, Default)]
struct EmbeddedState {
    preferred: AccountType,
    smart_accounts: HashMap<u64, Address>,
    signed_in: bool,
}

impl EmbeddedAuthAdapter {
    pub fn new(wallet: Eip1193Adapter) -> Self {
        Self {
            wallet,
            inner: Arc::new(Mutex::new(EmbeddedState {
                preferred: AccountType::Eoa,
                smart_accounts: HashMap::new(),
                signed_in: true,
            })),
        }
    }

    /// Registers the smart account deployed for `chain_id` and prefers smart
    /// accounts from now on.
    pub fn with_smart_account(self, chain_id: u64, address: Address) -> Self {
        if let Ok(mut g) = self.state() {
            g.preferred = AccountType::SmartAccount;
            g.smart_accounts.insert(chain_id, address);
        }
        self
    }

    /// Smart account deployed for `chain_id`, without changing the
    /// preference.
    pub fn add_smart_account(&self, chain_id: u64, address: Address) -> Result<(), PortError> {
        self.state()?.smart_accounts.insert(chain_id, address);
        Ok(())
    }

    pub fn preferred_account_type(&self) -> AccountType {
        self.state()
            .map(|g| g.preferred)
            .unwrap_or(AccountType::Eoa)
    }

    /// Kind of account presented on the wallet's current chain.
    pub fn current_account_type(&self) -> AccountType {
        self.wallet
            .chain_id()
            .and_then(|chain_id| self.account_on(chain_id))
            .ok()
            .flatten()
            .map(|account| account.account_type)
            .unwrap_or(AccountType::Eoa)
    }

    pub fn sign_in(&self) -> Result<(), PortError> {
        self.state()?.signed_in = true;
        Ok(())
    }

    pub fn is_signed_in(&self) -> Result<bool, PortError> {
        Ok(self.state()?.signed_in)
    }

    pub fn wallet(&self) -> &Eip1193Adapter {
        &self.wallet
    }

    fn state(&self) -> Result<MutexGuard<'_, EmbeddedState>, PortError> {
        self.inner
            .lock()
            .map_err(|e| PortError::Transport(format!("embedded wallet lock poisoned: {e}")))
    }

    /// Account presented on `chain_id`: the smart account when one exists and
    /// is preferred, else the owner key.
    fn account_on(&self, chain_id: u64) -> Result<Option<RemoteAccount>, PortError> {
        let smart = {
            let g = self.state()?;
            match g.preferred {
                AccountType::SmartAccount => g.smart_accounts.get(&chain_id).copied(),
                AccountType::Eoa => None,
            }
        };
        if let Some(address) = smart {
            return Ok(Some(RemoteAccount {
                address,
                account_type: AccountType::SmartAccount,
            }));
        }
        Ok(self.wallet.accounts()?.first().map(|address| RemoteAccount {
            address: *address,
            account_type: AccountType::Eoa,
        }))
    }
}

#[async_trait(?Send)]
impl ProviderPort for EmbeddedAuthAdapter {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderRpcError> {
        let signed_in = self
            .state()
            .map_err(|e| ProviderRpcError::internal(e.to_string()))?
            .signed_in;
        if !signed_in && method == "eth_requestAccounts" {
            return Err(ProviderRpcError::new(
                ProviderRpcError::UNAUTHORIZED,
                "embedded wallet is signed out",
            ));
        }
        let result = self.wallet.request(method, params).await?;
        if !matches!(method, "eth_requestAccounts" | "eth_accounts") {
            return Ok(result);
        }
        if !signed_in || parse_accounts(&result).is_some_and(|a| a.is_empty()) {
            return Ok(Value::Array(Vec::new()));
        }
        let chain_id = self
            .wallet
            .chain_id()
            .map_err(|e| ProviderRpcError::internal(e.to_string()))?;
        match self
            .account_on(chain_id)
            .map_err(|e| ProviderRpcError::internal(e.to_string()))?
        {
            Some(account) => Ok(serde_json::json!([account.address.to_string()])),
            None => Ok(result),
        }
    }

    fn on(&self, kind: ProviderEventKind, listener: EventListener) -> ListenerId {
        self.wallet.on(kind, listener)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.wallet.remove_listener(id)
    }
}

#[async_trait(?Send)]
impl RemoteSessionPort for EmbeddedAuthAdapter {
    async fn switch_network(
        &self,
        target: &NetworkDescriptor,
    ) -> Result<Option<RemoteAccount>, ProviderRpcError> {
        let params = serde_json::json!([{ "chainId": chain_id_to_hex(target.chain_id) }]);
        match self.wallet.request(SWITCH_CHAIN_METHOD, params).await {
            Ok(_) => {}
            // The embedded wallet can reach any configured network.
            Err(err) if is_unrecognized_chain(&err) => {
                self.wallet
                    .request(ADD_CHAIN_METHOD, serde_json::json!([target.add_chain_payload()]))
                    .await?;
            }
            Err(err) => return Err(err),
        }
        let account = self
            .account_on(target.chain_id)
            .map_err(|e| ProviderRpcError::internal(e.to_string()))?;
        tracing::debug!(chain_id = target.chain_id, account = ?account, "embedded wallet switched");
        Ok(account)
    }

    async fn disconnect(&self) -> Result<(), ProviderRpcError> {
        self.state()
            .map_err(|e| ProviderRpcError::internal(e.to_string()))?
            .signed_in = false;
        self.wallet
            .debug_set_authorized(false)
            .map_err(|e| ProviderRpcError::internal(e.to_string()))
    }

    fn approved_networks(&self) -> ApprovedNetworks {
        ApprovedNetworks::all()
    }

    async fn set_preferred_account_type(
        &self,
        account_type: AccountType,
        chain_id: u64,
    ) -> Result<RemoteAccount, ProviderRpcError> {
        {
            let mut g = self
                .state()
                .map_err(|e| ProviderRpcError::internal(e.to_string()))?;
            if !g.signed_in {
                return Err(ProviderRpcError::new(
                    ProviderRpcError::UNAUTHORIZED,
                    "embedded wallet is signed out",
                ));
            }
            g.preferred = account_type;
        }
        let account = self
            .account_on(chain_id)
            .map_err(|e| ProviderRpcError::internal(e.to_string()))?
            .ok_or_else(|| {
                ProviderRpcError::new(ProviderRpcError::UNAUTHORIZED, "embedded wallet has no account")
            })?;
        tracing::debug!(?account_type, chain_id, account = ?account, "embedded account preference changed");
        Ok(account)
    }

    fn account_type_of(&self, address: Address) -> Option<AccountType> {
        if self
            .state()
            .ok()?
            .smart_accounts
            .values()
            .any(|smart| *smart == address)
        {
            return Some(AccountType::SmartAccount);
        }
        self.wallet
            .accounts()
            .ok()?
            .contains(&address)
            .then_some(AccountType::Eoa)
    }
}
