use std::sync::Arc;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::{
    AccountType, AnnouncedWalletInfo, ApprovedNetworks, ConnectedWalletInfo, Connector,
    NetworkDescriptor, ProviderEvent, ProviderEventKind,
};

#[derive(Debug, Error)]
pub enum PortError {
    #[error("port not implemented: {0}")]
    NotImplemented(&'static str),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("policy error: {0}")]
    Policy(String),
}

/// EIP-1193 style request failure reported by a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("provider rpc error {code}: {message}")]
pub struct ProviderRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ProviderRpcError {
    pub const USER_REJECTED: i64 = 4001;
    pub const UNAUTHORIZED: i64 = 4100;
    pub const UNSUPPORTED_METHOD: i64 = 4200;
    pub const DISCONNECTED: i64 = 4900;
    pub const CHAIN_DISCONNECTED: i64 = 4901;
    pub const UNRECOGNIZED_CHAIN: i64 = 4902;
    /// Generic relay failure code; also used by relays for user rejection.
    pub const RELAY_DEFAULT: i64 = 5000;
    pub const RELAY_REJECTED_METHODS: i64 = 5002;
    pub const INTERNAL: i64 = -32603;

    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn user_rejected() -> Self {
        Self::new(Self::USER_REJECTED, "User rejected the request.")
    }

    pub fn unrecognized_chain(chain_id: u64) -> Self {
        Self::new(
            Self::UNRECOGNIZED_CHAIN,
            format!("Unrecognized chain ID \"{}\".", crate::domain::chain_id_to_hex(chain_id)),
        )
    }

    pub fn disconnected() -> Self {
        Self::new(Self::DISCONNECTED, "The provider is disconnected from all chains.")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Self::INTERNAL, message)
    }

    pub fn is_user_rejection(&self) -> bool {
        matches!(
            self.code,
            Self::USER_REJECTED | Self::RELAY_DEFAULT | Self::RELAY_REJECTED_METHODS
        )
    }

    pub fn is_disconnection(&self) -> bool {
        matches!(self.code, Self::DISCONNECTED | Self::CHAIN_DISCONNECTED)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

pub type EventListener = Arc<dyn Fn(&ProviderEvent) + Send + Sync>;

/// A single live wallet connection: request channel plus event emitter.
#[async_trait(?Send)]
pub trait ProviderPort: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderRpcError>;
    fn on(&self, kind: ProviderEventKind, listener: EventListener) -> ListenerId;
    fn remove_listener(&self, id: ListenerId) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAccount {
    pub address: Address,
    pub account_type: AccountType,
}

/// Session-level capabilities of relay and embedded-auth connections.
#[async_trait(?Send)]
pub trait RemoteSessionPort: Send + Sync {
    /// Switches the session's active chain. May report a different account,
    /// e.g. a per-chain smart account.
    async fn switch_network(
        &self,
        target: &NetworkDescriptor,
    ) -> Result<Option<RemoteAccount>, ProviderRpcError>;
    async fn disconnect(&self) -> Result<(), ProviderRpcError>;
    fn approved_networks(&self) -> ApprovedNetworks;

    /// Switches between the owner key and the smart account on `chain_id`
    /// and reports the account now presented.
    async fn set_preferred_account_type(
        &self,
        _account_type: AccountType,
        _chain_id: u64,
    ) -> Result<RemoteAccount, ProviderRpcError> {
        Err(ProviderRpcError::new(
            ProviderRpcError::UNSUPPORTED_METHOD,
            "session has no account type preference",
        ))
    }

    /// Kind of `address` within this session, if the session knows it.
    fn account_type_of(&self, _address: Address) -> Option<AccountType> {
        None
    }

    /// Wallet metadata shared by the peer when the session was established.
    fn peer_info(&self) -> Option<ConnectedWalletInfo> {
        None
    }
}

/// Freshly acquired connection for one connector.
pub struct ProviderHandle {
    provider: Arc<dyn ProviderPort>,
    session: Option<Arc<dyn RemoteSessionPort>>,
    account_type: AccountType,
}

impl ProviderHandle {
    pub fn direct(provider: Arc<dyn ProviderPort>) -> Self {
        Self {
            provider,
            session: None,
            account_type: AccountType::Eoa,
        }
    }

    pub fn with_session(
        provider: Arc<dyn ProviderPort>,
        session: Arc<dyn RemoteSessionPort>,
    ) -> Self {
        Self {
            provider,
            session: Some(session),
            account_type: AccountType::Eoa,
        }
    }

    pub fn with_account_type(mut self, account_type: AccountType) -> Self {
        self.account_type = account_type;
        self
    }

    pub fn provider(&self) -> &Arc<dyn ProviderPort> {
        &self.provider
    }

    pub fn session(&self) -> Option<&Arc<dyn RemoteSessionPort>> {
        self.session.as_ref()
    }

    pub fn account_type(&self) -> AccountType {
        self.account_type
    }
}

impl std::fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderHandle")
            .field("has_session", &self.session.is_some())
            .field("account_type", &self.account_type)
            .finish()
    }
}

/// Resolves a connector to a live provider handle.
#[async_trait(?Send)]
pub trait ProviderSourcePort: Send + Sync {
    async fn acquire(&self, connector: &Connector) -> Result<ProviderHandle, PortError>;
}

/// Durable string key-value storage (browser localStorage or equivalent).
pub trait KeyValuePort: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, PortError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), PortError>;
    fn remove_item(&self, key: &str) -> Result<(), PortError>;
}

#[derive(Clone)]
pub struct Announcement {
    pub info: AnnouncedWalletInfo,
    pub provider: Arc<dyn ProviderPort>,
}

impl std::fmt::Debug for Announcement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Announcement").field("info", &self.info).finish()
    }
}

pub type AnnouncementListener = Arc<dyn Fn(&Announcement) + Send + Sync>;

/// Broadcast discovery signal for announced wallets.
pub trait DiscoveryPort: Send + Sync {
    fn subscribe(&self, listener: AnnouncementListener) -> ListenerId;
    /// Asks already-present wallets to announce themselves again.
    fn request_announcements(&self);
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: Option<String>,
    pub avatar: Option<String>,
}

#[async_trait(?Send)]
pub trait IdentityPort: Send + Sync {
    async fn lookup(&self, address: Address, chain_id: u64) -> Result<Option<Identity>, PortError>;
}

#[async_trait(?Send)]
pub trait NameServicePort: Send + Sync {
    async fn lookup_address(&self, address: Address) -> Result<Option<String>, PortError>;
    async fn avatar(&self, name: &str) -> Result<Option<String>, PortError>;
}

#[async_trait(?Send)]
pub trait BalancePort: Send + Sync {
    async fn native_balance(
        &self,
        address: Address,
        network: &NetworkDescriptor,
    ) -> Result<U256, PortError>;
}
