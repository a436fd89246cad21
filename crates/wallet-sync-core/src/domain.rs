use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const INJECTED_CONNECTOR_ID: &str = "injected";
pub const RELAY_CONNECTOR_ID: &str = "walletConnect";
pub const HOSTED_SDK_CONNECTOR_ID: &str = "coinbaseWalletSDK";
pub const EMBEDDED_AUTH_CONNECTOR_ID: &str = "auth";

/// Chain id of the only network carrying the public name registry.
pub const NAME_SERVICE_CHAIN_ID: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    Eip155,
    Solana,
    Bip122,
}

impl Namespace {
    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Eip155 => "eip155",
            Namespace::Solana => "solana",
            Namespace::Bip122 => "bip122",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectorKind {
    Injected,
    Announced,
    Relay,
    EmbeddedAuth,
    HostedSdk,
}

impl ConnectorKind {
    /// Kinds whose network switching and teardown go through a remote session
    /// instead of direct provider requests.
    pub fn uses_remote_session(self) -> bool {
        match self {
            ConnectorKind::Relay | ConnectorKind::EmbeddedAuth => true,
            ConnectorKind::Injected | ConnectorKind::Announced | ConnectorKind::HostedSdk => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorMetadata {
    pub image_url: Option<String>,
    pub rdns: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connector {
    pub id: String,
    pub display_name: String,
    pub kind: ConnectorKind,
    pub metadata: ConnectorMetadata,
}

impl Connector {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, kind: ConnectorKind) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            kind,
            metadata: ConnectorMetadata::default(),
        }
    }

    pub fn with_image_url(mut self, image_url: impl Into<String>) -> Self {
        self.metadata.image_url = Some(image_url.into());
        self
    }

    pub fn with_rdns(mut self, rdns: impl Into<String>) -> Self {
        self.metadata.rdns = Some(rdns.into());
        self
    }

    pub fn injected() -> Self {
        Self::new(INJECTED_CONNECTOR_ID, "Browser Wallet", ConnectorKind::Injected)
    }

    pub fn relay() -> Self {
        Self::new(RELAY_CONNECTOR_ID, "WalletConnect", ConnectorKind::Relay)
    }

    pub fn hosted_sdk(rdns: impl Into<String>) -> Self {
        Self::new(HOSTED_SDK_CONNECTOR_ID, "Coinbase Wallet", ConnectorKind::HostedSdk)
            .with_rdns(rdns)
    }

    pub fn embedded_auth() -> Self {
        Self::new(EMBEDDED_AUTH_CONNECTOR_ID, "Email", ConnectorKind::EmbeddedAuth)
    }

    /// Connector built from a wallet's discovery announcement.
    pub fn announced(info: &AnnouncedWalletInfo) -> Self {
        let id = match info.rdns.as_deref() {
            Some(rdns) if !rdns.is_empty() => rdns.to_owned(),
            _ => format!("announced:{}", info.name),
        };
        Self {
            id,
            display_name: info.name.clone(),
            kind: ConnectorKind::Announced,
            metadata: ConnectorMetadata {
                image_url: info.icon.clone(),
                rdns: info.rdns.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncedWalletInfo {
    pub uuid: String,
    pub name: String,
    pub icon: Option<String>,
    pub rdns: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccountType {
    #[default]
    Eoa,
    SmartAccount,
}

/// Externally observed connection state of one namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    pub status: ConnectionStatus,
    pub address: Option<Address>,
    pub chain_id: Option<u64>,
    pub account_type: Option<AccountType>,
    pub all_accounts: Vec<Address>,
    pub active_connector_id: Option<String>,
}

impl ConnectionRecord {
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// True when no connection field is populated.
    pub fn is_cleared(&self) -> bool {
        self.address.is_none()
            && self.chain_id.is_none()
            && self.account_type.is_none()
            && self.all_accounts.is_empty()
            && self.active_connector_id.is_none()
    }
}

/// Read-only projection handed to the sign-in collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub address: Address,
    pub chain_id: u64,
}

/// Name and icon of the wallet behind the active connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedWalletInfo {
    pub name: String,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDescriptor {
    pub chain_id: u64,
    pub name: String,
    pub rpc_url: String,
    pub explorer_url: Option<String>,
    pub native_currency: NativeCurrency,
}

impl NetworkDescriptor {
    pub fn new(
        chain_id: u64,
        name: impl Into<String>,
        rpc_url: impl Into<String>,
        native_currency_symbol: impl Into<String>,
    ) -> Self {
        let symbol = native_currency_symbol.into();
        Self {
            chain_id,
            name: name.into(),
            rpc_url: rpc_url.into(),
            explorer_url: None,
            native_currency: NativeCurrency {
                name: symbol.clone(),
                symbol,
                decimals: 18,
            },
        }
    }

    pub fn with_explorer_url(mut self, explorer_url: impl Into<String>) -> Self {
        self.explorer_url = Some(explorer_url.into());
        self
    }

    pub fn native_currency_symbol(&self) -> &str {
        &self.native_currency.symbol
    }

    pub fn hex_chain_id(&self) -> String {
        chain_id_to_hex(self.chain_id)
    }

    /// Parameter object of `wallet_addEthereumChain`.
    pub fn add_chain_payload(&self) -> Value {
        serde_json::json!({
            "chainId": self.hex_chain_id(),
            "chainName": self.name,
            "nativeCurrency": {
                "name": self.native_currency.name,
                "symbol": self.native_currency.symbol,
                "decimals": self.native_currency.decimals,
            },
            "rpcUrls": [self.rpc_url],
            "blockExplorerUrls": self.explorer_url.iter().collect::<Vec<_>>(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    pub connector_id: String,
    pub connector_display_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProviderEventKind {
    Disconnect,
    AccountsChanged,
    ChainChanged,
}

impl ProviderEventKind {
    pub const ALL: [ProviderEventKind; 3] = [
        ProviderEventKind::Disconnect,
        ProviderEventKind::AccountsChanged,
        ProviderEventKind::ChainChanged,
    ];

    pub fn event_name(self) -> &'static str {
        match self {
            ProviderEventKind::Disconnect => "disconnect",
            ProviderEventKind::AccountsChanged => "accountsChanged",
            ProviderEventKind::ChainChanged => "chainChanged",
        }
    }
}

/// Raw event as emitted by a provider; the payload keeps the wallet's shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEvent {
    pub kind: ProviderEventKind,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub value: U256,
    pub formatted: String,
    pub symbol: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountProfile {
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub balance: Option<Balance>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovedNetworks {
    pub supports_all_networks: bool,
    pub approved_chain_ids: Option<Vec<u64>>,
}

impl ApprovedNetworks {
    pub fn all() -> Self {
        Self {
            supports_all_networks: true,
            approved_chain_ids: None,
        }
    }
}

pub fn chain_id_to_hex(chain_id: u64) -> String {
    format!("0x{chain_id:x}")
}

/// Accepts `0x`-prefixed hex strings, decimal strings and JSON numbers.
pub fn parse_chain_id(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    if let Some(f) = value.as_f64() {
        if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 {
            return Some(f as u64);
        }
        return None;
    }
    parse_chain_id_str(value.as_str()?)
}

pub fn parse_chain_id_str(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    // CAIP-2 form, e.g. "eip155:137"
    let raw = raw.rsplit(':').next().unwrap_or(raw);
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        raw.parse().ok()
    }
}

/// Parses a provider account list, skipping entries that are not addresses.
///
/// Only an explicitly empty array yields an empty list; a non-empty array
/// without a single valid address is malformed and yields `None`.
pub fn parse_accounts(value: &Value) -> Option<Vec<Address>> {
    let items = value.as_array()?;
    let accounts: Vec<Address> = items
        .iter()
        .filter_map(|item| item.as_str())
        .filter_map(|raw| raw.parse::<Address>().ok())
        .collect();
    if accounts.is_empty() && !items.is_empty() {
        return None;
    }
    Some(accounts)
}

pub fn caip_address(namespace: Namespace, chain_id: u64, address: Address) -> String {
    format!("{}:{chain_id}:{address}", namespace.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_id_forms_normalize_to_numeric() {
        assert_eq!(parse_chain_id(&serde_json::json!("0x89")), Some(137));
        assert_eq!(parse_chain_id(&serde_json::json!("0X1")), Some(1));
        assert_eq!(parse_chain_id(&serde_json::json!("137")), Some(137));
        assert_eq!(parse_chain_id(&serde_json::json!(8453)), Some(8453));
        assert_eq!(parse_chain_id(&serde_json::json!("eip155:10")), Some(10));
        assert_eq!(parse_chain_id(&serde_json::json!("banana")), None);
        assert_eq!(parse_chain_id(&serde_json::json!(null)), None);
    }

    #[test]
    fn add_chain_payload_carries_full_descriptor() {
        let network = NetworkDescriptor::new(137, "Polygon", "https://polygon-rpc.com", "POL")
            .with_explorer_url("https://polygonscan.com");
        let payload = network.add_chain_payload();
        assert_eq!(payload["chainId"], "0x89");
        assert_eq!(payload["chainName"], "Polygon");
        assert_eq!(payload["nativeCurrency"]["symbol"], "POL");
        assert_eq!(payload["nativeCurrency"]["decimals"], 18);
        assert_eq!(payload["rpcUrls"][0], "https://polygon-rpc.com");
        assert_eq!(payload["blockExplorerUrls"][0], "https://polygonscan.com");
    }

    #[test]
    fn announced_connector_prefers_rdns_as_id() {
        let info = AnnouncedWalletInfo {
            uuid: "u-1".to_owned(),
            name: "Rabby".to_owned(),
            icon: None,
            rdns: Some("io.rabby".to_owned()),
        };
        assert_eq!(Connector::announced(&info).id, "io.rabby");

        let anonymous = AnnouncedWalletInfo { rdns: None, ..info };
        assert_eq!(Connector::announced(&anonymous).id, "announced:Rabby");
    }

    #[test]
    fn invalid_accounts_are_skipped() {
        let accounts = parse_accounts(&serde_json::json!([
            "0x1000000000000000000000000000000000000001",
            "not-an-address"
        ]))
        .expect("array");
        assert_eq!(accounts.len(), 1);
    }

    #[test]
    fn only_an_empty_array_means_no_accounts() {
        assert_eq!(parse_accounts(&serde_json::json!([])), Some(Vec::new()));
        assert_eq!(parse_accounts(&serde_json::json!(["not-an-address"])), None);
        assert_eq!(parse_accounts(&serde_json::json!([null, 7])), None);
        assert_eq!(parse_accounts(&serde_json::json!("0x01")), None);
    }
}
