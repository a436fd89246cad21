use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use alloy::primitives::{address, Address};
use async_trait::async_trait;
use serde_json::Value;

use wallet_sync_core::domain::{chain_id_to_hex, parse_chain_id};
use wallet_sync_core::ports::EventListener;
use wallet_sync_core::{
    ListenerId, PortError, ProviderEvent, ProviderEventKind, ProviderPort, ProviderRpcError,
};

use crate::AdapterConfig;

/// EIP-1193 provider. Runs an in-memory wallet, forwards to a JSON-RPC proxy,
/// or refuses every call when the runtime profile forbids the fallback.
#[derive(Debug, Clone)]
pub struct Eip1193Adapter {
    mode: ProviderMode,
    state: Arc<Mutex<ProviderState>>,
}

#[derive(Debug, Clone)]
enum ProviderMode {
    Disabled(String),
    Deterministic,
    Proxy(ProxyRuntime),
}

#[derive(Debug, Clone)]
struct ProxyRuntime {
    base_url: String,
    client: reqwest::Client,
}

struct ProviderState {
    accounts: Vec<Address>,
    chain_id: u64,
    known_chains: BTreeSet<u64>,
    authorized: bool,
    listeners: Vec<(ListenerId, ProviderEventKind, EventListener)>,
    next_listener: u64,
    failures: HashMap<String, VecDeque<ProviderRpcError>>,
    request_log: Vec<(String, Value)>,
    request_seq: u64,
}

impl Default for ProviderState {
    fn default() -> Self {
        Self {
            accounts: vec![address!("0x1000000000000000000000000000000000000001")],
            chain_id: 1,
            known_chains: BTreeSet::from([1]),
            authorized: false,
            listeners: Vec::new(),
            next_listener: 0,
            failures: HashMap::new(),
            request_log: Vec::new(),
            request_seq: 0,
        }
    }
}

impl std::fmt::Debug for ProviderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderState")
            .field("accounts", &self.accounts)
            .field("chain_id", &self.chain_id)
            .field("known_chains", &self.known_chains)
            .field("authorized", &self.authorized)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Default for Eip1193Adapter {
    fn default() -> Self {
        Self::with_config(&AdapterConfig::from_env())
    }
}

impl Eip1193Adapter {
    pub fn with_config(config: &AdapterConfig) -> Self {
        let mode = if let Some(ref base_url) = config.eip1193_proxy_url {
            match build_client(config) {
                Ok(client) => ProviderMode::Proxy(ProxyRuntime {
                    base_url: base_url.clone(),
                    client,
                }),
                Err(e) => {
                    if config.strict_runtime_required() {
                        ProviderMode::Disabled(format!(
                            "failed to initialize EIP-1193 proxy client in production profile: {e}"
                        ))
                    } else {
                        tracing::warn!(error = %e, "eip1193 proxy client unavailable, using deterministic wallet");
                        ProviderMode::Deterministic
                    }
                }
            }
        } else if config.strict_runtime_required() {
            ProviderMode::Disabled(
                "EIP-1193 proxy URL not configured in production runtime profile".to_owned(),
            )
        } else {
            ProviderMode::Deterministic
        };

        Self {
            mode,
            state: Arc::new(Mutex::new(ProviderState::default())),
        }
    }

    /// In-memory wallet regardless of environment.
    pub fn deterministic() -> Self {
        Self {
            mode: ProviderMode::Deterministic,
            state: Arc::new(Mutex::new(ProviderState::default())),
        }
    }

    pub fn with_accounts(self, accounts: Vec<Address>) -> Self {
        if let Ok(mut g) = self.state() {
            g.accounts = accounts;
        }
        self
    }

    pub fn with_chain(self, chain_id: u64) -> Self {
        if let Ok(mut g) = self.state() {
            g.chain_id = chain_id;
            g.known_chains.insert(chain_id);
        }
        self
    }

    pub fn with_known_chains(self, chains: impl IntoIterator<Item = u64>) -> Self {
        if let Ok(mut g) = self.state() {
            g.known_chains.extend(chains);
        }
        self
    }

    /// Starts as if the user had already approved this origin.
    pub fn pre_authorized(self) -> Self {
        if let Ok(mut g) = self.state() {
            g.authorized = true;
        }
        self
    }

    pub fn is_deterministic(&self) -> bool {
        matches!(self.mode, ProviderMode::Deterministic)
    }

    fn state(&self) -> Result<MutexGuard<'_, ProviderState>, PortError> {
        self.state
            .lock()
            .map_err(|e| PortError::Transport(format!("provider lock poisoned: {e}")))
    }

    fn check_mode(&self) -> Result<(), PortError> {
        if let ProviderMode::Disabled(reason) = &self.mode {
            return Err(PortError::Policy(reason.clone()));
        }
        Ok(())
    }

    pub fn chain_id(&self) -> Result<u64, PortError> {
        Ok(self.state()?.chain_id)
    }

    pub fn accounts(&self) -> Result<Vec<Address>, PortError> {
        Ok(self.state()?.accounts.clone())
    }

    pub fn is_authorized(&self) -> Result<bool, PortError> {
        Ok(self.state()?.authorized)
    }

    pub fn knows_chain(&self, chain_id: u64) -> Result<bool, PortError> {
        Ok(self.state()?.known_chains.contains(&chain_id))
    }

    pub fn listener_count(&self) -> Result<usize, PortError> {
        Ok(self.state()?.listeners.len())
    }

    /// Methods requested so far, in order.
    pub fn request_log(&self) -> Result<Vec<String>, PortError> {
        Ok(self
            .state()?
            .request_log
            .iter()
            .map(|(method, _)| method.clone())
            .collect())
    }

    pub fn requests_for(&self, method: &str) -> Result<Vec<Value>, PortError> {
        Ok(self
            .state()?
            .request_log
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .collect())
    }

    /// Makes the next call of `method` fail with `error`.
    pub fn debug_fail_next(&self, method: &str, error: ProviderRpcError) -> Result<(), PortError> {
        self.state()?
            .failures
            .entry(method.to_owned())
            .or_default()
            .push_back(error);
        Ok(())
    }

    pub fn debug_set_authorized(&self, authorized: bool) -> Result<(), PortError> {
        self.state()?.authorized = authorized;
        Ok(())
    }

    pub fn debug_inject_accounts_changed(&self, accounts: Vec<Address>) -> Result<(), PortError> {
        let payload = serde_json::json!(accounts.iter().map(|a| a.to_string()).collect::<Vec<_>>());
        {
            let mut g = self.state()?;
            g.authorized = !accounts.is_empty();
            if !accounts.is_empty() {
                g.accounts = accounts;
            }
        }
        self.emit(ProviderEventKind::AccountsChanged, payload)
    }

    pub fn debug_inject_chain_changed(&self, chain_id: u64) -> Result<(), PortError> {
        {
            let mut g = self.state()?;
            g.chain_id = chain_id;
            g.known_chains.insert(chain_id);
        }
        self.emit(ProviderEventKind::ChainChanged, Value::String(chain_id_to_hex(chain_id)))
    }

    pub fn debug_inject_disconnect(&self) -> Result<(), PortError> {
        let err = ProviderRpcError::disconnected();
        let payload = serde_json::to_value(&err)
            .map_err(|e| PortError::Validation(format!("disconnect payload: {e}")))?;
        self.emit(ProviderEventKind::Disconnect, payload)
    }

    /// Emits `payload` as-is, e.g. a malformed event from a misbehaving wallet.
    pub fn debug_inject_raw_event(
        &self,
        kind: ProviderEventKind,
        payload: Value,
    ) -> Result<(), PortError> {
        self.emit(kind, payload)
    }

    /// Calls matching listeners outside the state lock.
    fn emit(&self, kind: ProviderEventKind, payload: Value) -> Result<(), PortError> {
        let listeners: Vec<EventListener> = self
            .state()?
            .listeners
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, l)| Arc::clone(l))
            .collect();
        let event = ProviderEvent { kind, payload };
        for listener in listeners {
            listener(&event);
        }
        Ok(())
    }

    fn deterministic_request(&self, method: &str, params: &Value) -> Result<Value, ProviderRpcError> {
        match method {
            "eth_requestAccounts" => {
                let mut g = self.state().map_err(internal)?;
                g.authorized = true;
                Ok(accounts_value(&g.accounts))
            }
            "eth_accounts" => {
                let g = self.state().map_err(internal)?;
                if g.authorized {
                    Ok(accounts_value(&g.accounts))
                } else {
                    Ok(Value::Array(Vec::new()))
                }
            }
            "eth_chainId" => Ok(Value::String(chain_id_to_hex(
                self.state().map_err(internal)?.chain_id,
            ))),
            "wallet_switchEthereumChain" => {
                let chain_id = first_param_chain_id(params)?;
                {
                    let mut g = self.state().map_err(internal)?;
                    if !g.known_chains.contains(&chain_id) {
                        return Err(ProviderRpcError::unrecognized_chain(chain_id));
                    }
                    if g.chain_id == chain_id {
                        return Ok(Value::Null);
                    }
                    g.chain_id = chain_id;
                }
                self.emit(ProviderEventKind::ChainChanged, Value::String(chain_id_to_hex(chain_id)))
                    .map_err(internal)?;
                Ok(Value::Null)
            }
            "wallet_addEthereumChain" => {
                let chain_id = first_param_chain_id(params)?;
                let has_rpc = params
                    .get(0)
                    .and_then(|p| p.get("rpcUrls"))
                    .and_then(Value::as_array)
                    .is_some_and(|urls| !urls.is_empty());
                if !has_rpc {
                    return Err(ProviderRpcError::new(-32602, "rpcUrls must not be empty"));
                }
                // Adding a chain also switches to it.
                let changed = {
                    let mut g = self.state().map_err(internal)?;
                    g.known_chains.insert(chain_id);
                    let changed = g.chain_id != chain_id;
                    g.chain_id = chain_id;
                    changed
                };
                if changed {
                    self.emit(ProviderEventKind::ChainChanged, Value::String(chain_id_to_hex(chain_id)))
                        .map_err(internal)?;
                }
                Ok(Value::Null)
            }
            "wallet_getPermissions" => {
                let g = self.state().map_err(internal)?;
                if g.authorized {
                    Ok(serde_json::json!([{ "parentCapability": "eth_accounts", "caveats": [] }]))
                } else {
                    Ok(Value::Array(Vec::new()))
                }
            }
            "wallet_revokePermissions" => {
                self.state().map_err(internal)?.authorized = false;
                Ok(Value::Null)
            }
            other => Err(ProviderRpcError::new(
                ProviderRpcError::UNSUPPORTED_METHOD,
                format!("method {other} not supported by the deterministic wallet"),
            )),
        }
    }

    async fn proxy_request(
        &self,
        proxy: &ProxyRuntime,
        method: &str,
        params: Value,
    ) -> Result<Value, ProviderRpcError> {
        let id = {
            let mut g = self.state().map_err(internal)?;
            g.request_seq = g.request_seq.saturating_add(1);
            g.request_seq
        };
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let response = proxy
            .client
            .post(&proxy.base_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                ProviderRpcError::new(
                    ProviderRpcError::DISCONNECTED,
                    format!("eip1193 proxy request failed: {e}"),
                )
            })?;
        let status = response.status();
        let body: Value = response.json().await.map_err(|e| {
            ProviderRpcError::internal(format!("eip1193 proxy json decode failed: {e}"))
        })?;
        if let Some(err) = body.get("error") {
            return Err(serde_json::from_value::<ProviderRpcError>(err.clone()).unwrap_or_else(
                |_| ProviderRpcError::internal(format!("eip1193 proxy returned error: {err}")),
            ));
        }
        if !status.is_success() {
            return Err(ProviderRpcError::internal(format!(
                "eip1193 proxy status {status}: {body}"
            )));
        }
        body.get("result")
            .cloned()
            .ok_or_else(|| ProviderRpcError::internal("eip1193 proxy missing result"))
    }
}

#[async_trait(?Send)]
impl ProviderPort for Eip1193Adapter {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderRpcError> {
        if let Err(e) = self.check_mode() {
            return Err(ProviderRpcError::new(ProviderRpcError::DISCONNECTED, e.to_string()));
        }
        let injected = {
            let mut g = self.state().map_err(internal)?;
            g.request_log.push((method.to_owned(), params.clone()));
            g.failures.get_mut(method).and_then(VecDeque::pop_front)
        };
        if let Some(err) = injected {
            tracing::debug!(method, code = err.code, "returning injected provider failure");
            return Err(err);
        }
        match &self.mode {
            ProviderMode::Proxy(proxy) => self.proxy_request(proxy, method, params).await,
            ProviderMode::Deterministic => self.deterministic_request(method, &params),
            ProviderMode::Disabled(reason) => Err(ProviderRpcError::new(
                ProviderRpcError::DISCONNECTED,
                reason.clone(),
            )),
        }
    }

    fn on(&self, kind: ProviderEventKind, listener: EventListener) -> ListenerId {
        let mut g = match self.state() {
            Ok(g) => g,
            Err(e) => {
                tracing::warn!(error = %e, "listener registration dropped");
                return ListenerId(0);
            }
        };
        g.next_listener += 1;
        let id = ListenerId(g.next_listener);
        g.listeners.push((id, kind, listener));
        id
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        let Ok(mut g) = self.state() else {
            return false;
        };
        let before = g.listeners.len();
        g.listeners.retain(|(listener_id, _, _)| *listener_id != id);
        g.listeners.len() != before
    }
}

fn build_client(config: &AdapterConfig) -> Result<reqwest::Client, reqwest::Error> {
    let builder = reqwest::Client::builder();
    #[cfg(not(target_arch = "wasm32"))]
    let builder = builder.timeout(config.http_timeout());
    #[cfg(target_arch = "wasm32")]
    let _ = config;
    builder.build()
}

fn internal(err: PortError) -> ProviderRpcError {
    ProviderRpcError::internal(err.to_string())
}

fn accounts_value(accounts: &[Address]) -> Value {
    Value::Array(
        accounts
            .iter()
            .map(|a| Value::String(a.to_string()))
            .collect(),
    )
}

fn first_param_chain_id(params: &Value) -> Result<u64, ProviderRpcError> {
    params
        .get(0)
        .and_then(|p| p.get("chainId"))
        .and_then(parse_chain_id)
        .ok_or_else(|| ProviderRpcError::new(-32602, format!("invalid chainId param: {params}")))
}
