//! Per-namespace connection context.
//!
//! Owns the state machine, the event bridge and the active provider handle.
//! Locks are never held across an await; every async step re-checks the
//! attempt epoch before applying its result, so a response that arrives
//! after a disconnect or a newer attempt is discarded.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use alloy::primitives::Address;
use serde_json::Value;

use crate::bridge::{ProviderEventBridge, ProviderEventSink};
use crate::domain::{
    caip_address, parse_accounts, parse_chain_id, AccountProfile, AccountType, AccountView,
    ApprovedNetworks, ConnectedWalletInfo, ConnectionRecord, ConnectionStatus, Connector,
    ConnectorKind, Namespace, NetworkDescriptor,
};
use crate::error::EngineError;
use crate::network::{NetworkSwitcher, SwitchError, SwitchOutcome};
use crate::ports::{
    KeyValuePort, ListenerId, PortError, ProviderHandle, ProviderRpcError, ProviderSourcePort,
};
use crate::profile::AccountProfileSynchronizer;
use crate::registry::ConnectorRegistry;
use crate::session::SessionStore;

pub type RecordObserver = Arc<dyn Fn(&ConnectionRecord) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub namespace: Namespace,
    pub networks: Vec<NetworkDescriptor>,
    pub revoke_permissions_on_disconnect: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            namespace: Namespace::Eip155,
            networks: Vec::new(),
            revoke_permissions_on_disconnect: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Authorization {
    /// `eth_requestAccounts`, may prompt the user.
    Prompt,
    /// `eth_accounts`, never prompts.
    Silent,
}

impl Authorization {
    fn method(self) -> &'static str {
        match self {
            Authorization::Prompt => "eth_requestAccounts",
            Authorization::Silent => "eth_accounts",
        }
    }
}

#[derive(Debug)]
struct ActiveConnection {
    connector: Connector,
    handle: ProviderHandle,
}

impl ActiveConnection {
    /// Kind of `address` as far as this connection can tell. Direct providers
    /// only ever present externally owned accounts.
    fn account_type_of(&self, address: Address) -> AccountType {
        self.handle
            .session()
            .and_then(|session| session.account_type_of(address))
            .unwrap_or(AccountType::Eoa)
    }
}

#[derive(Default)]
struct EngineState {
    machine: crate::state_machine::ConnectionStateMachine,
    bridge: ProviderEventBridge,
    active: Option<Arc<ActiveConnection>>,
    /// Bumped whenever the active connection is replaced or torn down.
    epoch: u64,
    profile: AccountProfile,
    observers: Vec<(ListenerId, RecordObserver)>,
    next_observer: u64,
}

type Notification = (ConnectionRecord, Vec<RecordObserver>);

impl EngineState {
    fn notification(&self) -> Notification {
        (
            self.machine.record().clone(),
            self.observers.iter().map(|(_, o)| Arc::clone(o)).collect(),
        )
    }

    fn is_current(&self, epoch: u64, connector_id: &str) -> bool {
        self.epoch == epoch && self.machine.pending_connector_id() == Some(connector_id)
    }

    /// True while `active` is still the connection established at `epoch`.
    fn is_still_active(&self, epoch: u64, active: &Arc<ActiveConnection>) -> bool {
        self.epoch == epoch
            && self
                .active
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, active))
    }
}

struct EngineInner {
    config: EngineConfig,
    registry: ConnectorRegistry,
    providers: Arc<dyn ProviderSourcePort>,
    session: SessionStore,
    switcher: NetworkSwitcher,
    profile_sync: AccountProfileSynchronizer,
    state: Mutex<EngineState>,
}

/// Connection context of one chain namespace.
#[derive(Clone)]
pub struct ConnectionEngine {
    inner: Arc<EngineInner>,
}

impl ConnectionEngine {
    /// Pass `AccountProfileSynchronizer::new()` when no profile lookups are
    /// wanted; it resolves every profile to empty fields.
    pub fn new(
        config: EngineConfig,
        registry: ConnectorRegistry,
        providers: Arc<dyn ProviderSourcePort>,
        storage: Arc<dyn KeyValuePort>,
        profile_sync: AccountProfileSynchronizer,
    ) -> Self {
        let session = SessionStore::new(storage, config.namespace);
        Self {
            inner: Arc::new(EngineInner {
                config,
                registry,
                providers,
                session,
                switcher: NetworkSwitcher,
                profile_sync,
                state: Mutex::new(EngineState::default()),
            }),
        }
    }

    pub fn namespace(&self) -> Namespace {
        self.inner.config.namespace
    }

    pub fn registry(&self) -> &ConnectorRegistry {
        &self.inner.registry
    }

    pub fn session(&self) -> &SessionStore {
        &self.inner.session
    }

    pub fn networks(&self) -> &[NetworkDescriptor] {
        &self.inner.config.networks
    }

    pub fn network(&self, chain_id: u64) -> Option<&NetworkDescriptor> {
        self.inner
            .config
            .networks
            .iter()
            .find(|n| n.chain_id == chain_id)
    }

    pub fn connection_record(&self) -> ConnectionRecord {
        self.inner.lock().machine.record().clone()
    }

    pub fn profile(&self) -> AccountProfile {
        self.inner.lock().profile.clone()
    }

    pub fn active_connector(&self) -> Option<Connector> {
        self.inner
            .lock()
            .active
            .as_ref()
            .map(|a| a.connector.clone())
    }

    /// Address and chain for message construction by the sign-in layer.
    pub fn account_view(&self) -> Option<AccountView> {
        let record = self.connection_record();
        match (record.status, record.address, record.chain_id) {
            (ConnectionStatus::Connected, Some(address), Some(chain_id)) => {
                Some(AccountView { address, chain_id })
            }
            _ => None,
        }
    }

    /// Wallet name and icon of the active connection: the relay peer's
    /// metadata when the session carries it, else the connector's own.
    pub fn connected_wallet_info(&self) -> Option<ConnectedWalletInfo> {
        let active = self.inner.lock().active.clone()?;
        let info = active
            .handle
            .session()
            .and_then(|session| session.peer_info())
            .unwrap_or_else(|| ConnectedWalletInfo {
                name: active.connector.display_name.clone(),
                icon: active.connector.metadata.image_url.clone(),
            });
        Some(info)
    }

    pub fn caip_address(&self) -> Option<String> {
        self.account_view()
            .map(|view| caip_address(self.namespace(), view.chain_id, view.address))
    }

    pub fn address_explorer_url(&self) -> Option<String> {
        let view = self.account_view()?;
        let explorer = self.network(view.chain_id)?.explorer_url.as_deref()?;
        Some(format!(
            "{}/address/{}",
            explorer.trim_end_matches('/'),
            view.address
        ))
    }

    pub fn approved_networks(&self) -> ApprovedNetworks {
        let g = self.inner.lock();
        match g.active.as_deref() {
            Some(active) if active.connector.kind == ConnectorKind::Relay => active
                .handle
                .session()
                .map(|s| s.approved_networks())
                .unwrap_or_else(ApprovedNetworks::all),
            _ => ApprovedNetworks::all(),
        }
    }

    pub fn subscribe(&self, observer: RecordObserver) -> ListenerId {
        let mut g = self.inner.lock();
        g.next_observer += 1;
        let id = ListenerId(g.next_observer);
        g.observers.push((id, observer));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut g = self.inner.lock();
        let before = g.observers.len();
        g.observers.retain(|(observer_id, _)| *observer_id != id);
        g.observers.len() != before
    }

    /// Connects through `connector_id`, prompting the wallet for authorization.
    ///
    /// Returns as soon as the record is `Connected`; profile lookups are left
    /// to [`ConnectionEngine::refresh_profile`].
    pub async fn connect(&self, connector_id: &str) -> Result<ConnectionRecord, EngineError> {
        let connector = self
            .inner
            .registry
            .find(connector_id)
            .ok_or_else(|| EngineError::UnknownConnector(connector_id.to_owned()))?;
        self.inner.attempt(connector, Authorization::Prompt).await
    }

    /// Restores the persisted connection without prompting.
    ///
    /// Returns `Ok(None)` when nothing was persisted. A persisted connector
    /// that is not registered (yet) keeps the session and reports
    /// `ProviderUnavailable`. An empty account list clears the session.
    pub async fn reconnect(&self) -> Result<Option<ConnectionRecord>, EngineError> {
        let Some(persisted) = self.inner.session.load()? else {
            return Ok(None);
        };
        let registry = &self.inner.registry;
        let connector = registry.find(&persisted.connector_id).or_else(|| {
            persisted
                .connector_display_name
                .as_deref()
                .and_then(|name| registry.find_by_name(name))
        });
        let Some(connector) = connector else {
            tracing::info!(connector = %persisted.connector_id, "persisted connector not registered");
            return Err(EngineError::ProviderUnavailable(persisted.connector_id));
        };

        match self.inner.attempt(connector, Authorization::Silent).await {
            Ok(record) => Ok(Some(record)),
            Err(EngineError::Unauthenticated) => {
                if let Err(e) = self.inner.session.clear() {
                    tracing::warn!(error = %e, "failed to clear stale session");
                }
                Err(EngineError::Unauthenticated)
            }
            Err(e) => Err(e),
        }
    }

    /// Tears the connection down. Always succeeds; wallet-side cleanup
    /// failures are logged.
    pub async fn disconnect(&self) {
        let (previous, notification) = {
            let mut g = self.inner.lock();
            let previous = g.active.take();
            g.bridge.unbind();
            let changed = g.machine.status() != ConnectionStatus::Disconnected
                || !g.machine.record().is_cleared();
            g.epoch += 1;
            if let Err(e) = self.inner.session.clear() {
                tracing::warn!(error = %e, "failed to clear persisted session");
            }
            g.machine.reset();
            g.profile = AccountProfile::default();
            (previous, changed.then(|| g.notification()))
        };
        if let Some(notification) = notification {
            tracing::info!("disconnected");
            notify(notification);
        }
        if let Some(active) = previous {
            self.inner.release_wallet(&active).await;
        }
    }

    pub async fn switch_network_by_id(&self, chain_id: u64) -> Result<(), SwitchError> {
        let target = self
            .network(chain_id)
            .cloned()
            .ok_or(SwitchError::NetworkNotConfigured(chain_id))?;
        self.switch_network(&target).await
    }

    /// Moves the wallet to `target` without changing the active connector.
    /// On failure the record's chain id is left untouched.
    pub async fn switch_network(&self, target: &NetworkDescriptor) -> Result<(), SwitchError> {
        let (active, current_chain, epoch) = {
            let g = self.inner.lock();
            let active = g.active.clone().ok_or_else(|| {
                SwitchError::ProviderUnavailable("no active connection".to_owned())
            })?;
            (active, g.machine.record().chain_id, g.epoch)
        };

        let outcome = self
            .inner
            .switcher
            .switch_network(active.connector.kind, &active.handle, current_chain, target)
            .await?;
        if outcome == SwitchOutcome::AlreadyActive {
            return Ok(());
        }

        let notification = {
            let mut g = self.inner.lock();
            if !g.is_still_active(epoch, &active) {
                tracing::warn!(chain_id = target.chain_id, "discarding switch result for replaced connection");
                return Err(SwitchError::ProviderUnavailable(
                    "connection changed during network switch".to_owned(),
                ));
            }
            let unavailable = |e: crate::state_machine::TransitionError| {
                SwitchError::ProviderUnavailable(e.to_string())
            };
            g.machine
                .apply_chain_changed(target.chain_id)
                .map_err(unavailable)?;
            g.profile.balance = None;
            if let SwitchOutcome::SwitchedWithAccount(account) = &outcome {
                if g.machine.record().address != Some(account.address) {
                    g.profile = AccountProfile::default();
                }
                g.machine
                    .apply_accounts_changed(&[account.address])
                    .map_err(unavailable)?;
                g.machine
                    .apply_account_type(account.account_type)
                    .map_err(unavailable)?;
            }
            g.notification()
        };
        tracing::info!(chain_id = target.chain_id, ?outcome, "network switched");
        notify(notification);
        Ok(())
    }

    /// Asks an embedded-auth session to present its owner key or its smart
    /// account on the current chain, and applies the account it reports.
    pub async fn set_preferred_account_type(
        &self,
        account_type: AccountType,
    ) -> Result<ConnectionRecord, EngineError> {
        let (active, chain_id, epoch) = {
            let g = self.inner.lock();
            let active = g.active.clone().ok_or_else(|| {
                EngineError::ProviderUnavailable("no active connection".to_owned())
            })?;
            let chain_id = g.machine.record().chain_id.ok_or_else(|| {
                EngineError::InvalidTransition("connected record has no chain".to_owned())
            })?;
            (active, chain_id, g.epoch)
        };
        let Some(session) = active.handle.session().cloned() else {
            return Err(EngineError::Provider(ProviderRpcError::new(
                ProviderRpcError::UNSUPPORTED_METHOD,
                format!("connector {} has no account type preference", active.connector.id),
            )));
        };

        let account = session
            .set_preferred_account_type(account_type, chain_id)
            .await?;

        let notification = {
            let mut g = self.inner.lock();
            if !g.is_still_active(epoch, &active) {
                tracing::warn!(?account_type, "discarding account type change for replaced connection");
                return Err(EngineError::Superseded(active.connector.id.clone()));
            }
            if g.machine.record().address != Some(account.address) {
                g.profile = AccountProfile::default();
            }
            g.machine.apply_accounts_changed(&[account.address])?;
            g.machine.apply_account_type(account.account_type)?;
            g.notification()
        };
        tracing::info!(address = %account.address, account_type = ?account.account_type, "account type changed");
        let record = notification.0.clone();
        notify(notification);
        Ok(record)
    }

    /// Re-runs the profile synchronizer for the connected address.
    pub async fn refresh_profile(&self) {
        let Some((address, chain_id, epoch)) = self.inner.connected_snapshot() else {
            return;
        };
        let network = self.network(chain_id);
        let profile = self
            .inner
            .profile_sync
            .sync_profile(address, chain_id, network)
            .await;
        self.inner.store_profile(address, epoch, |current| *current = profile);
    }

    /// Re-reads the native balance on the active network, e.g. after a switch.
    pub async fn refresh_balance(&self) {
        let Some((address, chain_id, epoch)) = self.inner.connected_snapshot() else {
            return;
        };
        let balance = match self.network(chain_id) {
            Some(network) => self.inner.profile_sync.sync_balance(address, network).await,
            None => None,
        };
        self.inner
            .store_profile(address, epoch, |current| current.balance = balance);
    }
}

impl std::fmt::Debug for ConnectionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionEngine")
            .field("namespace", &self.inner.config.namespace)
            .field("record", &self.connection_record())
            .finish()
    }
}

impl EngineInner {
    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn connected_snapshot(&self) -> Option<(Address, u64, u64)> {
        let g = self.lock();
        let record = g.machine.record();
        match (record.status, record.address, record.chain_id) {
            (ConnectionStatus::Connected, Some(address), Some(chain_id)) => {
                Some((address, chain_id, g.epoch))
            }
            _ => None,
        }
    }

    fn store_profile(&self, address: Address, epoch: u64, apply: impl FnOnce(&mut AccountProfile)) {
        let mut g = self.lock();
        if g.epoch == epoch && g.machine.record().address == Some(address) {
            apply(&mut g.profile);
        } else {
            tracing::debug!(%address, "discarding profile for a replaced account");
        }
    }

    async fn attempt(
        self: &Arc<Self>,
        connector: Connector,
        authorization: Authorization,
    ) -> Result<ConnectionRecord, EngineError> {
        let (epoch, replaced, notification) = {
            let mut g = self.lock();
            g.machine.begin_connect(&connector.id)?;
            g.bridge.unbind();
            let replaced = g
                .active
                .take()
                .filter(|previous| previous.connector.id != connector.id);
            if replaced.is_some() {
                if let Err(e) = self.session.clear() {
                    tracing::warn!(error = %e, "failed to clear replaced session");
                }
            }
            g.epoch += 1;
            g.profile = AccountProfile::default();
            (g.epoch, replaced, g.notification())
        };
        tracing::debug!(connector = %connector.id, ?authorization, "connecting");
        notify(notification);
        if let Some(previous) = replaced {
            tracing::info!(previous = %previous.connector.id, next = %connector.id, "replacing connection");
            self.release_wallet(&previous).await;
        }

        let connector_id = connector.id.clone();
        match self.establish(connector, epoch, authorization).await {
            Ok(record) => {
                tracing::info!(connector = %connector_id, address = ?record.address, chain_id = ?record.chain_id, "connected");
                Ok(record)
            }
            Err(e) => {
                tracing::info!(connector = %connector_id, error = %e, "connection attempt failed");
                self.abandon(epoch, &connector_id);
                Err(e)
            }
        }
    }

    async fn establish(
        self: &Arc<Self>,
        connector: Connector,
        epoch: u64,
        authorization: Authorization,
    ) -> Result<ConnectionRecord, EngineError> {
        let handle = self
            .providers
            .acquire(&connector)
            .await
            .map_err(|e| match e {
                PortError::NotFound(message) | PortError::Policy(message) => {
                    EngineError::ProviderUnavailable(message)
                }
                other => EngineError::ProviderUnavailable(other.to_string()),
            })?;
        self.ensure_current(epoch, &connector.id)?;

        let provider = Arc::clone(handle.provider());
        let accounts_value = provider
            .request(authorization.method(), Value::Array(Vec::new()))
            .await?;
        self.ensure_current(epoch, &connector.id)?;
        let accounts = parse_accounts(&accounts_value).ok_or_else(|| {
            PortError::Validation(format!(
                "{} returned a malformed account list",
                authorization.method()
            ))
        })?;
        let Some(address) = accounts.first().copied() else {
            return Err(EngineError::Unauthenticated);
        };

        let chain_value = provider
            .request("eth_chainId", Value::Array(Vec::new()))
            .await?;
        self.ensure_current(epoch, &connector.id)?;
        let chain_id = parse_chain_id(&chain_value)
            .ok_or_else(|| PortError::Validation(format!("invalid chain id: {chain_value}")))?;

        let notification = {
            let mut g = self.lock();
            if !g.is_current(epoch, &connector.id) {
                return Err(EngineError::Superseded(connector.id));
            }
            g.machine
                .complete_connect(address, chain_id, handle.account_type(), accounts)?;
            let sink: Arc<dyn ProviderEventSink> = Arc::new(EngineEventSink {
                engine: Arc::downgrade(self),
                epoch,
            });
            g.bridge.bind(Arc::clone(&provider), sink);
            if let Err(e) = self.session.save(&connector.id, &connector.display_name) {
                tracing::warn!(connector = %connector.id, error = %e, "failed to persist session");
            }
            g.active = Some(Arc::new(ActiveConnection { connector, handle }));
            g.notification()
        };
        let record = notification.0.clone();
        notify(notification);
        Ok(record)
    }

    fn ensure_current(&self, epoch: u64, connector_id: &str) -> Result<(), EngineError> {
        if self.lock().is_current(epoch, connector_id) {
            Ok(())
        } else {
            tracing::warn!(connector = %connector_id, "discarding late provider response");
            Err(EngineError::Superseded(connector_id.to_owned()))
        }
    }

    /// Returns a failed attempt to `Disconnected` unless it was already
    /// replaced.
    fn abandon(&self, epoch: u64, connector_id: &str) {
        let notification = {
            let mut g = self.lock();
            if !g.is_current(epoch, connector_id) {
                return;
            }
            g.machine.reset();
            g.notification()
        };
        notify(notification);
    }

    async fn release_wallet(&self, active: &ActiveConnection) {
        match active.connector.kind {
            ConnectorKind::Relay | ConnectorKind::EmbeddedAuth => {
                let Some(session) = active.handle.session() else {
                    return;
                };
                if let Err(e) = session.disconnect().await {
                    tracing::warn!(connector = %active.connector.id, error = %e, "remote session disconnect failed");
                }
            }
            ConnectorKind::Injected | ConnectorKind::Announced | ConnectorKind::HostedSdk => {
                if self.config.revoke_permissions_on_disconnect {
                    revoke_permissions(&active.handle, &active.connector.id).await;
                }
            }
        }
    }

    fn handle_disconnect(&self, epoch: u64) {
        let notification = {
            let mut g = self.lock();
            if g.epoch != epoch || g.active.is_none() {
                return;
            }
            if let Err(e) = self.session.clear() {
                tracing::warn!(error = %e, "failed to clear persisted session");
            }
            g.bridge.unbind();
            g.active = None;
            g.epoch += 1;
            g.machine.reset();
            g.profile = AccountProfile::default();
            g.notification()
        };
        tracing::info!("provider disconnected");
        notify(notification);
    }

    fn handle_accounts_changed(&self, epoch: u64, accounts: Vec<Address>) {
        let notification = {
            let mut g = self.lock();
            if g.epoch != epoch || g.active.is_none() {
                return;
            }
            if accounts.is_empty() {
                if let Err(e) = self.session.clear() {
                    tracing::warn!(error = %e, "failed to clear persisted session");
                }
                g.bridge.unbind();
                g.active = None;
                g.epoch += 1;
                g.profile = AccountProfile::default();
            }
            let replaced_account = accounts
                .first()
                .copied()
                .filter(|first| g.machine.record().address != Some(*first));
            if replaced_account.is_some() {
                g.profile = AccountProfile::default();
            }
            if let Err(e) = g.machine.apply_accounts_changed(&accounts) {
                tracing::warn!(error = %e, "ignoring accountsChanged");
                return;
            }
            let account_type = replaced_account
                .zip(g.active.clone())
                .map(|(address, active)| active.account_type_of(address));
            if let Some(account_type) = account_type {
                if let Err(e) = g.machine.apply_account_type(account_type) {
                    tracing::warn!(error = %e, "ignoring account type of new account");
                }
            }
            g.notification()
        };
        tracing::debug!(accounts = accounts.len(), "accounts changed");
        notify(notification);
    }

    fn handle_chain_changed(&self, epoch: u64, chain_id: u64) {
        let notification = {
            let mut g = self.lock();
            if g.epoch != epoch || g.machine.record().chain_id == Some(chain_id) {
                return;
            }
            if let Err(e) = g.machine.apply_chain_changed(chain_id) {
                tracing::warn!(error = %e, "ignoring chainChanged");
                return;
            }
            g.notification()
        };
        tracing::debug!(chain_id, "chain changed");
        notify(notification);
    }
}

struct EngineEventSink {
    engine: Weak<EngineInner>,
    epoch: u64,
}

impl ProviderEventSink for EngineEventSink {
    fn on_disconnect(&self) {
        if let Some(engine) = self.engine.upgrade() {
            engine.handle_disconnect(self.epoch);
        }
    }

    fn on_accounts_changed(&self, accounts: Vec<Address>) {
        if let Some(engine) = self.engine.upgrade() {
            engine.handle_accounts_changed(self.epoch, accounts);
        }
    }

    fn on_chain_changed(&self, chain_id: u64) {
        if let Some(engine) = self.engine.upgrade() {
            engine.handle_chain_changed(self.epoch, chain_id);
        }
    }
}

async fn revoke_permissions(handle: &ProviderHandle, connector_id: &str) {
    let provider = handle.provider();
    let permissions = match provider
        .request("wallet_getPermissions", Value::Array(Vec::new()))
        .await
    {
        Ok(permissions) => permissions,
        Err(e) => {
            tracing::info!(connector = %connector_id, error = %e, "could not read wallet permissions");
            return;
        }
    };
    let has_accounts_permission = permissions.as_array().is_some_and(|items| {
        items.iter().any(|p| {
            p.get("parentCapability").and_then(Value::as_str) == Some("eth_accounts")
        })
    });
    if !has_accounts_permission {
        return;
    }
    if let Err(e) = provider
        .request(
            "wallet_revokePermissions",
            serde_json::json!([{ "eth_accounts": {} }]),
        )
        .await
    {
        tracing::info!(connector = %connector_id, error = %e, "could not revoke wallet permissions");
    }
}

fn notify((record, observers): Notification) {
    for observer in observers {
        observer(&record);
    }
}
