use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::domain::{Connector, ConnectorKind};
use crate::ports::{Announcement, DiscoveryPort, ListenerId, ProviderPort};

pub type ConnectorObserver = Arc<dyn Fn(&Connector) + Send + Sync>;

/// Live, append-only catalogue of connection methods.
#[derive(Clone, Default)]
pub struct ConnectorRegistry {
    inner: Arc<Mutex<RegistryState>>,
}

#[derive(Default)]
struct RegistryState {
    connectors: Vec<Connector>,
    announced_providers: HashMap<String, Arc<dyn ProviderPort>>,
    observers: Vec<(ListenerId, ConnectorObserver)>,
    next_observer: u64,
    discovery: Option<ListenerId>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns `false` when an equivalent connector is already present.
    pub fn register(&self, connector: Connector) -> bool {
        let observers = {
            let mut g = self.state();
            if let Some(existing) = g.connectors.iter().find(|c| duplicates(c, &connector)) {
                tracing::debug!(
                    connector = %connector.id,
                    existing = %existing.id,
                    "connector registration skipped"
                );
                return false;
            }
            tracing::debug!(connector = %connector.id, kind = ?connector.kind, "connector registered");
            g.connectors.push(connector.clone());
            g.observers
                .iter()
                .map(|(_, observer)| Arc::clone(observer))
                .collect::<Vec<_>>()
        };
        for observer in observers {
            observer(&connector);
        }
        true
    }

    fn register_announcement(&self, announcement: &Announcement) -> bool {
        let connector = Connector::announced(&announcement.info);
        let id = connector.id.clone();
        if !self.register(connector) {
            return false;
        }
        self.state()
            .announced_providers
            .insert(id, Arc::clone(&announcement.provider));
        true
    }

    pub fn list(&self) -> Vec<Connector> {
        self.state().connectors.clone()
    }

    pub fn len(&self) -> usize {
        self.state().connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find(&self, id: &str) -> Option<Connector> {
        self.state().connectors.iter().find(|c| c.id == id).cloned()
    }

    pub fn find_by_name(&self, display_name: &str) -> Option<Connector> {
        let wanted = normalized_name(display_name);
        self.state()
            .connectors
            .iter()
            .find(|c| normalized_name(&c.display_name) == wanted)
            .cloned()
    }

    /// Provider handle delivered with a wallet's announcement.
    pub fn announced_provider(&self, connector_id: &str) -> Option<Arc<dyn ProviderPort>> {
        self.state().announced_providers.get(connector_id).cloned()
    }

    pub fn subscribe(&self, observer: ConnectorObserver) -> ListenerId {
        let mut g = self.state();
        g.next_observer += 1;
        let id = ListenerId(g.next_observer);
        g.observers.push((id, observer));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut g = self.state();
        let before = g.observers.len();
        g.observers.retain(|(observer_id, _)| *observer_id != id);
        g.observers.len() != before
    }

    /// Subscribes to wallet announcements. Only the first call subscribes;
    /// later calls return `false`.
    pub fn listen(&self, discovery: &dyn DiscoveryPort) -> bool {
        if self.state().discovery.is_some() {
            return false;
        }
        let registry = self.clone();
        let id = discovery.subscribe(Arc::new(move |announcement: &Announcement| {
            registry.register_announcement(announcement);
        }));
        self.state().discovery = Some(id);
        discovery.request_announcements();
        true
    }

    /// Drops every connector and announced handle. Observers and the
    /// discovery subscription stay in place.
    pub fn reset(&self) {
        let mut g = self.state();
        g.connectors.clear();
        g.announced_providers.clear();
    }
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorRegistry")
            .field("connectors", &self.list())
            .finish()
    }
}

fn duplicates(existing: &Connector, candidate: &Connector) -> bool {
    if existing.id == candidate.id {
        return true;
    }
    if candidate.kind == ConnectorKind::Announced && existing.kind == ConnectorKind::HostedSdk {
        if let (Some(a), Some(b)) = (&candidate.metadata.rdns, &existing.metadata.rdns) {
            if a.eq_ignore_ascii_case(b) {
                return true;
            }
        }
    }
    existing.kind == candidate.kind
        && normalized_name(&existing.display_name) == normalized_name(&candidate.display_name)
}

pub(crate) fn normalized_name(name: &str) -> String {
    let trimmed = name.trim();
    match trimmed {
        "Trust Wallet" => "Trust".to_owned(),
        other => other.to_owned(),
    }
}
