use std::sync::Arc;

use async_trait::async_trait;

use wallet_sync_core::{
    Connector, ConnectorKind, ConnectorRegistry, PortError, ProviderHandle, ProviderPort,
    ProviderSourcePort, RemoteSessionPort,
};

use crate::{EmbeddedAuthAdapter, RelaySessionAdapter};

/// Hands out the live provider behind each connector kind. Announced wallets
/// come from the registry, which kept the handle delivered with the
/// announcement.
#[derive(Clone)]
pub struct ProviderDirectory {
    registry: ConnectorRegistry,
    injected: Option<Arc<dyn ProviderPort>>,
    hosted_sdk: Option<Arc<dyn ProviderPort>>,
    relay: Option<RelaySessionAdapter>,
    embedded: Option<EmbeddedAuthAdapter>,
}

impl ProviderDirectory {
    pub fn new(registry: ConnectorRegistry) -> Self {
        Self {
            registry,
            injected: None,
            hosted_sdk: None,
            relay: None,
            embedded: None,
        }
    }

    pub fn with_injected(mut self, provider: Arc<dyn ProviderPort>) -> Self {
        self.injected = Some(provider);
        self
    }

    pub fn with_hosted_sdk(mut self, provider: Arc<dyn ProviderPort>) -> Self {
        self.hosted_sdk = Some(provider);
        self
    }

    pub fn with_relay(mut self, relay: RelaySessionAdapter) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn with_embedded(mut self, embedded: EmbeddedAuthAdapter) -> Self {
        self.embedded = Some(embedded);
        self
    }
}

impl std::fmt::Debug for ProviderDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderDirectory")
            .field("injected", &self.injected.is_some())
            .field("hosted_sdk", &self.hosted_sdk.is_some())
            .field("relay", &self.relay.is_some())
            .field("embedded", &self.embedded.is_some())
            .finish()
    }
}

#[async_trait(?Send)]
impl ProviderSourcePort for ProviderDirectory {
    async fn acquire(&self, connector: &Connector) -> Result<ProviderHandle, PortError> {
        let missing = || PortError::NotFound(format!("no provider for connector {}", connector.id));
        match connector.kind {
            ConnectorKind::Injected => self
                .injected
                .clone()
                .map(ProviderHandle::direct)
                .ok_or_else(missing),
            ConnectorKind::HostedSdk => self
                .hosted_sdk
                .clone()
                .map(ProviderHandle::direct)
                .ok_or_else(missing),
            ConnectorKind::Announced => self
                .registry
                .announced_provider(&connector.id)
                .map(ProviderHandle::direct)
                .ok_or_else(missing),
            ConnectorKind::Relay => {
                let relay = self.relay.clone().ok_or_else(missing)?;
                let provider: Arc<dyn ProviderPort> = Arc::new(relay.wallet().clone());
                let session: Arc<dyn RemoteSessionPort> = Arc::new(relay);
                Ok(ProviderHandle::with_session(provider, session))
            }
            ConnectorKind::EmbeddedAuth => {
                let embedded = self.embedded.clone().ok_or_else(missing)?;
                let account_type = embedded.current_account_type();
                let provider: Arc<dyn ProviderPort> = Arc::new(embedded.clone());
                let session: Arc<dyn RemoteSessionPort> = Arc::new(embedded);
                Ok(ProviderHandle::with_session(provider, session).with_account_type(account_type))
            }
        }
    }
}
