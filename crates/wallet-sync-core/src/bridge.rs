//! Wiring between one live provider and the connection state.
//!
//! The bridge owns at most one [`Subscription`]. Dropping the subscription
//! removes every listener it registered, so teardown happens on every exit
//! path. Callers detach listeners before making the matching state change
//! observable.

use std::sync::Arc;

use alloy::primitives::Address;

use crate::domain::{parse_accounts, parse_chain_id, ProviderEvent, ProviderEventKind};
use crate::ports::{ListenerId, ProviderPort};

/// Receives normalized provider events.
pub trait ProviderEventSink: Send + Sync {
    fn on_disconnect(&self);
    fn on_accounts_changed(&self, accounts: Vec<Address>);
    fn on_chain_changed(&self, chain_id: u64);
}

/// Listener registrations on one provider, released on drop.
pub struct Subscription {
    provider: Arc<dyn ProviderPort>,
    listeners: Vec<ListenerId>,
}

impl Subscription {
    pub fn listener_ids(&self) -> &[ListenerId] {
        &self.listeners
    }

    pub fn is_bound_to(&self, provider: &Arc<dyn ProviderPort>) -> bool {
        Arc::ptr_eq(&self.provider, provider)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        for id in self.listeners.drain(..) {
            self.provider.remove_listener(id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("listeners", &self.listeners)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct ProviderEventBridge {
    subscription: Option<Subscription>,
}

impl ProviderEventBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_bound(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn bound_to(&self, provider: &Arc<dyn ProviderPort>) -> bool {
        self.subscription
            .as_ref()
            .is_some_and(|s| s.is_bound_to(provider))
    }

    /// Binds the three canonical listeners, unbinding any previous provider
    /// first.
    pub fn bind(&mut self, provider: Arc<dyn ProviderPort>, sink: Arc<dyn ProviderEventSink>) {
        self.unbind();
        let listeners = ProviderEventKind::ALL
            .iter()
            .map(|kind| {
                let sink = Arc::clone(&sink);
                provider.on(
                    *kind,
                    Arc::new(move |event: &ProviderEvent| dispatch(sink.as_ref(), event)),
                )
            })
            .collect();
        self.subscription = Some(Subscription {
            provider,
            listeners,
        });
    }

    /// Returns `true` when a provider was bound.
    pub fn unbind(&mut self) -> bool {
        self.subscription.take().is_some()
    }
}

fn dispatch(sink: &dyn ProviderEventSink, event: &ProviderEvent) {
    match event.kind {
        ProviderEventKind::Disconnect => sink.on_disconnect(),
        ProviderEventKind::AccountsChanged => match parse_accounts(&event.payload) {
            Some(accounts) => sink.on_accounts_changed(accounts),
            None => tracing::warn!(payload = %event.payload, "ignoring malformed accountsChanged"),
        },
        ProviderEventKind::ChainChanged => match parse_chain_id(&event.payload) {
            Some(chain_id) => sink.on_chain_changed(chain_id),
            None => tracing::warn!(payload = %event.payload, "ignoring malformed chainChanged"),
        },
    }
}
