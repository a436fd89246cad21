use std::sync::{Arc, Mutex, MutexGuard};

use wallet_sync_core::ports::AnnouncementListener;
use wallet_sync_core::{Announcement, DiscoveryPort, ListenerId, PortError};

/// In-process announcement bus: wallets call [`announce`], subscribers hear
/// every announcement, and a request signal makes present wallets announce
/// again.
///
/// [`announce`]: AnnouncementChannel::announce
#[derive(Debug, Clone, Default)]
pub struct AnnouncementChannel {
    inner: Arc<Mutex<ChannelState>>,
}

#[derive(Default)]
struct ChannelState {
    present: Vec<Announcement>,
    listeners: Vec<(ListenerId, AnnouncementListener)>,
    next_listener: u64,
    requests: u64,
}

impl std::fmt::Debug for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelState")
            .field("present", &self.present)
            .field("listeners", &self.listeners.len())
            .field("requests", &self.requests)
            .finish()
    }
}

impl AnnouncementChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, ChannelState>, PortError> {
        self.inner
            .lock()
            .map_err(|e| PortError::Transport(format!("discovery lock poisoned: {e}")))
    }

    /// A wallet announces itself. It stays present for later requests.
    pub fn announce(&self, announcement: Announcement) -> Result<(), PortError> {
        let listeners = {
            let mut g = self.state()?;
            g.present
                .retain(|existing| existing.info.uuid != announcement.info.uuid);
            g.present.push(announcement.clone());
            g.listeners
                .iter()
                .map(|(_, l)| Arc::clone(l))
                .collect::<Vec<_>>()
        };
        tracing::debug!(wallet = %announcement.info.name, "wallet announced");
        for listener in listeners {
            listener(&announcement);
        }
        Ok(())
    }

    pub fn unsubscribe(&self, id: ListenerId) -> Result<bool, PortError> {
        let mut g = self.state()?;
        let before = g.listeners.len();
        g.listeners.retain(|(listener_id, _)| *listener_id != id);
        Ok(g.listeners.len() != before)
    }

    pub fn listener_count(&self) -> Result<usize, PortError> {
        Ok(self.state()?.listeners.len())
    }

    pub fn request_count(&self) -> Result<u64, PortError> {
        Ok(self.state()?.requests)
    }
}

impl DiscoveryPort for AnnouncementChannel {
    fn subscribe(&self, listener: AnnouncementListener) -> ListenerId {
        let mut g = match self.state() {
            Ok(g) => g,
            Err(e) => {
                tracing::warn!(error = %e, "discovery subscription dropped");
                return ListenerId(0);
            }
        };
        g.next_listener += 1;
        let id = ListenerId(g.next_listener);
        g.listeners.push((id, listener));
        id
    }

    fn request_announcements(&self) {
        let (present, listeners) = match self.state() {
            Ok(mut g) => {
                g.requests += 1;
                (
                    g.present.clone(),
                    g.listeners
                        .iter()
                        .map(|(_, l)| Arc::clone(l))
                        .collect::<Vec<_>>(),
                )
            }
            Err(e) => {
                tracing::warn!(error = %e, "announcement request dropped");
                return;
            }
        };
        for announcement in &present {
            for listener in &listeners {
                listener(announcement);
            }
        }
    }
}
