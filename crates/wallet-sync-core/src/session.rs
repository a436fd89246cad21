use std::sync::Arc;

use crate::domain::{Namespace, PersistedSession};
use crate::ports::{KeyValuePort, PortError};

pub const WALLET_ID_KEY: &str = "WALLET_ID";
pub const WALLET_NAME_KEY: &str = "WALLET_NAME";

/// Last-used connector of one namespace, stored under `WALLET_ID` /
/// `WALLET_NAME`. Advisory only: presence triggers a silent reconnect attempt.
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn KeyValuePort>,
    id_key: String,
    name_key: String,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn KeyValuePort>, namespace: Namespace) -> Self {
        let (id_key, name_key) = match namespace {
            Namespace::Eip155 => (WALLET_ID_KEY.to_owned(), WALLET_NAME_KEY.to_owned()),
            other => (
                format!("{}:{WALLET_ID_KEY}", other.as_str()),
                format!("{}:{WALLET_NAME_KEY}", other.as_str()),
            ),
        };
        Self {
            storage,
            id_key,
            name_key,
        }
    }

    pub fn save(&self, connector_id: &str, display_name: &str) -> Result<(), PortError> {
        self.storage.set_item(&self.id_key, connector_id)?;
        self.storage.set_item(&self.name_key, display_name)
    }

    pub fn load(&self) -> Result<Option<PersistedSession>, PortError> {
        let Some(connector_id) = self.storage.get_item(&self.id_key)? else {
            return Ok(None);
        };
        if connector_id.is_empty() {
            return Ok(None);
        }
        let connector_display_name = self
            .storage
            .get_item(&self.name_key)?
            .filter(|name| !name.is_empty());
        Ok(Some(PersistedSession {
            connector_id,
            connector_display_name,
        }))
    }

    pub fn clear(&self) -> Result<(), PortError> {
        self.storage.remove_item(&self.id_key)?;
        self.storage.remove_item(&self.name_key)
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("id_key", &self.id_key)
            .field("name_key", &self.name_key)
            .finish()
    }
}
