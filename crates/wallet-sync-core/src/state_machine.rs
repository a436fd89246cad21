use alloy::primitives::Address;
use thiserror::Error;

use crate::domain::{AccountType, ConnectionRecord, ConnectionStatus};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("a connection attempt is already in progress")]
    AlreadyConnecting,
    #[error("illegal connection transition: {action} from {from:?}")]
    InvalidTransition {
        from: ConnectionStatus,
        action: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    pub from: ConnectionStatus,
    pub to: ConnectionStatus,
    pub reason: &'static str,
}

/// Owns the connection record of one namespace. Every mutation of the record
/// goes through these methods.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStateMachine {
    record: ConnectionRecord,
    pending_connector_id: Option<String>,
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self) -> &ConnectionRecord {
        &self.record
    }

    pub fn status(&self) -> ConnectionStatus {
        self.record.status
    }

    /// Connector targeted by the attempt in flight, if any.
    pub fn pending_connector_id(&self) -> Option<&str> {
        self.pending_connector_id.as_deref()
    }

    pub fn begin_connect(&mut self, connector_id: &str) -> Result<StateTransition, TransitionError> {
        let from = self.record.status;
        if from == ConnectionStatus::Connecting {
            return Err(TransitionError::AlreadyConnecting);
        }
        self.record = ConnectionRecord {
            status: ConnectionStatus::Connecting,
            ..ConnectionRecord::default()
        };
        self.pending_connector_id = Some(connector_id.to_owned());
        Ok(StateTransition {
            from,
            to: ConnectionStatus::Connecting,
            reason: "begin_connect",
        })
    }

    pub fn complete_connect(
        &mut self,
        address: Address,
        chain_id: u64,
        account_type: AccountType,
        all_accounts: Vec<Address>,
    ) -> Result<StateTransition, TransitionError> {
        let from = self.record.status;
        let connector_id = match (from, self.pending_connector_id.take()) {
            (ConnectionStatus::Connecting, Some(id)) => id,
            (_, pending) => {
                self.pending_connector_id = pending;
                return Err(TransitionError::InvalidTransition {
                    from,
                    action: "complete_connect",
                });
            }
        };
        let all_accounts = if all_accounts.is_empty() {
            vec![address]
        } else {
            all_accounts
        };
        self.record = ConnectionRecord {
            status: ConnectionStatus::Connected,
            address: Some(address),
            chain_id: Some(chain_id),
            account_type: Some(account_type),
            all_accounts,
            active_connector_id: Some(connector_id),
        };
        Ok(StateTransition {
            from,
            to: ConnectionStatus::Connected,
            reason: "complete_connect",
        })
    }

    /// An empty list is a wallet-side lock or disconnect and resets the record.
    pub fn apply_accounts_changed(
        &mut self,
        accounts: &[Address],
    ) -> Result<StateTransition, TransitionError> {
        let from = self.record.status;
        let Some(first) = accounts.first().copied() else {
            return Ok(self.reset());
        };
        if from != ConnectionStatus::Connected {
            return Err(TransitionError::InvalidTransition {
                from,
                action: "apply_accounts_changed",
            });
        }
        self.record.address = Some(first);
        self.record.all_accounts = accounts.to_vec();
        Ok(StateTransition {
            from,
            to: ConnectionStatus::Connected,
            reason: "accounts_changed",
        })
    }

    pub fn apply_account_type(&mut self, account_type: AccountType) -> Result<(), TransitionError> {
        if self.record.status != ConnectionStatus::Connected {
            return Err(TransitionError::InvalidTransition {
                from: self.record.status,
                action: "apply_account_type",
            });
        }
        self.record.account_type = Some(account_type);
        Ok(())
    }

    pub fn apply_chain_changed(&mut self, chain_id: u64) -> Result<StateTransition, TransitionError> {
        let from = self.record.status;
        if from != ConnectionStatus::Connected {
            return Err(TransitionError::InvalidTransition {
                from,
                action: "apply_chain_changed",
            });
        }
        self.record.chain_id = Some(chain_id);
        Ok(StateTransition {
            from,
            to: from,
            reason: "chain_changed",
        })
    }

    pub fn reset(&mut self) -> StateTransition {
        let from = self.record.status;
        self.record = ConnectionRecord::default();
        self.pending_connector_id = None;
        StateTransition {
            from,
            to: ConnectionStatus::Disconnected,
            reason: "reset",
        }
    }
}
