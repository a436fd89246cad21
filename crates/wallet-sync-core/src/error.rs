use thiserror::Error;

use crate::network::SwitchError;
use crate::ports::{PortError, ProviderRpcError};
use crate::state_machine::TransitionError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown connector: {0}")]
    UnknownConnector(String),
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("a connection attempt is already in progress")]
    AlreadyConnecting,
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    #[error("user rejected the request: {0}")]
    UserRejected(String),
    #[error("chain {0} is not supported by the wallet")]
    ChainNotSupported(u64),
    #[error("wallet reports no authorized accounts")]
    Unauthenticated,
    #[error("connection attempt for {0} was superseded")]
    Superseded(String),
    #[error("wallet request failed: {0}")]
    Provider(ProviderRpcError),
    #[error(transparent)]
    Port(#[from] PortError),
}

impl From<TransitionError> for EngineError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::AlreadyConnecting => EngineError::AlreadyConnecting,
            other => EngineError::InvalidTransition(other.to_string()),
        }
    }
}

impl From<SwitchError> for EngineError {
    fn from(err: SwitchError) -> Self {
        match err {
            SwitchError::Rejected(message) => EngineError::UserRejected(message),
            SwitchError::ProviderUnavailable(message) => EngineError::ProviderUnavailable(message),
            SwitchError::ChainNotSupported(chain_id) | SwitchError::NetworkNotConfigured(chain_id) => {
                EngineError::ChainNotSupported(chain_id)
            }
        }
    }
}

impl From<ProviderRpcError> for EngineError {
    fn from(err: ProviderRpcError) -> Self {
        if err.is_user_rejection() {
            EngineError::UserRejected(err.message)
        } else if err.is_disconnection() {
            EngineError::ProviderUnavailable(err.message)
        } else {
            EngineError::Provider(err)
        }
    }
}
