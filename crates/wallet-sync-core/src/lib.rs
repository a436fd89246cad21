pub mod bridge;
pub mod domain;
pub mod engine;
pub mod error;
pub mod network;
pub mod ports;
pub mod profile;
pub mod registry;
pub mod session;
pub mod state_machine;

pub use bridge::{ProviderEventBridge, ProviderEventSink, Subscription};
pub use domain::{
    AccountProfile, AccountType, AccountView, AnnouncedWalletInfo, ApprovedNetworks, Balance,
    ConnectedWalletInfo, ConnectionRecord, ConnectionStatus, Connector, ConnectorKind, Namespace,
    NetworkDescriptor, PersistedSession, ProviderEvent, ProviderEventKind,
};
pub use engine::{ConnectionEngine, EngineConfig, RecordObserver};
pub use error::EngineError;
pub use network::{NetworkSwitcher, SwitchError, SwitchOutcome};
pub use ports::{
    Announcement, BalancePort, DiscoveryPort, IdentityPort, KeyValuePort, ListenerId,
    NameServicePort, PortError, ProviderHandle, ProviderPort, ProviderRpcError,
    ProviderSourcePort, RemoteAccount, RemoteSessionPort,
};
pub use profile::AccountProfileSynchronizer;
pub use registry::ConnectorRegistry;
pub use session::SessionStore;
pub use state_machine::{ConnectionStateMachine, StateTransition, TransitionError};
