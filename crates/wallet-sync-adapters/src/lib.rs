pub mod balance;
pub mod config;
pub mod directory;
pub mod discovery;
pub mod eip1193;
pub mod embedded;
pub mod identity;
pub mod name_service;
pub mod rpc;
pub mod storage;
pub mod wc;

pub use balance::RpcBalanceReader;
pub use config::{AdapterConfig, RuntimeProfile};
pub use directory::ProviderDirectory;
pub use discovery::AnnouncementChannel;
pub use eip1193::Eip1193Adapter;
pub use embedded::EmbeddedAuthAdapter;
pub use identity::IdentityApiAdapter;
pub use name_service::RpcNameService;
pub use rpc::JsonRpcClient;
#[cfg(not(target_arch = "wasm32"))]
pub use storage::FileStorage;
#[cfg(target_arch = "wasm32")]
pub use storage::LocalStorage;
pub use storage::MemoryStorage;
pub use wc::RelaySessionAdapter;
