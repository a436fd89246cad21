use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeProfile {
    #[default]
    Development,
    Production,
}

impl RuntimeProfile {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub runtime_profile: RuntimeProfile,
    pub eip1193_proxy_url: Option<String>,
    pub identity_api_url: Option<String>,
    pub mainnet_rpc_url: String,
    pub http_timeout_ms: u64,
    pub session_file: Option<PathBuf>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            runtime_profile: RuntimeProfile::Development,
            eip1193_proxy_url: None,
            identity_api_url: None,
            mainnet_rpc_url: "https://eth.llamarpc.com".to_owned(),
            http_timeout_ms: 10_000,
            session_file: None,
        }
    }
}

impl AdapterConfig {
    pub const RUNTIME_PROFILE_ENV: &'static str = "WALLET_SYNC_RUNTIME_PROFILE";
    pub const EIP1193_PROXY_URL_ENV: &'static str = "WALLET_SYNC_EIP1193_PROXY_URL";
    pub const IDENTITY_API_URL_ENV: &'static str = "WALLET_SYNC_IDENTITY_API_URL";
    pub const MAINNET_RPC_URL_ENV: &'static str = "WALLET_SYNC_MAINNET_RPC_URL";
    pub const HTTP_TIMEOUT_MS_ENV: &'static str = "WALLET_SYNC_HTTP_TIMEOUT_MS";
    pub const SESSION_FILE_ENV: &'static str = "WALLET_SYNC_SESSION_FILE";

    /// Defaults overridden by `WALLET_SYNC_*` variables. Unparseable values
    /// are logged and ignored.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(raw) = env_value(Self::RUNTIME_PROFILE_ENV) {
            match RuntimeProfile::parse(&raw) {
                Some(profile) => cfg.runtime_profile = profile,
                None => tracing::warn!(value = %raw, "unknown runtime profile, keeping development"),
            }
        }
        cfg.eip1193_proxy_url = env_value(Self::EIP1193_PROXY_URL_ENV);
        cfg.identity_api_url = env_value(Self::IDENTITY_API_URL_ENV);
        if let Some(url) = env_value(Self::MAINNET_RPC_URL_ENV) {
            cfg.mainnet_rpc_url = url;
        }
        if let Some(raw) = env_value(Self::HTTP_TIMEOUT_MS_ENV) {
            match raw.parse() {
                Ok(ms) => cfg.http_timeout_ms = ms,
                Err(e) => tracing::warn!(value = %raw, error = %e, "invalid http timeout"),
            }
        }
        cfg.session_file = env_value(Self::SESSION_FILE_ENV).map(PathBuf::from);
        cfg
    }

    /// Production never falls back to the in-memory wallet.
    pub fn strict_runtime_required(&self) -> bool {
        self.runtime_profile == RuntimeProfile::Production
    }

    pub fn http_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.http_timeout_ms)
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_names_parse_case_insensitively() {
        assert_eq!(RuntimeProfile::parse("Production"), Some(RuntimeProfile::Production));
        assert_eq!(RuntimeProfile::parse(" dev "), Some(RuntimeProfile::Development));
        assert_eq!(RuntimeProfile::parse("staging"), None);
    }

    #[test]
    fn development_is_not_strict() {
        assert!(!AdapterConfig::default().strict_runtime_required());
        let cfg = AdapterConfig {
            runtime_profile: RuntimeProfile::Production,
            ..AdapterConfig::default()
        };
        assert!(cfg.strict_runtime_required());
    }
}
