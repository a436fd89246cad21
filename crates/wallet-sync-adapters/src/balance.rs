use alloy::primitives::{Address, U256};
use async_trait::async_trait;

use wallet_sync_core::{BalancePort, NetworkDescriptor, PortError};

use crate::JsonRpcClient;

/// Native balance through `eth_getBalance` on the network's own RPC endpoint.
#[derive(Debug, Clone)]
pub struct RpcBalanceReader {
    rpc: JsonRpcClient,
}

impl RpcBalanceReader {
    pub fn new(rpc: JsonRpcClient) -> Self {
        Self { rpc }
    }
}

#[async_trait(?Send)]
impl BalancePort for RpcBalanceReader {
    async fn native_balance(
        &self,
        address: Address,
        network: &NetworkDescriptor,
    ) -> Result<U256, PortError> {
        let result = self
            .rpc
            .call(
                &network.rpc_url,
                "eth_getBalance",
                serde_json::json!([address.to_string(), "latest"]),
            )
            .await?;
        let raw = result
            .as_str()
            .ok_or_else(|| PortError::Validation(format!("balance must be a hex string: {result}")))?;
        parse_quantity(raw)
    }
}

fn parse_quantity(raw: &str) -> Result<U256, PortError> {
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| PortError::Validation(format!("quantity missing 0x prefix: {raw}")))?;
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 16)
        .map_err(|e| PortError::Validation(format!("invalid quantity {raw}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantities_parse_as_hex() {
        assert_eq!(parse_quantity("0x0").expect("zero"), U256::ZERO);
        assert_eq!(
            parse_quantity("0xde0b6b3a7640000").expect("one ether"),
            U256::from(1_000_000_000_000_000_000u64)
        );
        assert!(parse_quantity("1000").is_err());
        assert!(parse_quantity("0xzz").is_err());
    }
}
