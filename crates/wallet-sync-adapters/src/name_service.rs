use alloy::dyn_abi::{DynSolType, DynSolValue};
use alloy::primitives::{address, keccak256, Address, B256};
use async_trait::async_trait;

use wallet_sync_core::{NameServicePort, PortError};

use crate::JsonRpcClient;

/// ENS registry, same address on every network that deploys it.
pub const NAME_REGISTRY: Address = address!("0x00000000000C2E074eC69A0dFb2997BA6C7d2e1e");

/// Reverse and text-record resolution over plain `eth_call`.
#[derive(Debug, Clone)]
pub struct RpcNameService {
    rpc: JsonRpcClient,
    rpc_url: String,
    registry: Address,
}

impl RpcNameService {
    pub fn new(rpc: JsonRpcClient, rpc_url: impl Into<String>) -> Self {
        Self {
            rpc,
            rpc_url: rpc_url.into(),
            registry: NAME_REGISTRY,
        }
    }

    pub fn with_registry(mut self, registry: Address) -> Self {
        self.registry = registry;
        self
    }

    async fn eth_call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>, PortError> {
        let params = serde_json::json!([
            { "to": to.to_string(), "data": format!("0x{}", alloy::hex::encode(data)) },
            "latest"
        ]);
        let result = self.rpc.call(&self.rpc_url, "eth_call", params).await?;
        let raw = result
            .as_str()
            .ok_or_else(|| PortError::Validation(format!("eth_call result must be hex: {result}")))?;
        alloy::hex::decode(raw).map_err(|e| PortError::Validation(format!("invalid eth_call hex: {e}")))
    }

    async fn resolver(&self, node: B256) -> Result<Option<Address>, PortError> {
        let out = self
            .eth_call(self.registry, call_data("resolver(bytes32)", vec![node_value(node)]))
            .await?;
        let resolver = decode_address(&out)?;
        Ok(resolver.filter(|r| !r.is_zero()))
    }

    async fn resolve_addr(&self, name: &str) -> Result<Option<Address>, PortError> {
        let node = namehash(name);
        let Some(resolver) = self.resolver(node).await? else {
            return Ok(None);
        };
        let out = self
            .eth_call(resolver, call_data("addr(bytes32)", vec![node_value(node)]))
            .await?;
        decode_address(&out)
    }
}

#[async_trait(?Send)]
impl NameServicePort for RpcNameService {
    async fn lookup_address(&self, address: Address) -> Result<Option<String>, PortError> {
        let reverse = format!("{}.addr.reverse", alloy::hex::encode(address.as_slice()));
        let node = namehash(&reverse);
        let Some(resolver) = self.resolver(node).await? else {
            return Ok(None);
        };
        let out = self
            .eth_call(resolver, call_data("name(bytes32)", vec![node_value(node)]))
            .await?;
        let Some(name) = decode_string(&out)?.filter(|n| !n.is_empty()) else {
            return Ok(None);
        };
        // A reverse record only counts when the name resolves back.
        if self.resolve_addr(&name).await? != Some(address) {
            tracing::debug!(%address, %name, "reverse record does not resolve back");
            return Ok(None);
        }
        Ok(Some(name))
    }

    async fn avatar(&self, name: &str) -> Result<Option<String>, PortError> {
        let node = namehash(name);
        let Some(resolver) = self.resolver(node).await? else {
            return Ok(None);
        };
        let out = self
            .eth_call(
                resolver,
                call_data(
                    "text(bytes32,string)",
                    vec![node_value(node), DynSolValue::String("avatar".to_owned())],
                ),
            )
            .await?;
        Ok(decode_string(&out)?.filter(|a| !a.is_empty()))
    }
}

pub fn namehash(name: &str) -> B256 {
    let mut node = B256::ZERO;
    if name.is_empty() {
        return node;
    }
    for label in name.rsplit('.') {
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(node.as_slice());
        buf[32..].copy_from_slice(keccak256(label.as_bytes()).as_slice());
        node = keccak256(buf);
    }
    node
}

fn node_value(node: B256) -> DynSolValue {
    DynSolValue::FixedBytes(node, 32)
}

fn call_data(signature: &str, args: Vec<DynSolValue>) -> Vec<u8> {
    let mut data = keccak256(signature.as_bytes())[..4].to_vec();
    data.extend(DynSolValue::Tuple(args).abi_encode_params());
    data
}

fn decode_address(out: &[u8]) -> Result<Option<Address>, PortError> {
    if out.is_empty() {
        return Ok(None);
    }
    let value = DynSolType::Address
        .abi_decode(out)
        .map_err(|e| PortError::Validation(format!("invalid address return: {e}")))?;
    Ok(value.as_address())
}

fn decode_string(out: &[u8]) -> Result<Option<String>, PortError> {
    if out.is_empty() {
        return Ok(None);
    }
    let value = DynSolType::String
        .abi_decode(out)
        .map_err(|e| PortError::Validation(format!("invalid string return: {e}")))?;
    Ok(value.as_str().map(str::to_owned))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namehash_matches_known_nodes() {
        assert_eq!(namehash(""), B256::ZERO);
        assert_eq!(
            namehash("eth"),
            "0x93cdeb708b7545dc668eb9280176169d1c33cfd8ed6f04690a0bcc88a93fc4ae"
                .parse::<B256>()
                .expect("eth node")
        );
        assert_eq!(
            namehash("foo.eth"),
            "0xde9b09fd7c5f901e23a3f19fecc54828e9c848539801e86591bd9801b019f84f"
                .parse::<B256>()
                .expect("foo.eth node")
        );
    }

    #[test]
    fn call_data_uses_function_selector() {
        let data = call_data("resolver(bytes32)", vec![node_value(B256::ZERO)]);
        assert_eq!(&data[..4], &[0x01, 0x78, 0xb8, 0xbf]);
        assert_eq!(data.len(), 36);

        let text = call_data(
            "text(bytes32,string)",
            vec![node_value(B256::ZERO), DynSolValue::String("avatar".to_owned())],
        );
        assert_eq!(&text[..4], &[0x59, 0xd1, 0xd4, 0x3c]);
    }

    #[test]
    fn decodes_abi_string_return() {
        let encoded =
            DynSolValue::Tuple(vec![DynSolValue::String("vitalik.eth".to_owned())]).abi_encode_params();
        assert_eq!(decode_string(&encoded).expect("decode"), Some("vitalik.eth".to_owned()));
        assert_eq!(decode_string(&[]).expect("empty"), None);
        assert!(decode_string(&[0u8; 7]).is_err());
    }
}
