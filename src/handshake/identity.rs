//! Node info exchanged once the secret connection is up
//!
//! The remote's node info is accepted only if the id it claims derives from
//! the key the channel authenticated.

use ed25519_dalek::{SigningKey, VerifyingKey};

use super::proto::{DefaultNodeInfo, DefaultNodeInfoOther};
use super::HandshakeError;
use crate::crypto;
use crate::types::{NodeId, ProtocolVersion};

/// Upper bound for an encoded node info
pub const MAX_NODE_INFO_SIZE: usize = 10240;

/// PEX reactor channel, the only one the crawler speaks
const PEX_CHANNEL: u8 = 0x00;

/// Check `info` against the key the channel authenticated.
///
/// Returns the verified node id.
pub fn verify_node_info(
    info: &DefaultNodeInfo,
    channel_key: &VerifyingKey,
) -> Result<NodeId, HandshakeError> {
    let derived = crypto::node_id_from_public_key(channel_key);
    if info.default_node_id != derived {
        return Err(HandshakeError::IdentityMismatch {
            claimed: info.default_node_id.clone(),
            derived,
        });
    }

    Ok(derived)
}

/// This process's identity: its key and the fields it advertises
pub struct LocalIdentity {
    keypair: SigningKey,
    node_id: NodeId,
    listen_addr: String,
    moniker: String,
}

impl LocalIdentity {
    pub fn new(keypair: SigningKey, listen_addr: String, moniker: String) -> Self {
        let node_id = crypto::keypair_to_node_id(&keypair);
        Self {
            keypair,
            node_id,
            listen_addr,
            moniker,
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn keypair(&self) -> &SigningKey {
        &self.keypair
    }

    /// Node info advertised to peers of `network`, echoing the local
    /// node's protocol versions
    pub fn node_info(&self, network: &str, protocol: ProtocolVersion) -> DefaultNodeInfo {
        DefaultNodeInfo {
            protocol_version: Some(protocol.into()),
            default_node_id: self.node_id.clone(),
            listen_addr: self.listen_addr.clone(),
            network: network.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            channels: vec![PEX_CHANNEL],
            moniker: self.moniker.clone(),
            other: Some(DefaultNodeInfoOther {
                tx_index: "off".to_string(),
                rpc_address: String::new(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::generate_keypair;
    use crate::handshake::proto;
    use prost::Message;

    fn local(moniker: &str) -> LocalIdentity {
        LocalIdentity::new(generate_keypair(), "tcp://0.0.0.0:8080".to_string(), moniker.to_string())
    }

    fn protocol() -> ProtocolVersion {
        ProtocolVersion {
            p2p: 8,
            block: 11,
            app: 0,
        }
    }

    #[test]
    fn test_node_info_verifies_against_own_key() {
        let me = local("edge-1");
        let info = me.node_info("testnet-1", protocol());

        let verified = verify_node_info(&info, &me.keypair().verifying_key()).unwrap();
        assert_eq!(&verified, me.node_id());
        assert_eq!(info.network, "testnet-1");
        assert_eq!(info.protocol_version.as_ref().map(|v| v.block), Some(11));
    }

    #[test]
    fn test_node_info_survives_wire_encoding() {
        let me = local("edge-1");
        let info = me.node_info("testnet-1", protocol());

        let decoded: DefaultNodeInfo = proto::decode(&info.encode_to_vec()).unwrap();
        assert_eq!(decoded, info);
    }

    #[test]
    fn test_node_info_from_other_key_rejected() {
        let me = local("edge-1");
        let other = local("edge-2");
        let info = me.node_info("testnet-1", protocol());

        match verify_node_info(&info, &other.keypair().verifying_key()) {
            Err(HandshakeError::IdentityMismatch { claimed, derived }) => {
                assert_eq!(&claimed, me.node_id());
                assert_eq!(&derived, other.node_id());
            }
            result => panic!("expected IdentityMismatch, got {:?}", result),
        }
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        let result: Result<DefaultNodeInfo, _> = proto::decode(&[0xFF, 0xFF, 0xFF]);
        assert!(matches!(result, Err(HandshakeError::Malformed(_))));
    }
}
